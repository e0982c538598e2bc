//! wgpu backend. Element buffers are `f32` storage buffers; every pass is one
//! compute dispatch over the `side x side` grid in 8x8 workgroups, recorded
//! in its own command encoder and submitted right after its parameters are
//! written, so pass `k+1` always sees the finished output of pass `k`.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};

use super::{BackendError, ComputeBackend, Kernel};
use crate::grid::GridSize;

const WORKGROUP_SIDE: u32 = 8;
/// Keeps every linear index and shift amount inside u32.
const GPU_EXPONENT_CAP: u32 = 15;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Params {
    side: u32,
    block_step: u32,
    sub_block_step: u32,
    _pad0: u32,
    seed: [f32; 2],
    _pad1: [f32; 2],
}

impl Params {
    fn new(kernel: Kernel, grid: GridSize) -> Self {
        let mut params = Params {
            side: grid.side(),
            block_step: 0,
            sub_block_step: 0,
            _pad0: 0,
            seed: [0.0; 2],
            _pad1: [0.0; 2],
        };
        match kernel {
            Kernel::Initialize { seed } => params.seed = seed.0,
            Kernel::CompareExchange(pass) => {
                params.block_step = pass.block_step();
                params.sub_block_step = pass.sub_block_step();
            }
        }
        params
    }
}

/// A device-resident element buffer.
#[derive(Debug)]
pub struct GpuBuffer {
    id: u64,
    len: usize,
    buffer: wgpu::Buffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BindKey {
    kernel: &'static str,
    read: Option<u64>,
    write: u64,
}

pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    name: &'static str,
    max_size_exponent: u32,
    params_buf: wgpu::Buffer,
    init_pipeline: wgpu::ComputePipeline,
    exchange_pipeline: wgpu::ComputePipeline,
    // one bind group per (kernel, read, write) combination, built on first use
    bind_groups: HashMap<BindKey, wgpu::BindGroup>,
    next_buffer_id: u64,
}

impl GpuBackend {
    /// Opens the default adapter and compiles both kernels.
    pub fn new() -> Result<Self, BackendError> {
        pollster::block_on(Self::create())
    }

    async fn create() -> Result<Self, BackendError> {
        let (device, queue, info) = create_device().await?;
        log::info!("Using GPU: {:?}", info);

        let params_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("bitonic-params"),
            size: std::mem::size_of::<Params>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let init_pipeline = mk_pipeline(&device, "initialize", INITIALIZE_WGSL);
        let exchange_pipeline = mk_pipeline(&device, "compare-exchange", COMPARE_EXCHANGE_WGSL);
        let max_size_exponent = max_exponent_for(&device.limits());

        Ok(Self {
            device,
            queue,
            name: backend_label(info.backend),
            max_size_exponent,
            params_buf,
            init_pipeline,
            exchange_pipeline,
            bind_groups: HashMap::new(),
            next_buffer_id: 0,
        })
    }

    fn bind_key(kernel: Kernel, read: &GpuBuffer, write: &GpuBuffer) -> BindKey {
        match kernel {
            Kernel::Initialize { .. } => BindKey {
                kernel: kernel.name(),
                read: None,
                write: write.id,
            },
            Kernel::CompareExchange(_) => BindKey {
                kernel: kernel.name(),
                read: Some(read.id),
                write: write.id,
            },
        }
    }

    fn ensure_bind_group(&mut self, key: BindKey, read: &GpuBuffer, write: &GpuBuffer) {
        if self.bind_groups.contains_key(&key) {
            return;
        }
        let bind_group = match key.read {
            None => self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("bg-initialize"),
                layout: &self.init_pipeline.get_bind_group_layout(0),
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: self.params_buf.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: write.buffer.as_entire_binding() },
                ],
            }),
            Some(_) => self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("bg-compare-exchange"),
                layout: &self.exchange_pipeline.get_bind_group_layout(0),
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: self.params_buf.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: read.buffer.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 2, resource: write.buffer.as_entire_binding() },
                ],
            }),
        };
        self.bind_groups.insert(key, bind_group);
    }

    /// Runs `f` inside validation and out-of-memory error scopes.
    fn scoped<T>(&self, op: &'static str, f: impl FnOnce() -> T) -> Result<T, BackendError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let out = f();
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        match validation.or(oom) {
            Some(err) => {
                log::error!("GPU error during {op}: {err}");
                Err(BackendError::Device {
                    op,
                    message: err.to_string(),
                })
            }
            None => Ok(out),
        }
    }
}

impl ComputeBackend for GpuBackend {
    type Buffer = GpuBuffer;

    fn name(&self) -> &'static str {
        self.name
    }

    fn max_size_exponent(&self) -> u32 {
        self.max_size_exponent
    }

    fn allocate_buffer(&mut self, len: usize) -> Result<GpuBuffer, BackendError> {
        // buffers come in pairs; starting a new pair drops groups that pin the old one
        if self.next_buffer_id % 2 == 0 {
            self.bind_groups.clear();
        }
        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        let label = if id % 2 == 0 { "elements-a" } else { "elements-b" };
        let buffer = self.scoped("allocate", || mk_storage_f32(&self.device, label, len))?;
        Ok(GpuBuffer { id, len, buffer })
    }

    fn run_parallel_pass(
        &mut self,
        kernel: Kernel,
        read: &GpuBuffer,
        write: &mut GpuBuffer,
        grid: GridSize,
    ) -> Result<(), BackendError> {
        check_len(write, grid)?;
        if let Kernel::CompareExchange(_) = kernel {
            check_len(read, grid)?;
        }

        let key = Self::bind_key(kernel, read, write);
        self.ensure_bind_group(key, read, write);
        let pipeline = match kernel {
            Kernel::Initialize { .. } => &self.init_pipeline,
            Kernel::CompareExchange(_) => &self.exchange_pipeline,
        };
        let bind_group = &self.bind_groups[&key];
        let groups = grid.side().div_ceil(WORKGROUP_SIDE);

        self.scoped(kernel.name(), || {
            self.queue
                .write_buffer(&self.params_buf, 0, bytemuck::bytes_of(&Params::new(kernel, grid)));
            let mut encoder = self.device.create_command_encoder(&Default::default());
            {
                let mut pass = encoder.begin_compute_pass(&Default::default());
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, bind_group, &[]);
                pass.dispatch_workgroups(groups, groups, 1);
            }
            self.queue.submit(Some(encoder.finish()));
        })
    }

    fn read_buffer(&mut self, buffer: &GpuBuffer) -> Result<Vec<f32>, BackendError> {
        let bytes = (buffer.len * std::mem::size_of::<f32>()) as u64;
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("elements-read"),
            size: bytes,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        self.scoped("readback", || {
            let mut encoder = self.device.create_command_encoder(&Default::default());
            encoder.copy_buffer_to_buffer(&buffer.buffer, 0, &readback, 0, bytes);
            self.queue.submit(Some(encoder.finish()));
        })?;

        let slice = readback.slice(..);
        map_wait(&self.device, &slice)?;
        let mapped = slice.get_mapped_range();
        let values = bytemuck::cast_slice::<u8, f32>(&mapped).to_vec();
        drop(mapped);
        readback.unmap();
        Ok(values)
    }

    fn finish(&mut self) -> Result<(), BackendError> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
            .map_err(|err| BackendError::Device {
                op: "poll",
                message: err.to_string(),
            })
    }
}

fn check_len(buffer: &GpuBuffer, grid: GridSize) -> Result<(), BackendError> {
    if buffer.len != grid.element_count() {
        return Err(BackendError::LengthMismatch {
            expected: grid.element_count(),
            actual: buffer.len,
        });
    }
    Ok(())
}

async fn create_device() -> Result<(wgpu::Device, wgpu::Queue, wgpu::AdapterInfo), BackendError> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    });
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions::default())
        .await
        .map_err(|err| BackendError::NoAdapter(err.to_string()))?;

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("bitonic-device"),
            ..Default::default()
        })
        .await
        .map_err(|err| BackendError::RequestDevice(err.to_string()))?;
    Ok((device, queue, adapter.get_info()))
}

fn backend_label(backend: wgpu::Backend) -> &'static str {
    match backend {
        wgpu::Backend::Vulkan => "wgpu/vulkan",
        wgpu::Backend::Metal => "wgpu/metal",
        wgpu::Backend::Dx12 => "wgpu/dx12",
        wgpu::Backend::Gl => "wgpu/gl",
        _ => "wgpu",
    }
}

/// Largest `k` whose `4^k`-element f32 buffer fits one storage binding and
/// whose `2^k` side fits the dispatch limit.
fn max_exponent_for(limits: &wgpu::Limits) -> u32 {
    let max_bytes = u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);
    let max_side = u64::from(limits.max_compute_workgroups_per_dimension) * u64::from(WORKGROUP_SIDE);
    let mut k = 0;
    while k < GPU_EXPONENT_CAP {
        let next = k + 1;
        let bytes = 4u64 << (2 * next);
        if bytes > max_bytes || (1u64 << next) > max_side {
            break;
        }
        k = next;
    }
    k
}

fn mk_pipeline(device: &wgpu::Device, label: &str, wgsl: &str) -> wgpu::ComputePipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(wgsl.into()),
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: None,
        module: &shader,
        entry_point: Some("main"),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    })
}

fn mk_storage_f32(device: &wgpu::Device, label: &str, cells: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: (cells * std::mem::size_of::<f32>()) as u64,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn map_wait(device: &wgpu::Device, slice: &wgpu::BufferSlice<'_>) -> Result<(), BackendError> {
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |r| {
        let _ = tx.send(r);
    });
    device
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|err| BackendError::Device {
            op: "poll",
            message: err.to_string(),
        })?;
    match rx.recv() {
        Ok(result) => result.map_err(|err| {
            log::error!("Buffer map failed: {err}");
            BackendError::Map(err.to_string())
        }),
        Err(_) => {
            log::error!("Buffer map channel disconnected - possible device lost");
            Err(BackendError::Map("map_async channel closed".into()))
        }
    }
}

const INITIALIZE_WGSL: &str = r#"
struct Params {
  side: u32,
  block_step: u32,
  sub_block_step: u32,
  _pad0: u32,
  seed: vec2<f32>,
  _pad1: vec2<f32>,
};
@group(0) @binding(0) var<uniform> p: Params;
@group(0) @binding(1) var<storage, read_write> dst: array<f32>;

fn pcg_hash(v: u32) -> u32 {
  let state = v * 747796405u + 2891336453u;
  let word = ((state >> ((state >> 28u) + 4u)) ^ state) * 277803737u;
  return (word >> 22u) ^ word;
}

@compute @workgroup_size(8, 8, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
  if (gid.x >= p.side || gid.y >= p.side) { return; }
  let s = pcg_hash(bitcast<u32>(p.seed.x) ^ pcg_hash(bitcast<u32>(p.seed.y)));
  let h = pcg_hash(gid.x ^ pcg_hash(gid.y ^ s));
  dst[gid.x + gid.y * p.side] = f32(h >> 8u) * (1.0 / 16777216.0);
}
"#;

const COMPARE_EXCHANGE_WGSL: &str = r#"
struct Params {
  side: u32,
  block_step: u32,
  sub_block_step: u32,
  _pad0: u32,
  seed: vec2<f32>,
  _pad1: vec2<f32>,
};
@group(0) @binding(0) var<uniform> p: Params;
@group(0) @binding(1) var<storage, read> src: array<f32>;
@group(0) @binding(2) var<storage, read_write> dst: array<f32>;

@compute @workgroup_size(8, 8, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
  if (gid.x >= p.side || gid.y >= p.side) { return; }
  let index = gid.x + gid.y * p.side;
  let d = 1u << (p.block_step - p.sub_block_step);

  var up = ((index >> p.block_step) & 2u) == 0u;
  var partner = index | d;
  if ((index & d) != 0u) {
    partner = index & ~d;
    up = !up;
  }

  let a = src[index];
  let b = src[partner];
  dst[index] = select(a, b, (a > b) == up);
}
"#;

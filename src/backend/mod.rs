//! The narrow interface the scheduler drives: allocate element buffers, run
//! one full-buffer data-parallel pass, read a buffer back.

pub mod gpu;
pub mod host;

pub use gpu::GpuBackend;
pub use host::HostBackend;

use crate::grid::{GridSize, PassDescriptor};
use crate::init::Seed;

/// The two kernels a pass can run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kernel {
    /// Fill the write buffer from the seed; the read buffer is ignored.
    Initialize { seed: Seed },
    CompareExchange(PassDescriptor),
}

impl Kernel {
    pub fn name(&self) -> &'static str {
        match self {
            Kernel::Initialize { .. } => "initialize",
            Kernel::CompareExchange(_) => "compare_exchange",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("no compute adapter: {0}")]
    NoAdapter(String),
    #[error("request_device failed: {0}")]
    RequestDevice(String),
    #[error("device error during {op}: {message}")]
    Device { op: &'static str, message: String },
    #[error("buffer map failed: {0}")]
    Map(String),
    #[error("buffer holds {actual} elements, grid needs {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

pub trait ComputeBackend {
    type Buffer;

    /// Short label for reports, e.g. `"wgpu/vulkan"`.
    fn name(&self) -> &'static str;

    /// Largest grid exponent whose buffers this backend can address.
    fn max_size_exponent(&self) -> u32;

    fn allocate_buffer(&mut self, len: usize) -> Result<Self::Buffer, BackendError>;

    /// Runs `kernel` once for every element of the grid, reading `read` and
    /// writing all of `write`.
    fn run_parallel_pass(
        &mut self,
        kernel: Kernel,
        read: &Self::Buffer,
        write: &mut Self::Buffer,
        grid: GridSize,
    ) -> Result<(), BackendError>;

    fn read_buffer(&mut self, buffer: &Self::Buffer) -> Result<Vec<f32>, BackendError>;

    /// Blocks until all submitted passes have completed.
    fn finish(&mut self) -> Result<(), BackendError>;
}

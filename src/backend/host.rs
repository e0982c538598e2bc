//! Host reference backend. Runs each pass as a rayon parallel map; used to
//! verify the device backend and in tests. Never selected implicitly.

use super::{BackendError, ComputeBackend, Kernel};
use crate::exchange;
use crate::grid::GridSize;
use crate::init;

/// 16M elements, 64 MiB per buffer.
pub const HOST_MAX_SIZE_EXPONENT: u32 = 12;

#[derive(Debug, Default)]
pub struct HostBackend;

impl HostBackend {
    pub fn new() -> Self {
        HostBackend
    }
}

fn check_len(buffer: &[f32], grid: GridSize) -> Result<(), BackendError> {
    if buffer.len() != grid.element_count() {
        return Err(BackendError::LengthMismatch {
            expected: grid.element_count(),
            actual: buffer.len(),
        });
    }
    Ok(())
}

impl ComputeBackend for HostBackend {
    type Buffer = Vec<f32>;

    fn name(&self) -> &'static str {
        "host/rayon"
    }

    fn max_size_exponent(&self) -> u32 {
        HOST_MAX_SIZE_EXPONENT
    }

    fn allocate_buffer(&mut self, len: usize) -> Result<Vec<f32>, BackendError> {
        Ok(vec![0.0; len])
    }

    fn run_parallel_pass(
        &mut self,
        kernel: Kernel,
        read: &Vec<f32>,
        write: &mut Vec<f32>,
        grid: GridSize,
    ) -> Result<(), BackendError> {
        check_len(write, grid)?;
        match kernel {
            Kernel::Initialize { seed } => init::fill(write, grid, seed),
            Kernel::CompareExchange(pass) => {
                check_len(read, grid)?;
                exchange::run_pass(read, write, pass);
            }
        }
        Ok(())
    }

    fn read_buffer(&mut self, buffer: &Vec<f32>) -> Result<Vec<f32>, BackendError> {
        Ok(buffer.clone())
    }

    fn finish(&mut self) -> Result<(), BackendError> {
        Ok(())
    }
}

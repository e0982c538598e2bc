//! Bitonic sorting network over a square grid of `f32` values, executed as a
//! sequence of double-buffered data-parallel passes on a compute backend.

pub mod backend;
pub mod buffers;
pub mod config;
pub mod error;
pub mod exchange;
pub mod grid;
pub mod init;
pub mod present;
pub mod scheduler;

pub use backend::{BackendError, ComputeBackend, GpuBackend, HostBackend, Kernel};
pub use error::SortError;
pub use grid::{GridSize, PassDescriptor};
pub use init::Seed;
pub use scheduler::{BatchReport, Phase, RunRequest, RunState, SortScheduler, StepOutcome};

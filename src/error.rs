use crate::backend::BackendError;

/// Errors surfaced by the sort scheduler.
///
/// Reentrant run requests are not errors; they come back as
/// [`RunRequest::Rejected`](crate::scheduler::RunRequest::Rejected).
#[derive(Debug, thiserror::Error)]
pub enum SortError {
    /// Bad size exponent. Raised before any buffer is allocated.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Allocation, pass or readback failure reported by the compute backend.
    /// The run it happened in is abandoned and its buffers are discarded.
    #[error("compute backend failed: {0}")]
    Backend(#[from] BackendError),

    /// A run was requested but no valid buffers exist (never reset, or the
    /// last run failed).
    #[error("no initialized buffers, reset first")]
    NotInitialized,

    #[error("presentation failed: {0}")]
    Present(String),
}

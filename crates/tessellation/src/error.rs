use lifecycle::{CloseError, HandleError};
use native_kernel::KernelError;

/// Errors from mesh and edge extraction.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TessellationError {
    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("handle error: {0}")]
    Handle(#[from] HandleError),

    #[error("releasing transient topology failed: {0}")]
    Release(#[from] CloseError),

    #[error("invalid parameter: {reason}")]
    InvalidParameter { reason: String },

    #[error("kernel triangulation of face {face_index} references vertex {index} of {positions}")]
    InvalidTriangulation { face_index: u32, index: u32, positions: usize },

    #[error("default mesh cache is already borrowed on this thread")]
    CacheBusy,
}

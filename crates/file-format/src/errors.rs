use lifecycle::{CloseError, HandleError};
use native_kernel::{FileFormat, KernelError};

/// Errors while moving shapes in and out of the kernel's virtual filesystem.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StagingError {
    #[error("no data to import")]
    EmptyInput,

    #[error("{format:?} export produced no data")]
    EmptyOutput { format: FileFormat },

    #[error("unknown file format: {0}")]
    UnknownFormat(String),

    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("handle error: {0}")]
    Handle(#[from] HandleError),

    #[error("staging cleanup failed: {0}")]
    Cleanup(#[from] CloseError),
}

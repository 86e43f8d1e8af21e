use native_kernel::{KernelError, NativeRef};

/// Misuse of a handle after it was released.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HandleError {
    #[error("native handle {raw:?} used after release")]
    Disposed { raw: NativeRef },
}

/// A single disposal that did not complete.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReleaseError {
    #[error("releasing {raw:?} failed: {source}")]
    Native {
        raw: NativeRef,
        #[source]
        source: KernelError,
    },

    #[error("cleanup `{label}` failed: {reason}")]
    Cleanup { label: String, reason: String },
}

/// Outcome of closing a scope in which at least one release failed.
/// Every other registered resource was still released.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{failed} of {total} releases failed while closing scope; first: {first}")]
pub struct CloseError {
    pub first: ReleaseError,
    pub failed: usize,
    pub total: usize,
}

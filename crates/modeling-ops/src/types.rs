use lifecycle::{Handle, HandleError};
use native_kernel::{GlueMode, KernelError, ShapeKind};
use serde::{Deserialize, Serialize};

use crate::strategy::OperationStrategy;

/// Which dispatch family the caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyPreference {
    /// Use the fastest path the kernel exposes.
    #[default]
    Native,
    /// Force the pairwise fallback even when faster paths exist.
    Pairwise,
}

/// Options for [`crate::fuse_all`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuseOptions {
    pub strategy: StrategyPreference,
    pub glue: GlueMode,
    /// Run the simplification pass on the final result.
    pub simplify: bool,
}

impl Default for FuseOptions {
    fn default() -> Self {
        Self {
            strategy: StrategyPreference::Native,
            glue: GlueMode::Off,
            simplify: true,
        }
    }
}

impl FuseOptions {
    /// Force the pairwise fallback.
    pub fn pairwise() -> Self {
        Self {
            strategy: StrategyPreference::Pairwise,
            ..Self::default()
        }
    }

    /// Skip the simplification pass.
    pub fn raw() -> Self {
        Self {
            simplify: false,
            ..Self::default()
        }
    }
}

/// Options for [`crate::cut_all`]. Same fields and defaults as [`FuseOptions`].
pub type CutOptions = FuseOptions;

/// Result of a dispatched boolean operation.
#[derive(Debug, Clone)]
pub struct BooleanOutput {
    /// The result. Owned by the caller and not registered in any scope.
    pub handle: Handle,
    /// The strategy that produced the result, `None` when no native call was needed.
    pub strategy: Option<OperationStrategy>,
    pub diagnostics: Diagnostics,
}

/// Non-fatal diagnostics from an operation.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    /// Recovered stage failures and intermediate release failures.
    pub warnings: Vec<String>,
    /// Native calls that produced a shape (failed attempts included).
    pub native_calls: usize,
    /// Wall time of the whole dispatch, in milliseconds.
    pub elapsed_ms: f64,
}

/// One strategy that was attempted and failed.
#[derive(Debug, Clone, PartialEq)]
pub struct StageFailure {
    pub strategy: OperationStrategy,
    pub error: KernelError,
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.strategy, self.error)
    }
}

fn describe_stages(stages: &[StageFailure]) -> String {
    stages.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Errors from modeling operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OpError {
    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("handle error: {0}")]
    Handle(#[from] HandleError),

    #[error("invalid parameter: {reason}")]
    InvalidParameter { reason: String },

    #[error("{operation} produced {found:?}, expected {expected}")]
    TypeMismatch {
        operation: String,
        expected: String,
        found: ShapeKind,
    },

    #[error("{operation} failed at every stage: {}", describe_stages(.stages))]
    StrategyFailed {
        operation: String,
        stages: Vec<StageFailure>,
    },
}

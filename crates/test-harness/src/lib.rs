//! Test harness for the native-handle bridge.
//!
//! Provides programmatic tools for scripting multi-step shape workflows
//! against `MockKernel` and verifying lifecycle and geometry at every step.
//!
//! # Key Components
//!
//! - [`Workbench`]: Fluent API for building and verifying shapes by name
//! - [`oracle`]: Verification functions returning pass/fail verdicts
//! - [`helpers`]: Kernel fixtures, box builders, mesh math
//! - [`assertions`]: Rich assertion helpers with diagnostics

pub mod assertions;
pub mod helpers;
pub mod oracle;
pub mod workflow;

pub use helpers::HarnessError;
pub use oracle::OracleVerdict;
pub use workflow::Workbench;

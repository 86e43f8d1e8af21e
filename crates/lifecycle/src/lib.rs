//! Ownership and disposal of native kernel objects.
//!
//! - [`Handle`]: one native reference plus a disposed flag; release is idempotent
//! - [`Scope`] / [`with_scope`]: LIFO, collect-and-continue release at the end of a unit of work
//! - [`SafetyNet`]: weak backstop releasing handles that were dropped while live

pub mod error;
pub mod handle;
pub mod safety_net;
pub mod scope;

pub use error::{CloseError, HandleError, ReleaseError};
pub use handle::{Handle, WeakHandle};
pub use safety_net::{CollectReport, SafetyNet};
pub use scope::{with_scope, Disposable, Scope};

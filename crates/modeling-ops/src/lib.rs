pub mod boolean;
pub mod strategy;
pub mod types;

pub use boolean::{cut_all, fuse_all, BooleanKind};
pub use strategy::OperationStrategy;
pub use types::*;

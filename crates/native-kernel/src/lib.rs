pub mod csg;
pub mod mock_kernel;
pub mod shared;
pub mod traits;
pub mod types;

pub use mock_kernel::{MockControl, MockKernel};
pub use shared::{KernelId, SharedKernel};
pub use traits::*;
pub use types::*;

//! Render meshes and edge overlays for native shapes, memoized per native
//! object in an [`IdentityCache`].

pub mod builder;
pub mod cache;
pub mod error;
pub mod extract;
pub mod params;

pub use builder::{EdgeBuilder, MeshBuilder};
pub use cache::{mesh, mesh_edges, with_default_cache, CacheStats, IdentityCache, MeshCache};
pub use error::TessellationError;
pub use extract::{extract_edges, extract_mesh};
pub use params::{EdgeParams, MeshParams};

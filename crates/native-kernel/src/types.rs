use serde::{Deserialize, Serialize};

/// Opaque reference to an object living in native kernel memory.
/// Equality is identity: two refs are equal only if they name the same native object.
/// NEVER persisted. Valid only for the kernel instance that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeRef(pub u64);

impl Serialize for NativeRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for NativeRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u64::deserialize(deserializer).map(NativeRef)
    }
}

/// Topological category of a native shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeKind {
    Solid,
    Compound,
    Face,
    Edge,
    /// Null or empty shape (e.g. a cut that removed everything).
    Empty,
}

impl ShapeKind {
    /// Whether the shape encloses volume.
    pub fn is_body(self) -> bool {
        matches!(self, ShapeKind::Solid | ShapeKind::Compound)
    }
}

/// Glue / optimisation hint for boolean solvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlueMode {
    /// No gluing: arguments are intersected in full.
    #[default]
    Off,
    /// Arguments share coincident faces that are shifted relative to each other.
    Shift,
    /// Arguments share coincident faces without shifting.
    Full,
}

/// Optional entry points a kernel build may or may not expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Single-call N-ary fuse.
    pub bulk_fuse: bool,
    /// Single-call cut of one base by many tools.
    pub bulk_cut: bool,
    /// General N-way boolean solver taking all arguments at once.
    pub general_fuse: bool,
    /// Single-call triangulation of a whole shape.
    pub bulk_mesh: bool,
    /// Single-call discretization of every edge of a shape.
    pub bulk_edges: bool,
}

impl Capabilities {
    /// Every optional entry point present.
    pub fn full() -> Self {
        Self {
            bulk_fuse: true,
            bulk_cut: true,
            general_fuse: true,
            bulk_mesh: true,
            bulk_edges: true,
        }
    }

    /// Only the mandatory pairwise / per-item entry points.
    pub fn minimal() -> Self {
        Self {
            bulk_fuse: false,
            bulk_cut: false,
            general_fuse: false,
            bulk_mesh: false,
            bulk_edges: false,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::full()
    }
}

/// Exchange formats the kernel can read from / write to its virtual filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Step,
    Iges,
    Stl,
}

impl FileFormat {
    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Step => "step",
            FileFormat::Iges => "iges",
            FileFormat::Stl => "stl",
        }
    }
}

/// Errors from native kernel calls.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KernelError {
    #[error("{operation} failed: {reason}")]
    OperationFailed { operation: String, reason: String },

    #[error("{operation} returned a null result")]
    NullResult { operation: String },

    #[error("invalid native reference: {raw:?}")]
    InvalidRef { raw: NativeRef },

    #[error("operation not supported: {operation}")]
    NotSupported { operation: String },

    #[error("kernel is busy (re-entrant call)")]
    Busy,

    #[error("virtual filesystem error on {name}: {reason}")]
    Vfs { name: String, reason: String },
}

impl KernelError {
    pub fn failed(operation: &str, reason: impl Into<String>) -> Self {
        KernelError::OperationFailed {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }

    pub fn not_supported(operation: &str) -> Self {
        KernelError::NotSupported {
            operation: operation.to_string(),
        }
    }
}

/// Triangulation of a single face as returned by the kernel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceTriangulation {
    pub positions: Vec<[f64; 3]>,
    pub normals: Vec<[f64; 3]>,
    /// Indices into `positions`, local to this face.
    pub triangles: Vec<[u32; 3]>,
}

/// Polyline approximation of a single edge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgePolyline {
    pub points: Vec<[f64; 3]>,
}

/// Tessellated triangle mesh of a whole shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderMesh {
    /// Flat array of vertex positions [x0, y0, z0, x1, y1, z1, ...].
    pub vertices: Vec<f32>,
    /// Flat array of vertex normals, empty when normals were skipped.
    pub normals: Vec<f32>,
    /// Triangle indices into the vertex array.
    pub triangles: Vec<u32>,
    /// Mapping from triangle ranges to logical faces.
    pub face_groups: Vec<FaceGroup>,
}

impl RenderMesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len() / 3
    }
}

/// Maps a contiguous range of the triangle index array to a logical face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceGroup {
    /// Start offset in `triangles` (inclusive).
    pub start: u32,
    /// Number of indices (3 per triangle).
    pub count: u32,
    /// Position of the face in the shape's face traversal order.
    pub face_index: u32,
}

/// Polyline edge overlay for a whole shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeMesh {
    /// Line segments as vertex pairs [x0, y0, z0, x1, y1, z1, ...].
    pub lines: Vec<f32>,
    /// Mapping from ranges of `lines` to logical edges.
    pub edge_groups: Vec<EdgeGroup>,
}

/// Maps a contiguous range of line-segment floats to a logical edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeGroup {
    /// Start offset in `lines` (in floats, not vertices).
    pub start: u32,
    /// Number of floats.
    pub count: u32,
    /// Position of the edge in the shape's edge traversal order.
    pub edge_index: u32,
}

use crate::types::*;

/// The native geometry kernel as seen from Rust.
///
/// Every method that returns a [`NativeRef`] hands ownership of a new native
/// object to the caller, who must eventually pass it to [`NativeKernel::release`].
/// Implemented by bindings to a real kernel and by [`crate::MockKernel`].
///
/// The `*_bulk` and `general_fuse` entry points are optional; callers probe
/// [`NativeKernel::capabilities`] before using them. Their default bodies
/// report [`KernelError::NotSupported`].
pub trait NativeKernel {
    /// Which optional entry points this kernel exposes.
    fn capabilities(&self) -> Capabilities;

    /// Create an axis-aligned box solid spanning `min`..`max`.
    fn make_box(&mut self, min: [f64; 3], max: [f64; 3]) -> Result<NativeRef, KernelError>;

    /// Free a native object. Not required to be idempotent.
    fn release(&mut self, raw: NativeRef) -> Result<(), KernelError>;

    /// Topological category of a shape.
    fn shape_kind(&self, raw: NativeRef) -> Result<ShapeKind, KernelError>;

    /// Enclosed volume of a shape.
    fn volume(&self, raw: NativeRef) -> Result<f64, KernelError>;

    /// Derived hash code bounded by `upper`. Distinct objects may collide.
    fn hash_code(&self, raw: NativeRef, upper: i32) -> Result<i32, KernelError>;

    /// Boolean union of two shapes.
    fn fuse(&mut self, a: NativeRef, b: NativeRef) -> Result<NativeRef, KernelError>;

    /// Boolean subtraction: `a` minus `b`.
    fn cut(&mut self, a: NativeRef, b: NativeRef) -> Result<NativeRef, KernelError>;

    /// Group shapes into a compound without any boolean processing.
    fn make_compound(&mut self, parts: &[NativeRef]) -> Result<NativeRef, KernelError>;

    /// Merge coplanar faces / collinear edges. Returns a new shape.
    fn simplify(&mut self, raw: NativeRef) -> Result<NativeRef, KernelError>;

    /// Single-call N-ary fuse.
    fn fuse_bulk(&mut self, _operands: &[NativeRef], _glue: GlueMode) -> Result<NativeRef, KernelError> {
        Err(KernelError::not_supported("fuse_bulk"))
    }

    /// Single-call cut of `base` by every tool.
    fn cut_bulk(
        &mut self,
        _base: NativeRef,
        _tools: &[NativeRef],
        _glue: GlueMode,
    ) -> Result<NativeRef, KernelError> {
        Err(KernelError::not_supported("cut_bulk"))
    }

    /// General N-way boolean solver run over all arguments in one pass.
    fn general_fuse(&mut self, _arguments: &[NativeRef], _glue: GlueMode) -> Result<NativeRef, KernelError> {
        Err(KernelError::not_supported("general_fuse"))
    }

    /// Single-call triangulation of every face of a shape.
    fn mesh_bulk(
        &mut self,
        _raw: NativeRef,
        _tolerance: f64,
        _angular_tolerance: f64,
        _skip_normals: bool,
    ) -> Result<RenderMesh, KernelError> {
        Err(KernelError::not_supported("mesh_bulk"))
    }

    /// Single-call discretization of every edge of a shape.
    fn edges_bulk(
        &mut self,
        _raw: NativeRef,
        _tolerance: f64,
        _angular_tolerance: f64,
    ) -> Result<EdgeMesh, KernelError> {
        Err(KernelError::not_supported("edges_bulk"))
    }

    /// Faces of a shape in traversal order. Each face is a new native object.
    fn list_faces(&mut self, raw: NativeRef) -> Result<Vec<NativeRef>, KernelError>;

    /// Edges of a shape in traversal order. Each edge is a new native object.
    fn list_edges(&mut self, raw: NativeRef) -> Result<Vec<NativeRef>, KernelError>;

    /// Triangulate one face.
    fn triangulate_face(
        &mut self,
        face: NativeRef,
        tolerance: f64,
        angular_tolerance: f64,
    ) -> Result<FaceTriangulation, KernelError>;

    /// Discretize one edge into a polyline.
    fn discretize_edge(
        &mut self,
        edge: NativeRef,
        tolerance: f64,
        angular_tolerance: f64,
    ) -> Result<EdgePolyline, KernelError>;

    /// Write bytes into the kernel's ephemeral virtual filesystem.
    fn vfs_write(&mut self, name: &str, bytes: &[u8]) -> Result<(), KernelError>;

    /// Read bytes back from the virtual filesystem.
    fn vfs_read(&mut self, name: &str) -> Result<Vec<u8>, KernelError>;

    /// Remove a virtual file.
    fn vfs_unlink(&mut self, name: &str) -> Result<(), KernelError>;

    /// Parse a staged virtual file into a shape.
    fn read_file(&mut self, name: &str, format: FileFormat) -> Result<NativeRef, KernelError>;

    /// Serialize a shape into a staged virtual file.
    fn write_file(&mut self, raw: NativeRef, name: &str, format: FileFormat) -> Result<(), KernelError>;
}

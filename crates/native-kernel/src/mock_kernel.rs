//! MockKernel: deterministic test double implementing [`NativeKernel`].
//!
//! Shapes are CSG trees over axis-aligned boxes (see [`crate::csg`]), so
//! volumes are exact and boolean results can be compared across strategies.
//! A [`MockControl`] shared with the test observes every native call and
//! injects failures.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::csg::{Csg, Quad};
use crate::traits::NativeKernel;
use crate::types::*;

/// Native-side object table entry.
#[derive(Debug, Clone)]
enum MockObject {
    Shape(Csg),
    Face(Quad),
    Edge([[f64; 3]; 2]),
}

/// On-disk representation written to the virtual filesystem.
#[derive(Debug, Serialize, Deserialize)]
struct StagedShape {
    format: FileFormat,
    shape: Csg,
}

#[derive(Debug, Default)]
struct ControlState {
    counts: HashMap<String, usize>,
    released: Vec<NativeRef>,
    release_attempts: HashMap<NativeRef, usize>,
    fail_release: HashSet<NativeRef>,
    fail_ops: HashSet<String>,
    collide_hashes: bool,
    live: usize,
    vfs: BTreeMap<String, Vec<u8>>,
}

/// Test-side view into a [`MockKernel`]: call counters, release log,
/// virtual filesystem contents and fault injection.
#[derive(Debug, Clone, Default)]
pub struct MockControl {
    state: Rc<RefCell<ControlState>>,
}

/// Operations counted by [`MockControl::boolean_calls`].
const BOOLEAN_OPS: &[&str] = &[
    "fuse",
    "cut",
    "make_compound",
    "simplify",
    "fuse_bulk",
    "cut_bulk",
    "general_fuse",
];

impl MockControl {
    /// Number of calls made to `operation` (failed calls included).
    pub fn calls(&self, operation: &str) -> usize {
        self.state.borrow().counts.get(operation).copied().unwrap_or(0)
    }

    /// Calls to any boolean / compound / simplify entry point.
    pub fn boolean_calls(&self) -> usize {
        BOOLEAN_OPS.iter().map(|op| self.calls(op)).sum()
    }

    /// Successfully released refs, in release order.
    pub fn released(&self) -> Vec<NativeRef> {
        self.state.borrow().released.clone()
    }

    /// Release calls that reached the kernel for `raw`, failed ones included.
    pub fn release_attempts(&self, raw: NativeRef) -> usize {
        self.state.borrow().release_attempts.get(&raw).copied().unwrap_or(0)
    }

    /// Native objects currently allocated.
    pub fn live_objects(&self) -> usize {
        self.state.borrow().live
    }

    /// Make every release of `raw` fail, leaving the object allocated.
    pub fn fail_release_of(&self, raw: NativeRef) {
        self.state.borrow_mut().fail_release.insert(raw);
    }

    /// Make every call to `operation` fail.
    pub fn fail_operation(&self, operation: &str) {
        self.state.borrow_mut().fail_ops.insert(operation.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.borrow_mut();
        state.fail_ops.clear();
        state.fail_release.clear();
    }

    /// Make `hash_code` return the same value for every object.
    pub fn collide_hash_codes(&self) {
        self.state.borrow_mut().collide_hashes = true;
    }

    /// Names currently present in the virtual filesystem.
    pub fn vfs_entries(&self) -> Vec<String> {
        self.state.borrow().vfs.keys().cloned().collect()
    }

    /// Zero every call counter; the release log is kept.
    pub fn reset_counts(&self) {
        self.state.borrow_mut().counts.clear();
    }
}

/// Deterministic test double for the native kernel.
pub struct MockKernel {
    capabilities: Capabilities,
    next_id: u64,
    objects: HashMap<u64, MockObject>,
    control: MockControl,
}

impl MockKernel {
    /// A kernel exposing every optional entry point.
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::full())
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            next_id: 1,
            objects: HashMap::new(),
            control: MockControl::default(),
        }
    }

    /// Handle for observing this kernel after it was moved into a [`crate::SharedKernel`].
    pub fn control(&self) -> MockControl {
        self.control.clone()
    }

    /// Count the call and honour injected failures.
    fn enter(&self, operation: &str) -> Result<(), KernelError> {
        trace!(operation, "mock kernel call");
        let mut state = self.control.state.borrow_mut();
        *state.counts.entry(operation.to_string()).or_insert(0) += 1;
        if state.fail_ops.contains(operation) {
            return Err(KernelError::failed(operation, "injected failure"));
        }
        Ok(())
    }

    fn alloc(&mut self, object: MockObject) -> NativeRef {
        let raw = NativeRef(self.next_id);
        self.next_id += 1;
        self.objects.insert(raw.0, object);
        self.control.state.borrow_mut().live += 1;
        raw
    }

    fn alloc_shape(&mut self, operation: &str, shape: Csg) -> Result<NativeRef, KernelError> {
        if matches!(&shape, Csg::Union { parts } | Csg::Compound { parts } if parts.is_empty()) {
            return Err(KernelError::NullResult {
                operation: operation.to_string(),
            });
        }
        Ok(self.alloc(MockObject::Shape(shape)))
    }

    fn object(&self, raw: NativeRef) -> Result<&MockObject, KernelError> {
        self.objects.get(&raw.0).ok_or(KernelError::InvalidRef { raw })
    }

    fn shape(&self, raw: NativeRef) -> Result<&Csg, KernelError> {
        match self.object(raw)? {
            MockObject::Shape(csg) => Ok(csg),
            _ => Err(KernelError::failed("shape lookup", format!("{raw:?} is not a shape"))),
        }
    }

    fn shapes(&self, refs: &[NativeRef]) -> Result<Vec<Csg>, KernelError> {
        refs.iter().map(|&r| self.shape(r).cloned()).collect()
    }

    /// Unique boundary edges, keyed on quantized endpoints.
    fn boundary_edges(csg: &Csg) -> Vec<[[f64; 3]; 2]> {
        let quantize = |p: [f64; 3]| p.map(|c| (c * 1e9).round() as i64);
        let mut seen = HashSet::new();
        let mut edges = Vec::new();
        for quad in csg.boundary() {
            for i in 0..4 {
                let a = quad.corners[i];
                let b = quad.corners[(i + 1) % 4];
                let (ka, kb) = (quantize(a), quantize(b));
                let key = if ka <= kb { (ka, kb) } else { (kb, ka) };
                if seen.insert(key) {
                    edges.push([a, b]);
                }
            }
        }
        edges
    }
}

impl Default for MockKernel {
    fn default() -> Self {
        Self::new()
    }
}

fn triangulate_quad(quad: &Quad) -> FaceTriangulation {
    FaceTriangulation {
        positions: quad.corners.to_vec(),
        normals: vec![quad.normal; 4],
        triangles: vec![[0, 1, 2], [0, 2, 3]],
    }
}

fn push_point(out: &mut Vec<f32>, p: [f64; 3]) {
    out.extend_from_slice(&[p[0] as f32, p[1] as f32, p[2] as f32]);
}

impl NativeKernel for MockKernel {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn make_box(&mut self, min: [f64; 3], max: [f64; 3]) -> Result<NativeRef, KernelError> {
        self.enter("make_box")?;
        if (0..3).any(|i| max[i] <= min[i]) {
            return Err(KernelError::failed("make_box", "degenerate extent"));
        }
        Ok(self.alloc(MockObject::Shape(Csg::cuboid(min, max))))
    }

    fn release(&mut self, raw: NativeRef) -> Result<(), KernelError> {
        self.enter("release")?;
        {
            let mut state = self.control.state.borrow_mut();
            *state.release_attempts.entry(raw).or_insert(0) += 1;
            if state.fail_release.contains(&raw) {
                return Err(KernelError::failed("release", format!("cannot free {raw:?}")));
            }
        }
        if self.objects.remove(&raw.0).is_none() {
            return Err(KernelError::InvalidRef { raw });
        }
        let mut state = self.control.state.borrow_mut();
        state.live -= 1;
        state.released.push(raw);
        Ok(())
    }

    fn shape_kind(&self, raw: NativeRef) -> Result<ShapeKind, KernelError> {
        self.enter("shape_kind")?;
        Ok(match self.object(raw)? {
            MockObject::Shape(csg) if csg.is_empty() => ShapeKind::Empty,
            MockObject::Shape(Csg::Compound { .. }) => ShapeKind::Compound,
            MockObject::Shape(_) => ShapeKind::Solid,
            MockObject::Face(_) => ShapeKind::Face,
            MockObject::Edge(_) => ShapeKind::Edge,
        })
    }

    fn volume(&self, raw: NativeRef) -> Result<f64, KernelError> {
        match self.object(raw)? {
            MockObject::Shape(csg) => Ok(csg.volume()),
            _ => Ok(0.0),
        }
    }

    fn hash_code(&self, raw: NativeRef, upper: i32) -> Result<i32, KernelError> {
        self.object(raw)?;
        if self.control.state.borrow().collide_hashes {
            return Ok(0);
        }
        Ok((raw.0 % upper.max(1) as u64) as i32)
    }

    fn fuse(&mut self, a: NativeRef, b: NativeRef) -> Result<NativeRef, KernelError> {
        self.enter("fuse")?;
        let parts = self.shapes(&[a, b])?;
        self.alloc_shape("fuse", Csg::Union { parts })
    }

    fn cut(&mut self, a: NativeRef, b: NativeRef) -> Result<NativeRef, KernelError> {
        self.enter("cut")?;
        let base = self.shape(a)?.clone();
        let tool = self.shape(b)?.clone();
        self.alloc_shape(
            "cut",
            Csg::Difference {
                base: Box::new(base),
                tool: Box::new(tool),
            },
        )
    }

    fn make_compound(&mut self, parts: &[NativeRef]) -> Result<NativeRef, KernelError> {
        self.enter("make_compound")?;
        let parts = self.shapes(parts)?;
        self.alloc_shape("make_compound", Csg::Compound { parts })
    }

    fn simplify(&mut self, raw: NativeRef) -> Result<NativeRef, KernelError> {
        self.enter("simplify")?;
        let simplified = self.shape(raw)?.simplified();
        self.alloc_shape("simplify", simplified)
    }

    fn fuse_bulk(&mut self, operands: &[NativeRef], _glue: GlueMode) -> Result<NativeRef, KernelError> {
        self.enter("fuse_bulk")?;
        if !self.capabilities.bulk_fuse {
            return Err(KernelError::not_supported("fuse_bulk"));
        }
        let parts = self.shapes(operands)?;
        self.alloc_shape("fuse_bulk", Csg::Union { parts })
    }

    fn cut_bulk(&mut self, base: NativeRef, tools: &[NativeRef], _glue: GlueMode) -> Result<NativeRef, KernelError> {
        self.enter("cut_bulk")?;
        if !self.capabilities.bulk_cut {
            return Err(KernelError::not_supported("cut_bulk"));
        }
        let base = self.shape(base)?.clone();
        let parts = self.shapes(tools)?;
        self.alloc_shape(
            "cut_bulk",
            Csg::Difference {
                base: Box::new(base),
                tool: Box::new(Csg::Compound { parts }),
            },
        )
    }

    fn general_fuse(&mut self, arguments: &[NativeRef], _glue: GlueMode) -> Result<NativeRef, KernelError> {
        self.enter("general_fuse")?;
        if !self.capabilities.general_fuse {
            return Err(KernelError::not_supported("general_fuse"));
        }
        let parts = self.shapes(arguments)?;
        self.alloc_shape("general_fuse", Csg::Union { parts })
    }

    fn mesh_bulk(
        &mut self,
        raw: NativeRef,
        _tolerance: f64,
        _angular_tolerance: f64,
        skip_normals: bool,
    ) -> Result<RenderMesh, KernelError> {
        self.enter("mesh_bulk")?;
        if !self.capabilities.bulk_mesh {
            return Err(KernelError::not_supported("mesh_bulk"));
        }
        let mut mesh = RenderMesh::default();
        for (face_index, quad) in self.shape(raw)?.boundary().iter().enumerate() {
            let tri = triangulate_quad(quad);
            let base = mesh.vertex_count() as u32;
            let start = mesh.triangles.len() as u32;
            for (p, n) in tri.positions.iter().zip(&tri.normals) {
                push_point(&mut mesh.vertices, *p);
                if !skip_normals {
                    push_point(&mut mesh.normals, *n);
                }
            }
            mesh.triangles.extend(tri.triangles.iter().flatten().map(|i| base + i));
            mesh.face_groups.push(FaceGroup {
                start,
                count: mesh.triangles.len() as u32 - start,
                face_index: face_index as u32,
            });
        }
        Ok(mesh)
    }

    fn edges_bulk(&mut self, raw: NativeRef, _tolerance: f64, _angular_tolerance: f64) -> Result<EdgeMesh, KernelError> {
        self.enter("edges_bulk")?;
        if !self.capabilities.bulk_edges {
            return Err(KernelError::not_supported("edges_bulk"));
        }
        let mut out = EdgeMesh::default();
        for (edge_index, [a, b]) in Self::boundary_edges(self.shape(raw)?).into_iter().enumerate() {
            let start = out.lines.len() as u32;
            push_point(&mut out.lines, a);
            push_point(&mut out.lines, b);
            out.edge_groups.push(EdgeGroup {
                start,
                count: 6,
                edge_index: edge_index as u32,
            });
        }
        Ok(out)
    }

    fn list_faces(&mut self, raw: NativeRef) -> Result<Vec<NativeRef>, KernelError> {
        self.enter("list_faces")?;
        let quads = self.shape(raw)?.boundary();
        Ok(quads.into_iter().map(|q| self.alloc(MockObject::Face(q))).collect())
    }

    fn list_edges(&mut self, raw: NativeRef) -> Result<Vec<NativeRef>, KernelError> {
        self.enter("list_edges")?;
        let edges = Self::boundary_edges(self.shape(raw)?);
        Ok(edges.into_iter().map(|e| self.alloc(MockObject::Edge(e))).collect())
    }

    fn triangulate_face(
        &mut self,
        face: NativeRef,
        _tolerance: f64,
        _angular_tolerance: f64,
    ) -> Result<FaceTriangulation, KernelError> {
        self.enter("triangulate_face")?;
        match self.object(face)? {
            MockObject::Face(quad) => Ok(triangulate_quad(quad)),
            _ => Err(KernelError::failed("triangulate_face", format!("{face:?} is not a face"))),
        }
    }

    fn discretize_edge(
        &mut self,
        edge: NativeRef,
        _tolerance: f64,
        _angular_tolerance: f64,
    ) -> Result<EdgePolyline, KernelError> {
        self.enter("discretize_edge")?;
        match self.object(edge)? {
            MockObject::Edge(points) => Ok(EdgePolyline {
                points: points.to_vec(),
            }),
            _ => Err(KernelError::failed("discretize_edge", format!("{edge:?} is not an edge"))),
        }
    }

    fn vfs_write(&mut self, name: &str, bytes: &[u8]) -> Result<(), KernelError> {
        self.enter("vfs_write")?;
        self.control
            .state
            .borrow_mut()
            .vfs
            .insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn vfs_read(&mut self, name: &str) -> Result<Vec<u8>, KernelError> {
        self.enter("vfs_read")?;
        self.control
            .state
            .borrow()
            .vfs
            .get(name)
            .cloned()
            .ok_or_else(|| KernelError::Vfs {
                name: name.to_string(),
                reason: "no such file".to_string(),
            })
    }

    fn vfs_unlink(&mut self, name: &str) -> Result<(), KernelError> {
        self.enter("vfs_unlink")?;
        match self.control.state.borrow_mut().vfs.remove(name) {
            Some(_) => Ok(()),
            None => Err(KernelError::Vfs {
                name: name.to_string(),
                reason: "no such file".to_string(),
            }),
        }
    }

    fn read_file(&mut self, name: &str, format: FileFormat) -> Result<NativeRef, KernelError> {
        self.enter("read_file")?;
        let bytes = self.control.state.borrow().vfs.get(name).cloned().ok_or_else(|| KernelError::Vfs {
            name: name.to_string(),
            reason: "no such file".to_string(),
        })?;
        let staged: StagedShape =
            serde_json::from_slice(&bytes).map_err(|e| KernelError::failed("read_file", e.to_string()))?;
        if staged.format != format {
            return Err(KernelError::failed(
                "read_file",
                format!("expected {:?} data, found {:?}", format, staged.format),
            ));
        }
        self.alloc_shape("read_file", staged.shape)
    }

    fn write_file(&mut self, raw: NativeRef, name: &str, format: FileFormat) -> Result<(), KernelError> {
        self.enter("write_file")?;
        let staged = StagedShape {
            format,
            shape: self.shape(raw)?.clone(),
        };
        let bytes = serde_json::to_vec(&staged).map_err(|e| KernelError::failed("write_file", e.to_string()))?;
        self.control.state.borrow_mut().vfs.insert(name.to_string(), bytes);
        Ok(())
    }
}

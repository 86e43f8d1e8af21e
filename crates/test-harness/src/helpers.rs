//! Helper functions: error type, kernel fixtures, mesh math.

use lifecycle::Handle;
use native_kernel::{Capabilities, MockControl, MockKernel, RenderMesh, SharedKernel};

// ── Error Type ──────────────────────────────────────────────────────────────

/// Unified error type for the test harness.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("shape not found: {name}")]
    ShapeNotFound { name: String },

    #[error("duplicate name: {name}")]
    DuplicateName { name: String },

    #[error("assertion failed: {detail}")]
    AssertionFailed { detail: String },

    #[error("oracle failure ({oracle}): {detail}")]
    OracleFailure { oracle: String, detail: String },

    #[error("kernel error: {0}")]
    Kernel(#[from] native_kernel::KernelError),

    #[error("handle error: {0}")]
    Handle(#[from] lifecycle::HandleError),

    #[error("scope close failed: {0}")]
    Close(#[from] lifecycle::CloseError),

    #[error("operation failed: {0}")]
    Op(#[from] modeling_ops::OpError),

    #[error("tessellation failed: {0}")]
    Tessellation(#[from] tessellation::TessellationError),

    #[error("staging failed: {0}")]
    Staging(#[from] file_format::StagingError),
}

// ── Kernel Fixtures ─────────────────────────────────────────────────────────

/// A mock kernel behind a [`SharedKernel`] plus its control view.
pub fn mock_kernel(capabilities: Capabilities) -> (SharedKernel, MockControl) {
    let mock = MockKernel::with_capabilities(capabilities);
    let control = mock.control();
    (SharedKernel::new(mock), control)
}

/// Axis-aligned box owned by the caller.
pub fn make_box(kernel: &SharedKernel, min: [f64; 3], max: [f64; 3]) -> Result<Handle, HarnessError> {
    let raw = kernel.with(|k| k.make_box(min, max))?;
    Ok(Handle::new(kernel, raw))
}

/// `count` unit cubes along x, each shifted by `step` from the previous one.
pub fn box_row(kernel: &SharedKernel, count: usize, step: f64) -> Result<Vec<Handle>, HarnessError> {
    (0..count)
        .map(|i| {
            let x = i as f64 * step;
            make_box(kernel, [x, 0.0, 0.0], [x + 1.0, 1.0, 1.0])
        })
        .collect()
}

/// Volume reported by the kernel.
pub fn shape_volume(shape: &Handle) -> Result<f64, HarnessError> {
    let raw = shape.raw()?;
    Ok(shape.kernel().with(|k| k.volume(raw))?)
}

// ── Mesh Math ───────────────────────────────────────────────────────────────

/// Axis-aligned bounds of the mesh vertices, `None` for an empty mesh.
pub fn mesh_bounding_box(mesh: &RenderMesh) -> Option<([f32; 3], [f32; 3])> {
    if mesh.vertices.len() < 3 {
        return None;
    }
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for chunk in mesh.vertices.chunks(3) {
        for i in 0..3 {
            min[i] = min[i].min(chunk[i]);
            max[i] = max[i].max(chunk[i]);
        }
    }
    Some((min, max))
}

/// Compute the signed volume of a triangle mesh using the divergence theorem.
///
/// For a closed (watertight) mesh, this returns the enclosed volume.
pub fn mesh_volume(mesh: &RenderMesh) -> f64 {
    let verts = &mesh.vertices;
    let mut volume = 0.0f64;

    for tri in mesh.triangles.chunks_exact(3) {
        let (i0, i1, i2) = (tri[0] as usize * 3, tri[1] as usize * 3, tri[2] as usize * 3);
        if i0 + 2 >= verts.len() || i1 + 2 >= verts.len() || i2 + 2 >= verts.len() {
            continue;
        }
        let (x0, y0, z0) = (verts[i0] as f64, verts[i0 + 1] as f64, verts[i0 + 2] as f64);
        let (x1, y1, z1) = (verts[i1] as f64, verts[i1 + 1] as f64, verts[i1 + 2] as f64);
        let (x2, y2, z2) = (verts[i2] as f64, verts[i2 + 1] as f64, verts[i2 + 2] as f64);

        // Signed volume of tetrahedron formed by triangle and origin
        volume += x0 * (y1 * z2 - y2 * z1) + x1 * (y2 * z0 - y0 * z2) + x2 * (y0 * z1 - y1 * z0);
    }

    volume / 6.0
}

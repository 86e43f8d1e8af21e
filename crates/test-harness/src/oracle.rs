//! Verification oracles: pure functions returning pass/fail verdicts.
//!
//! Each oracle returns an `OracleVerdict` with diagnostic detail, not panics,
//! so one pass collects every failure.

use std::collections::HashMap;

use lifecycle::Handle;
use native_kernel::{EdgeMesh, MockControl, RenderMesh};
use serde::Serialize;

use crate::helpers::{mesh_volume, shape_volume};

/// The result of a single oracle check.
#[derive(Debug, Clone, Serialize)]
pub struct OracleVerdict {
    pub oracle_name: String,
    pub passed: bool,
    pub detail: String,
    pub value: Option<f64>,
}

impl OracleVerdict {
    fn pass(name: &str, detail: String) -> Self {
        Self {
            oracle_name: name.to_string(),
            passed: true,
            detail,
            value: None,
        }
    }

    fn pass_val(name: &str, detail: String, value: f64) -> Self {
        Self {
            value: Some(value),
            ..Self::pass(name, detail)
        }
    }

    fn fail(name: &str, detail: String) -> Self {
        Self {
            oracle_name: name.to_string(),
            passed: false,
            detail,
            value: None,
        }
    }

    fn fail_val(name: &str, detail: String, value: f64) -> Self {
        Self {
            value: Some(value),
            ..Self::fail(name, detail)
        }
    }
}

// ── Mesh Oracles ────────────────────────────────────────────────────────────

/// Check that every triangle edge is shared by exactly two triangles.
pub fn check_watertight_mesh(mesh: &RenderMesh) -> OracleVerdict {
    // Quantize vertex positions to allow position-based matching
    fn quantize(v: f32) -> i64 {
        (v as f64 * 10000.0).round() as i64
    }

    fn vert_key(mesh: &RenderMesh, idx: u32) -> (i64, i64, i64) {
        let i = idx as usize * 3;
        (
            quantize(mesh.vertices[i]),
            quantize(mesh.vertices[i + 1]),
            quantize(mesh.vertices[i + 2]),
        )
    }

    type PosEdge = ((i64, i64, i64), (i64, i64, i64));

    fn make_edge(a: (i64, i64, i64), b: (i64, i64, i64)) -> PosEdge {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    if !check_valid_indices(mesh).passed {
        return OracleVerdict::fail("watertight_mesh", "mesh has out-of-bounds indices".to_string());
    }

    let mut edge_counts: HashMap<PosEdge, usize> = HashMap::new();
    for tri in mesh.triangles.chunks_exact(3) {
        let va = vert_key(mesh, tri[0]);
        let vb = vert_key(mesh, tri[1]);
        let vc = vert_key(mesh, tri[2]);

        *edge_counts.entry(make_edge(va, vb)).or_insert(0) += 1;
        *edge_counts.entry(make_edge(vb, vc)).or_insert(0) += 1;
        *edge_counts.entry(make_edge(vc, va)).or_insert(0) += 1;
    }

    let non_paired = edge_counts.values().filter(|&&c| c != 2).count();
    if non_paired == 0 {
        OracleVerdict::pass(
            "watertight_mesh",
            format!("all {} edges paired", edge_counts.len()),
        )
    } else {
        OracleVerdict::fail(
            "watertight_mesh",
            format!("{} unpaired edges out of {} total", non_paired, edge_counts.len()),
        )
    }
}

/// Check that all index values are within bounds.
pub fn check_valid_indices(mesh: &RenderMesh) -> OracleVerdict {
    let vertex_count = mesh.vertex_count();
    let bad = mesh
        .triangles
        .iter()
        .filter(|&&idx| idx as usize >= vertex_count)
        .count();

    if bad == 0 {
        OracleVerdict::pass("valid_indices", format!("all indices < {}", vertex_count))
    } else {
        OracleVerdict::fail(
            "valid_indices",
            format!("{} out-of-bounds indices (vertex_count={})", bad, vertex_count),
        )
    }
}

/// Check that face groups cover all indices without gaps or overlaps.
pub fn check_face_group_coverage(mesh: &RenderMesh) -> OracleVerdict {
    let groups = &mesh.face_groups;
    if groups.is_empty() {
        return OracleVerdict::fail("face_group_coverage", "no face groups defined".to_string());
    }

    let mut expected_start = 0u32;
    for (i, group) in groups.iter().enumerate() {
        if group.start != expected_start {
            return OracleVerdict::fail(
                "face_group_coverage",
                format!(
                    "gap/overlap at group {}: expected start={}, got start={}",
                    i, expected_start, group.start
                ),
            );
        }
        if group.count == 0 || group.count % 3 != 0 {
            return OracleVerdict::fail(
                "face_group_coverage",
                format!("group {} has {} indices", i, group.count),
            );
        }
        expected_start += group.count;
    }

    if expected_start as usize != mesh.triangles.len() {
        return OracleVerdict::fail(
            "face_group_coverage",
            format!(
                "groups end at {} but mesh has {} indices",
                expected_start,
                mesh.triangles.len()
            ),
        );
    }

    OracleVerdict::pass(
        "face_group_coverage",
        format!("{} groups, no gaps", groups.len()),
    )
}

/// Check that normals are either absent or one per vertex.
pub fn check_normals_layout(mesh: &RenderMesh) -> OracleVerdict {
    if mesh.normals.is_empty() || mesh.normals.len() == mesh.vertices.len() {
        OracleVerdict::pass("normals_layout", format!("{} normal floats", mesh.normals.len()))
    } else {
        OracleVerdict::fail(
            "normals_layout",
            format!(
                "{} normal floats for {} vertex floats",
                mesh.normals.len(),
                mesh.vertices.len()
            ),
        )
    }
}

/// Check that edge groups tile the line buffer in whole segments.
pub fn check_edge_group_coverage(edges: &EdgeMesh) -> OracleVerdict {
    let mut expected_start = 0u32;
    for (i, group) in edges.edge_groups.iter().enumerate() {
        if group.start != expected_start || group.count == 0 || group.count % 6 != 0 {
            return OracleVerdict::fail(
                "edge_group_coverage",
                format!("bad edge group {}: start={} count={}", i, group.start, group.count),
            );
        }
        expected_start += group.count;
    }
    if expected_start as usize != edges.lines.len() {
        return OracleVerdict::fail(
            "edge_group_coverage",
            format!("groups end at {} but {} line floats", expected_start, edges.lines.len()),
        );
    }
    OracleVerdict::pass(
        "edge_group_coverage",
        format!("{} edge groups", edges.edge_groups.len()),
    )
}

/// Compare the enclosed mesh volume against the kernel's volume.
pub fn check_mesh_volume(shape: &Handle, mesh: &RenderMesh, tol: f64) -> OracleVerdict {
    let expected = match shape_volume(shape) {
        Ok(v) => v,
        Err(e) => return OracleVerdict::fail("mesh_volume", format!("kernel volume unavailable: {e}")),
    };
    let actual = mesh_volume(mesh);
    if (actual - expected).abs() <= tol {
        OracleVerdict::pass_val(
            "mesh_volume",
            format!("mesh volume {:.6} matches kernel", actual),
            actual,
        )
    } else {
        OracleVerdict::fail_val(
            "mesh_volume",
            format!("mesh volume {:.6}, kernel volume {:.6}", actual, expected),
            actual,
        )
    }
}

// ── Lifecycle Oracles ───────────────────────────────────────────────────────

/// Check that no native object was released more than once.
pub fn check_single_release(control: &MockControl) -> OracleVerdict {
    let released = control.released();
    let repeated: Vec<_> = released
        .iter()
        .filter(|&&raw| control.release_attempts(raw) > 1)
        .collect();
    if repeated.is_empty() {
        OracleVerdict::pass(
            "single_release",
            format!("{} objects released once each", released.len()),
        )
    } else {
        OracleVerdict::fail(
            "single_release",
            format!("released more than once: {:?}", repeated),
        )
    }
}

/// Check that the virtual filesystem holds no staging files.
pub fn check_vfs_clean(control: &MockControl) -> OracleVerdict {
    let entries = control.vfs_entries();
    if entries.is_empty() {
        OracleVerdict::pass("vfs_clean", "no staged files".to_string())
    } else {
        OracleVerdict::fail("vfs_clean", format!("leftover files: {:?}", entries))
    }
}

// ── Composite ───────────────────────────────────────────────────────────────

/// Render verdicts as a JSON array for test logs.
pub fn verdicts_to_json(verdicts: &[OracleVerdict]) -> String {
    serde_json::to_string_pretty(verdicts).unwrap_or_else(|e| format!("[\"unserializable verdicts: {e}\"]"))
}

/// Run every structural mesh check.
pub fn run_all_mesh_checks(mesh: &RenderMesh) -> Vec<OracleVerdict> {
    vec![
        check_watertight_mesh(mesh),
        check_valid_indices(mesh),
        check_face_group_coverage(mesh),
        check_normals_layout(mesh),
    ]
}

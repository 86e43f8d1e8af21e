//! Tests for verification oracles.

use native_kernel::{EdgeGroup, EdgeMesh, FaceGroup, RenderMesh};
use tessellation::MeshParams;
use test_harness::oracle::*;
use test_harness::Workbench;

/// Build a MockKernel box and mesh it.
fn build_mock_box() -> (Workbench, String) {
    let mut wb = Workbench::mock();
    wb.add_box("box", [0.0; 3], [10.0; 3]).unwrap();
    (wb, "box".to_string())
}

/// One triangle: valid indices, but open.
fn single_triangle() -> RenderMesh {
    RenderMesh {
        vertices: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        normals: vec![],
        triangles: vec![0, 1, 2],
        face_groups: vec![FaceGroup {
            start: 0,
            count: 3,
            face_index: 0,
        }],
    }
}

// ── Mesh Oracle Tests ───────────────────────────────────────────────────

#[test]
fn box_mesh_passes_all_checks() {
    let (mut wb, name) = build_mock_box();
    let verdicts = wb.check_mesh(&name).unwrap();
    for v in &verdicts {
        assert!(v.passed, "{} failed: {}", v.oracle_name, v.detail);
    }
}

#[test]
fn mesh_volume_oracle_reports_value() {
    let (mut wb, name) = build_mock_box();
    let mesh = wb.mesh(&name, &MeshParams::default()).unwrap();
    let verdict = check_mesh_volume(wb.shape(&name).unwrap(), &mesh, 1e-3);
    assert!(verdict.passed, "{}", verdict.detail);
    let value = verdict.value.unwrap();
    assert!((value - 1000.0).abs() < 1e-3, "volume {}", value);
}

#[test]
fn open_mesh_is_not_watertight() {
    let verdict = check_watertight_mesh(&single_triangle());
    assert!(!verdict.passed);
    assert!(verdict.detail.contains("unpaired"));
}

#[test]
fn out_of_bounds_index_detected() {
    let mut mesh = single_triangle();
    mesh.triangles[2] = 7;
    assert!(!check_valid_indices(&mesh).passed);
    assert!(!check_watertight_mesh(&mesh).passed);
}

#[test]
fn face_group_gap_detected() {
    let mut mesh = single_triangle();
    mesh.face_groups[0].start = 3;
    let verdict = check_face_group_coverage(&mesh);
    assert!(!verdict.passed);
    assert!(verdict.detail.contains("gap"));
}

#[test]
fn missing_face_groups_detected() {
    let mut mesh = single_triangle();
    mesh.face_groups.clear();
    assert!(!check_face_group_coverage(&mesh).passed);
}

#[test]
fn partial_normals_detected() {
    let mut mesh = single_triangle();
    assert!(check_normals_layout(&mesh).passed);
    mesh.normals = vec![0.0, 0.0, 1.0];
    assert!(!check_normals_layout(&mesh).passed);
}

#[test]
fn edge_groups_must_cover_lines() {
    let mut edges = EdgeMesh {
        lines: vec![0.0; 12],
        edge_groups: vec![
            EdgeGroup {
                start: 0,
                count: 6,
                edge_index: 0,
            },
            EdgeGroup {
                start: 6,
                count: 6,
                edge_index: 1,
            },
        ],
    };
    assert!(check_edge_group_coverage(&edges).passed);
    edges.edge_groups.pop();
    assert!(!check_edge_group_coverage(&edges).passed);
}

// ── Lifecycle Oracle Tests ──────────────────────────────────────────────

#[test]
fn finished_workbench_released_everything_once() {
    let (wb, _name) = build_mock_box();
    let control = wb.finish().unwrap();
    assert!(check_single_release(&control).passed);
    assert!(check_vfs_clean(&control).passed);
    assert_eq!(control.live_objects(), 0);
}

#[test]
fn verdicts_render_as_json() {
    let verdicts = run_all_mesh_checks(&single_triangle());
    let json = verdicts_to_json(&verdicts);
    assert!(json.contains("\"oracle_name\": \"watertight_mesh\""));
    assert!(json.contains("\"passed\": false"));
}

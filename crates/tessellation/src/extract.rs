//! Uncached extraction. Prefers the kernel's bulk entry points and falls back
//! to walking faces or edges one at a time.

use lifecycle::{with_scope, Handle};
use native_kernel::{EdgeMesh, RenderMesh};
use tracing::{debug, warn};

use crate::builder::{EdgeBuilder, MeshBuilder};
use crate::error::TessellationError;
use crate::params::{EdgeParams, MeshParams};

/// Triangulate every face of `shape`.
pub fn extract_mesh(shape: &Handle, params: &MeshParams) -> Result<RenderMesh, TessellationError> {
    params.validate()?;
    let raw = shape.raw()?;
    let kernel = shape.kernel();
    let MeshParams {
        tolerance,
        angular_tolerance,
        skip_normals,
    } = *params;

    if kernel.capabilities().bulk_mesh {
        match kernel.with(|k| k.mesh_bulk(raw, tolerance, angular_tolerance, skip_normals)) {
            Ok(mesh) => {
                debug!(triangles = mesh.triangle_count(), "bulk mesh");
                return Ok(mesh);
            }
            Err(error) => warn!(%error, "bulk mesh failed, meshing face by face"),
        }
    }

    with_scope(|scope| -> Result<RenderMesh, TessellationError> {
        // Every listed face is a new native object: adopt them all before the
        // first triangulation so a failure part way still frees the rest.
        let faces: Vec<Handle> = kernel
            .with(|k| k.list_faces(raw))?
            .into_iter()
            .map(|face| scope.adopt(kernel, face))
            .collect();
        let mut builder = MeshBuilder::new(skip_normals);
        for (index, face) in faces.iter().enumerate() {
            let face_raw = face.raw()?;
            let triangulation = kernel.with(|k| k.triangulate_face(face_raw, tolerance, angular_tolerance))?;
            builder.add_face(index as u32, &triangulation)?;
        }
        debug!(faces = faces.len(), "per-face mesh");
        Ok(builder.finish())
    })
}

/// Discretize every edge of `shape` into line segments.
pub fn extract_edges(shape: &Handle, params: &EdgeParams) -> Result<EdgeMesh, TessellationError> {
    params.validate()?;
    let raw = shape.raw()?;
    let kernel = shape.kernel();
    let EdgeParams {
        tolerance,
        angular_tolerance,
    } = *params;

    if kernel.capabilities().bulk_edges {
        match kernel.with(|k| k.edges_bulk(raw, tolerance, angular_tolerance)) {
            Ok(edges) => return Ok(edges),
            Err(error) => warn!(%error, "bulk edge extraction failed, walking edges"),
        }
    }

    with_scope(|scope| -> Result<EdgeMesh, TessellationError> {
        let edges: Vec<Handle> = kernel
            .with(|k| k.list_edges(raw))?
            .into_iter()
            .map(|edge| scope.adopt(kernel, edge))
            .collect();
        let mut builder = EdgeBuilder::new();
        for (index, edge) in edges.iter().enumerate() {
            let edge_raw = edge.raw()?;
            let polyline = kernel.with(|k| k.discretize_edge(edge_raw, tolerance, angular_tolerance))?;
            builder.add_edge(index as u32, &polyline);
        }
        Ok(builder.finish())
    })
}

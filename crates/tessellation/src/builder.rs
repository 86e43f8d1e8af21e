use native_kernel::{EdgeGroup, EdgeMesh, EdgePolyline, FaceGroup, FaceTriangulation, RenderMesh};

use crate::error::TessellationError;

/// Accumulates per-face triangulations into one [`RenderMesh`].
pub struct MeshBuilder {
    mesh: RenderMesh,
    skip_normals: bool,
}

impl MeshBuilder {
    pub fn new(skip_normals: bool) -> Self {
        Self {
            mesh: RenderMesh::default(),
            skip_normals,
        }
    }

    pub fn add_vertex(&mut self, pos: [f64; 3], normal: [f64; 3]) -> u32 {
        let idx = self.mesh.vertex_count() as u32;
        self.mesh.vertices.extend(pos.map(|c| c as f32));
        if !self.skip_normals {
            self.mesh.normals.extend(normal.map(|c| c as f32));
        }
        idx
    }

    pub fn add_triangle(&mut self, i0: u32, i1: u32, i2: u32) {
        self.mesh.triangles.extend([i0, i1, i2]);
    }

    /// Append one face and record its triangle range.
    ///
    /// Triangles come from the kernel, so every index is checked against the
    /// face's positions before anything is appended.
    pub fn add_face(&mut self, face_index: u32, face: &FaceTriangulation) -> Result<(), TessellationError> {
        let positions = face.positions.len();
        if let Some(&index) = face.triangles.iter().flatten().find(|&&i| i as usize >= positions) {
            return Err(TessellationError::InvalidTriangulation {
                face_index,
                index,
                positions,
            });
        }
        let start = self.mesh.triangles.len() as u32;
        let base: Vec<u32> = face
            .positions
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let n = face.normals.get(i).copied().unwrap_or([0.0; 3]);
                self.add_vertex(p, n)
            })
            .collect();
        for &[a, b, c] in &face.triangles {
            self.add_triangle(base[a as usize], base[b as usize], base[c as usize]);
        }
        self.mesh.face_groups.push(FaceGroup {
            start,
            count: self.mesh.triangles.len() as u32 - start,
            face_index,
        });
        Ok(())
    }

    pub fn finish(self) -> RenderMesh {
        self.mesh
    }
}

/// Accumulates per-edge polylines into one [`EdgeMesh`] of line segments.
#[derive(Default)]
pub struct EdgeBuilder {
    mesh: EdgeMesh,
}

impl EdgeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, edge_index: u32, polyline: &EdgePolyline) {
        let start = self.mesh.lines.len() as u32;
        for pair in polyline.points.windows(2) {
            for p in pair {
                self.mesh.lines.extend(p.map(|c| c as f32));
            }
        }
        self.mesh.edge_groups.push(EdgeGroup {
            start,
            count: self.mesh.lines.len() as u32 - start,
            edge_index,
        });
    }

    pub fn finish(self) -> EdgeMesh {
        self.mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> FaceTriangulation {
        FaceTriangulation {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 4],
            triangles: vec![[0, 1, 2], [0, 2, 3]],
        }
    }

    #[test]
    fn test_faces_are_offset_and_grouped() {
        let mut builder = MeshBuilder::new(false);
        builder.add_face(0, &square()).unwrap();
        builder.add_face(1, &square()).unwrap();
        let mesh = builder.finish();

        assert_eq!(mesh.vertex_count(), 8);
        assert_eq!(mesh.triangle_count(), 4);
        assert_eq!(mesh.normals.len(), mesh.vertices.len());
        assert_eq!(&mesh.triangles[6..9], &[4, 5, 6]);
        assert_eq!(
            mesh.face_groups[1],
            FaceGroup {
                start: 6,
                count: 6,
                face_index: 1
            }
        );
    }

    #[test]
    fn test_skip_normals_leaves_normals_empty() {
        let mut builder = MeshBuilder::new(true);
        builder.add_face(0, &square()).unwrap();
        let mesh = builder.finish();
        assert!(mesh.normals.is_empty());
        assert_eq!(mesh.vertex_count(), 4);
    }

    #[test]
    fn test_out_of_range_triangle_is_rejected() {
        let mut builder = MeshBuilder::new(false);
        builder.add_face(0, &square()).unwrap();
        let broken = FaceTriangulation {
            positions: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![],
            triangles: vec![[0, 1, 5]],
        };
        let err = builder.add_face(1, &broken).unwrap_err();
        assert!(matches!(
            err,
            TessellationError::InvalidTriangulation {
                face_index: 1,
                index: 5,
                positions: 3
            }
        ));

        // the rejected face left nothing behind
        let mesh = builder.finish();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.face_groups.len(), 1);
    }

    #[test]
    fn test_polyline_becomes_segments() {
        let mut builder = EdgeBuilder::new();
        builder.add_edge(
            0,
            &EdgePolyline {
                points: vec![[0.0; 3], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0]],
            },
        );
        let edges = builder.finish();
        // two segments, two endpoints each
        assert_eq!(edges.lines.len(), 12);
        assert_eq!(edges.edge_groups[0].count, 12);
    }
}

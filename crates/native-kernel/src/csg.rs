//! Geometry model behind [`crate::MockKernel`]: CSG trees over axis-aligned boxes.
//!
//! Volumes and boundaries are evaluated on the rectilinear grid spanned by
//! every box coordinate in the tree, so unions, differences and compounds are
//! exact for box inputs.

use serde::{Deserialize, Serialize};

/// A CSG expression over axis-aligned boxes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Csg {
    Box { min: [f64; 3], max: [f64; 3] },
    Union { parts: Vec<Csg> },
    Difference { base: Box<Csg>, tool: Box<Csg> },
    Compound { parts: Vec<Csg> },
}

/// One planar quad of a shape boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub corners: [[f64; 3]; 4],
    pub normal: [f64; 3],
}

impl Csg {
    pub fn cuboid(min: [f64; 3], max: [f64; 3]) -> Self {
        Csg::Box { min, max }
    }

    /// Point membership, boundary excluded.
    pub fn contains(&self, p: [f64; 3]) -> bool {
        match self {
            Csg::Box { min, max } => (0..3).all(|i| p[i] > min[i] + 1e-9 && p[i] < max[i] - 1e-9),
            Csg::Union { parts } | Csg::Compound { parts } => parts.iter().any(|c| c.contains(p)),
            Csg::Difference { base, tool } => base.contains(p) && !tool.contains(p),
        }
    }

    fn collect_coords(&self, axis: usize, out: &mut Vec<f64>) {
        match self {
            Csg::Box { min, max } => {
                out.push(min[axis]);
                out.push(max[axis]);
            }
            Csg::Union { parts } | Csg::Compound { parts } => {
                for part in parts {
                    part.collect_coords(axis, out);
                }
            }
            Csg::Difference { base, tool } => {
                base.collect_coords(axis, out);
                tool.collect_coords(axis, out);
            }
        }
    }

    fn grid(&self) -> Grid {
        let axis = |i| {
            let mut values = Vec::new();
            self.collect_coords(i, &mut values);
            sorted_unique(&values)
        };
        Grid::new(self, [axis(0), axis(1), axis(2)])
    }

    /// Exact enclosed volume.
    pub fn volume(&self) -> f64 {
        let grid = self.grid();
        let mut total = 0.0;
        for (ix, iy, iz) in grid.cells() {
            if grid.is_in(ix, iy, iz) {
                total += grid.cell_volume(ix, iy, iz);
            }
        }
        total
    }

    pub fn is_empty(&self) -> bool {
        self.volume() < 1e-12
    }

    /// Boundary quads between inside and outside grid cells, outward normals.
    pub fn boundary(&self) -> Vec<Quad> {
        let grid = self.grid();
        let mut quads = Vec::new();
        for (ix, iy, iz) in grid.cells() {
            if !grid.is_in(ix, iy, iz) {
                continue;
            }
            let cell = [ix, iy, iz];
            for axis in 0..3 {
                for positive in [false, true] {
                    let mut neighbour = cell.map(|c| c as isize);
                    neighbour[axis] += if positive { 1 } else { -1 };
                    if grid.is_in_signed(neighbour) {
                        continue;
                    }
                    quads.push(grid.cell_face(cell, axis, positive));
                }
            }
        }
        quads
    }

    /// Flatten nested unions and drop boxes contained in a sibling box.
    pub fn simplified(&self) -> Csg {
        match self {
            Csg::Union { parts } => {
                let mut flat = Vec::new();
                for part in parts {
                    match part.simplified() {
                        Csg::Union { parts } => flat.extend(parts),
                        other => flat.push(other),
                    }
                }
                let mut kept: Vec<Csg> = Vec::new();
                for (i, candidate) in flat.iter().enumerate() {
                    let swallowed = flat.iter().enumerate().any(|(j, other)| {
                        i != j && box_contains(other, candidate) && !(box_contains(candidate, other) && j > i)
                    });
                    if !swallowed {
                        kept.push(candidate.clone());
                    }
                }
                if kept.len() == 1 {
                    kept.remove(0)
                } else {
                    Csg::Union { parts: kept }
                }
            }
            Csg::Difference { base, tool } => Csg::Difference {
                base: Box::new(base.simplified()),
                tool: Box::new(tool.simplified()),
            },
            other => other.clone(),
        }
    }

    /// Number of leaf boxes in the expression.
    pub fn leaf_count(&self) -> usize {
        match self {
            Csg::Box { .. } => 1,
            Csg::Union { parts } | Csg::Compound { parts } => parts.iter().map(Csg::leaf_count).sum(),
            Csg::Difference { base, tool } => base.leaf_count() + tool.leaf_count(),
        }
    }
}

/// `outer` and `inner` are both boxes and `outer` fully encloses `inner`.
fn box_contains(outer: &Csg, inner: &Csg) -> bool {
    match (outer, inner) {
        (Csg::Box { min: omin, max: omax }, Csg::Box { min: imin, max: imax }) => {
            (0..3).all(|i| omin[i] <= imin[i] && omax[i] >= imax[i])
        }
        _ => false,
    }
}

/// Sort floating-point values and remove near-duplicates.
fn sorted_unique(values: &[f64]) -> Vec<f64> {
    let mut v: Vec<f64> = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v.dedup_by(|a, b| (*a - *b).abs() < 1e-12);
    v
}

/// Rectilinear grid with a precomputed inside/outside flag per cell.
struct Grid {
    axes: [Vec<f64>; 3],
    dims: [usize; 3],
    inside: Vec<bool>,
}

impl Grid {
    fn new(shape: &Csg, axes: [Vec<f64>; 3]) -> Self {
        let dims = [0, 1, 2].map(|i| axes[i].len().saturating_sub(1));
        let mut inside = Vec::with_capacity(dims[0] * dims[1] * dims[2]);
        for ix in 0..dims[0] {
            for iy in 0..dims[1] {
                for iz in 0..dims[2] {
                    let centre = [
                        (axes[0][ix] + axes[0][ix + 1]) / 2.0,
                        (axes[1][iy] + axes[1][iy + 1]) / 2.0,
                        (axes[2][iz] + axes[2][iz + 1]) / 2.0,
                    ];
                    inside.push(shape.contains(centre));
                }
            }
        }
        Self { axes, dims, inside }
    }

    fn cells(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        let [nx, ny, nz] = self.dims;
        (0..nx).flat_map(move |ix| (0..ny).flat_map(move |iy| (0..nz).map(move |iz| (ix, iy, iz))))
    }

    fn is_in(&self, ix: usize, iy: usize, iz: usize) -> bool {
        self.inside[(ix * self.dims[1] + iy) * self.dims[2] + iz]
    }

    fn is_in_signed(&self, cell: [isize; 3]) -> bool {
        if (0..3).any(|i| cell[i] < 0 || cell[i] as usize >= self.dims[i]) {
            return false;
        }
        self.is_in(cell[0] as usize, cell[1] as usize, cell[2] as usize)
    }

    fn cell_volume(&self, ix: usize, iy: usize, iz: usize) -> f64 {
        (self.axes[0][ix + 1] - self.axes[0][ix])
            * (self.axes[1][iy + 1] - self.axes[1][iy])
            * (self.axes[2][iz + 1] - self.axes[2][iz])
    }

    fn cell_face(&self, cell: [usize; 3], axis: usize, positive: bool) -> Quad {
        let lo = [0, 1, 2].map(|i| self.axes[i][cell[i]]);
        let hi = [0, 1, 2].map(|i| self.axes[i][cell[i] + 1]);
        let u = (axis + 1) % 3;
        let v = (axis + 2) % 3;
        let plane = if positive { hi[axis] } else { lo[axis] };

        let corner = |a: f64, b: f64| {
            let mut p = [0.0; 3];
            p[axis] = plane;
            p[u] = a;
            p[v] = b;
            p
        };
        let mut corners = [
            corner(lo[u], lo[v]),
            corner(hi[u], lo[v]),
            corner(hi[u], hi[v]),
            corner(lo[u], hi[v]),
        ];
        // (u, v, axis) is right-handed, so the winding above faces +axis.
        if !positive {
            corners.reverse();
        }
        let mut normal = [0.0; 3];
        normal[axis] = if positive { 1.0 } else { -1.0 };
        Quad { corners, normal }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_at(x: f64) -> Csg {
        Csg::cuboid([x, 0.0, 0.0], [x + 1.0, 1.0, 1.0])
    }

    #[test]
    fn test_box_volume() {
        assert_relative_eq!(Csg::cuboid([0.0; 3], [2.0, 3.0, 4.0]).volume(), 24.0);
    }

    #[test]
    fn test_union_of_half_overlapping_boxes() {
        let u = Csg::Union {
            parts: vec![unit_at(0.0), unit_at(0.5)],
        };
        assert_relative_eq!(u.volume(), 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_difference_removes_overlap() {
        let d = Csg::Difference {
            base: Box::new(unit_at(0.0)),
            tool: Box::new(unit_at(0.5)),
        };
        assert_relative_eq!(d.volume(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_difference_can_be_empty() {
        let d = Csg::Difference {
            base: Box::new(unit_at(0.0)),
            tool: Box::new(Csg::cuboid([-1.0; 3], [2.0; 3])),
        };
        assert!(d.is_empty());
        assert!(d.boundary().is_empty());
    }

    #[test]
    fn test_box_boundary_has_six_quads() {
        let quads = unit_at(0.0).boundary();
        assert_eq!(quads.len(), 6);
        let normal_sum = quads.iter().fold([0.0; 3], |acc, q| {
            [acc[0] + q.normal[0], acc[1] + q.normal[1], acc[2] + q.normal[2]]
        });
        assert_eq!(normal_sum, [0.0; 3]);
    }

    #[test]
    fn test_simplify_drops_contained_box_and_keeps_volume() {
        let u = Csg::Union {
            parts: vec![
                Csg::Union {
                    parts: vec![Csg::cuboid([0.0; 3], [2.0; 3]), unit_at(0.0)],
                },
                unit_at(5.0),
            ],
        };
        let s = u.simplified();
        assert_eq!(s.leaf_count(), 2);
        assert_relative_eq!(s.volume(), u.volume(), epsilon = 1e-12);
    }

    #[test]
    fn test_simplify_keeps_one_of_identical_boxes() {
        let u = Csg::Union {
            parts: vec![unit_at(0.0), unit_at(0.0)],
        };
        assert_eq!(u.simplified(), unit_at(0.0));
    }
}

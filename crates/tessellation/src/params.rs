use serde::{Deserialize, Serialize};

use crate::error::TessellationError;

/// Triangulation settings for [`crate::MeshCache::mesh`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshParams {
    /// Maximum chordal deviation.
    pub tolerance: f64,
    /// Maximum angular deviation in radians.
    pub angular_tolerance: f64,
    /// Leave `RenderMesh::normals` empty.
    pub skip_normals: bool,
}

impl Default for MeshParams {
    fn default() -> Self {
        Self {
            tolerance: 1e-3,
            angular_tolerance: 0.1,
            skip_normals: false,
        }
    }
}

impl MeshParams {
    /// Coarse settings for previews.
    pub fn preview() -> Self {
        Self {
            tolerance: 1e-1,
            angular_tolerance: 0.5,
            skip_normals: true,
        }
    }

    /// Fine settings for export-quality meshes.
    pub fn fine() -> Self {
        Self {
            tolerance: 1e-5,
            angular_tolerance: 0.05,
            skip_normals: false,
        }
    }

    /// Inner cache key. Two parameter sets share a key only if every field matches.
    pub fn cache_key(&self) -> String {
        format!(
            "mesh:tol={}:ang={}:normals={}",
            self.tolerance, self.angular_tolerance, !self.skip_normals
        )
    }

    pub fn validate(&self) -> Result<(), TessellationError> {
        check_tolerances(self.tolerance, self.angular_tolerance)
    }
}

/// Discretization settings for [`crate::MeshCache::mesh_edges`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeParams {
    pub tolerance: f64,
    pub angular_tolerance: f64,
}

impl Default for EdgeParams {
    fn default() -> Self {
        Self {
            tolerance: 1e-3,
            angular_tolerance: 0.1,
        }
    }
}

impl EdgeParams {
    pub fn cache_key(&self) -> String {
        format!("edges:tol={}:ang={}", self.tolerance, self.angular_tolerance)
    }

    pub fn validate(&self) -> Result<(), TessellationError> {
        check_tolerances(self.tolerance, self.angular_tolerance)
    }
}

fn check_tolerances(tolerance: f64, angular_tolerance: f64) -> Result<(), TessellationError> {
    if !(tolerance.is_finite() && tolerance > 0.0) {
        return Err(TessellationError::InvalidParameter {
            reason: format!("tolerance must be positive, got {tolerance}"),
        });
    }
    if !(angular_tolerance.is_finite() && angular_tolerance > 0.0) {
        return Err(TessellationError::InvalidParameter {
            reason: format!("angular tolerance must be positive, got {angular_tolerance}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_differ_per_field() {
        let base = MeshParams::default();
        let keys = [
            base.cache_key(),
            MeshParams { tolerance: 2e-3, ..base }.cache_key(),
            MeshParams { angular_tolerance: 0.2, ..base }.cache_key(),
            MeshParams { skip_normals: true, ..base }.cache_key(),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(base.cache_key(), MeshParams::default().cache_key());
    }

    #[test]
    fn test_mesh_and_edge_keys_never_collide() {
        assert_ne!(MeshParams::default().cache_key(), EdgeParams::default().cache_key());
    }

    #[test]
    fn test_rejects_non_positive_tolerances() {
        assert!(MeshParams { tolerance: 0.0, ..Default::default() }.validate().is_err());
        assert!(EdgeParams { angular_tolerance: f64::NAN, ..Default::default() }.validate().is_err());
        assert!(MeshParams::preview().validate().is_ok());
    }

    #[test]
    fn test_params_deserialize_with_defaults() {
        let params: MeshParams = serde_json::from_str(r#"{"skip_normals": true}"#).unwrap();
        assert!(params.skip_normals);
        assert_eq!(params.tolerance, MeshParams::default().tolerance);
    }
}

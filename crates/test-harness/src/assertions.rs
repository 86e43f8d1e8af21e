//! Rich assertion helpers with diagnostic output.
//!
//! Each helper returns `Err(HarnessError::AssertionFailed)` with expected vs
//! actual and the caller's context string instead of panicking.

use lifecycle::Handle;
use native_kernel::{MockControl, NativeRef, RenderMesh};

use crate::helpers::{mesh_bounding_box, shape_volume, HarnessError};
use crate::oracle::OracleVerdict;

/// Assert the kernel volume of `shape` is within `tol` of `expected`.
pub fn assert_volume_near(shape: &Handle, expected: f64, tol: f64, ctx: &str) -> Result<(), HarnessError> {
    let actual = shape_volume(shape)?;
    if (actual - expected).abs() <= tol {
        Ok(())
    } else {
        Err(HarnessError::AssertionFailed {
            detail: format!(
                "[{}] volume: expected {:.6}, got {:.6} (tol={})",
                ctx, expected, actual, tol
            ),
        })
    }
}

/// Assert the kernel volume of `shape` lies strictly between `low` and `high`.
pub fn assert_volume_between(shape: &Handle, low: f64, high: f64, ctx: &str) -> Result<(), HarnessError> {
    let actual = shape_volume(shape)?;
    if actual > low && actual < high {
        Ok(())
    } else {
        Err(HarnessError::AssertionFailed {
            detail: format!("[{}] volume {:.6} not in ({}, {})", ctx, actual, low, high),
        })
    }
}

/// Assert `raw` reached the kernel's release exactly once.
pub fn assert_released_once(control: &MockControl, raw: NativeRef, ctx: &str) -> Result<(), HarnessError> {
    let attempts = control.release_attempts(raw);
    if attempts == 1 {
        Ok(())
    } else {
        Err(HarnessError::AssertionFailed {
            detail: format!("[{}] {:?} released {} times, expected once", ctx, raw, attempts),
        })
    }
}

/// Assert the exact number of live native objects.
pub fn assert_live_objects(control: &MockControl, expected: usize, ctx: &str) -> Result<(), HarnessError> {
    let live = control.live_objects();
    if live == expected {
        Ok(())
    } else {
        Err(HarnessError::AssertionFailed {
            detail: format!(
                "[{}] expected {} live native objects, got {} (released so far: {})",
                ctx,
                expected,
                live,
                control.released().len()
            ),
        })
    }
}

/// Assert the number of boolean-family native calls.
pub fn assert_boolean_calls(control: &MockControl, expected: usize, ctx: &str) -> Result<(), HarnessError> {
    let calls = control.boolean_calls();
    if calls == expected {
        Ok(())
    } else {
        Err(HarnessError::AssertionFailed {
            detail: format!("[{}] expected {} boolean calls, got {}", ctx, expected, calls),
        })
    }
}

/// Assert the mesh bounding box matches expected values within tolerance.
pub fn assert_bounding_box(
    mesh: &RenderMesh,
    expected_min: [f32; 3],
    expected_max: [f32; 3],
    tol: f32,
    ctx: &str,
) -> Result<(), HarnessError> {
    let (actual_min, actual_max) = mesh_bounding_box(mesh).ok_or_else(|| HarnessError::AssertionFailed {
        detail: format!("[{}] mesh has no vertices", ctx),
    })?;

    for i in 0..3 {
        if (actual_min[i] - expected_min[i]).abs() > tol {
            return Err(HarnessError::AssertionFailed {
                detail: format!(
                    "[{}] bounding box min[{}]: expected {:.3}, got {:.3} (tol={})",
                    ctx, i, expected_min[i], actual_min[i], tol,
                ),
            });
        }
        if (actual_max[i] - expected_max[i]).abs() > tol {
            return Err(HarnessError::AssertionFailed {
                detail: format!(
                    "[{}] bounding box max[{}]: expected {:.3}, got {:.3} (tol={})",
                    ctx, i, expected_max[i], actual_max[i], tol,
                ),
            });
        }
    }
    Ok(())
}

/// Turn the first failed verdict into an error.
pub fn assert_all_pass(verdicts: &[OracleVerdict]) -> Result<(), HarnessError> {
    match verdicts.iter().find(|v| !v.passed) {
        None => Ok(()),
        Some(v) => Err(HarnessError::OracleFailure {
            oracle: v.oracle_name.clone(),
            detail: v.detail.clone(),
        }),
    }
}

//! N-ary fuse and cut dispatch.
//!
//! Each call probes the kernel's capabilities once, builds a plan of
//! strategies and tries them in order. Transient results live in a scope per
//! stage: consumed intermediates are released right away, and whatever a
//! failed stage left behind is released when its scope closes.

use std::time::Instant;

use lifecycle::{Handle, Scope};
use native_kernel::{GlueMode, KernelError, NativeKernel, NativeRef, SharedKernel};
use tracing::{debug, info, instrument, warn};

use crate::strategy::OperationStrategy;
use crate::types::{BooleanOutput, CutOptions, Diagnostics, FuseOptions, OpError, StageFailure};

/// Boolean operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanKind {
    Union,
    Subtract,
}

impl BooleanKind {
    fn operation(self) -> &'static str {
        match self {
            BooleanKind::Union => "fuse_all",
            BooleanKind::Subtract => "cut_all",
        }
    }
}

/// Native calls made while running one strategy.
struct Session<'a> {
    kernel: &'a SharedKernel,
    scope: &'a Scope,
    diagnostics: &'a mut Diagnostics,
}

impl Session<'_> {
    /// Run a native constructor and register its result in the stage scope.
    fn call(
        &mut self,
        f: impl FnOnce(&mut dyn NativeKernel) -> Result<NativeRef, KernelError>,
    ) -> Result<Handle, OpError> {
        self.diagnostics.native_calls += 1;
        let raw = self.kernel.with(f)?;
        Ok(self.scope.adopt(self.kernel, raw))
    }

    /// Release an intermediate once it has been consumed. Caller-owned
    /// operands are never registered and are left alone.
    fn consume(&mut self, handle: &Handle) {
        if !self.scope.forget(handle) {
            return;
        }
        if let Err(error) = handle.release() {
            warn!(%error, "failed to release boolean intermediate");
            self.diagnostics
                .warnings
                .push(format!("intermediate release failed: {error}"));
        }
    }

    /// Apply the simplification pass to the final result only.
    fn finish(&mut self, result: Handle, simplify: bool) -> Result<Handle, OpError> {
        if !simplify {
            return Ok(result);
        }
        let raw = result.raw()?;
        let simplified = self.call(|k| k.simplify(raw))?;
        self.consume(&result);
        Ok(simplified)
    }

    fn fuse_pairwise(&mut self, operands: &[Handle]) -> Result<Handle, OpError> {
        if let [single] = operands {
            return Ok(single.clone());
        }
        let mid = operands.len() / 2;
        let left = self.fuse_pairwise(&operands[..mid])?;
        let right = self.fuse_pairwise(&operands[mid..])?;
        let (a, b) = (left.raw()?, right.raw()?);
        let fused = self.call(|k| k.fuse(a, b))?;
        self.consume(&left);
        self.consume(&right);
        Ok(fused)
    }

    fn cut_sequential(&mut self, base: &Handle, tools: &[Handle]) -> Result<Handle, OpError> {
        let mut current = base.clone();
        for tool in tools {
            let (a, b) = (current.raw()?, tool.raw()?);
            let next = self.call(|k| k.cut(a, b))?;
            self.consume(&current);
            current = next;
        }
        Ok(current)
    }
}

fn raws(handles: &[Handle]) -> Result<Vec<NativeRef>, OpError> {
    handles.iter().map(|h| h.raw().map_err(OpError::from)).collect()
}

/// Every operand must be live and owned by `kernel`.
fn validate_operands(kernel: &SharedKernel, operands: &[&Handle]) -> Result<(), OpError> {
    for (index, handle) in operands.iter().enumerate() {
        handle.raw()?;
        if !handle.kernel().same_kernel(kernel) {
            return Err(OpError::InvalidParameter {
                reason: format!("operand {index} belongs to a different kernel instance"),
            });
        }
    }
    Ok(())
}

/// Try each planned strategy until one succeeds.
///
/// Only kernel failures move on to the next stage; anything else (a disposed
/// operand, say) would fail every stage the same way and is returned as is.
fn run_plan(
    kind: BooleanKind,
    kernel: &SharedKernel,
    plan: &[OperationStrategy],
    diagnostics: &mut Diagnostics,
    mut stage: impl FnMut(OperationStrategy, &mut Session<'_>) -> Result<Handle, OpError>,
) -> Result<(Handle, OperationStrategy), OpError> {
    let operation = kind.operation();
    let mut failures = Vec::new();
    for &strategy in plan {
        debug!(operation, ?strategy, "attempting strategy");
        let scope = Scope::new();
        let outcome = stage(
            strategy,
            &mut Session {
                kernel,
                scope: &scope,
                diagnostics: &mut *diagnostics,
            },
        );
        match outcome {
            Ok(handle) => {
                scope.forget(&handle);
                if let Err(error) = scope.close() {
                    warn!(%error, operation, "release failures after successful stage");
                    diagnostics.warnings.push(error.to_string());
                }
                return Ok((handle, strategy));
            }
            Err(OpError::Kernel(error)) => {
                warn!(operation, ?strategy, %error, "strategy failed, trying next");
                diagnostics
                    .warnings
                    .push(format!("{strategy:?} strategy failed: {error}"));
                if let Err(close) = scope.close() {
                    warn!(error = %close, operation, "release failures after failed stage");
                }
                failures.push(StageFailure { strategy, error });
            }
            Err(other) => return Err(other),
        }
    }
    Err(OpError::StrategyFailed {
        operation: operation.to_string(),
        stages: failures,
    })
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Fuse every operand into one body.
///
/// The result matches associative pairwise fusion. `[]` is rejected and a
/// single operand is returned unchanged without any native call. The
/// operands stay owned by the caller; the returned handle is not registered
/// in any scope.
#[instrument(skip(operands), fields(count = operands.len()))]
pub fn fuse_all(operands: &[Handle], options: &FuseOptions) -> Result<BooleanOutput, OpError> {
    let started = Instant::now();
    let first = operands.first().ok_or_else(|| OpError::InvalidParameter {
        reason: "fuse_all needs at least one operand".into(),
    })?;
    let kernel = first.kernel().clone();
    validate_operands(&kernel, &operands.iter().collect::<Vec<_>>())?;

    if operands.len() == 1 {
        debug!("single operand, returning it unchanged");
        return Ok(BooleanOutput {
            handle: first.clone(),
            strategy: None,
            diagnostics: Diagnostics::default(),
        });
    }

    let plan = OperationStrategy::plan_fuse(options.strategy, kernel.capabilities());
    debug!(?plan, "fuse plan");
    let mut diagnostics = Diagnostics::default();
    let glue = options.glue;
    let (handle, strategy) = run_plan(
        BooleanKind::Union,
        &kernel,
        &plan,
        &mut diagnostics,
        |strategy, session| {
            let fused = match strategy {
                OperationStrategy::BatchFastPath => {
                    let args = raws(operands)?;
                    session.call(|k| k.fuse_bulk(&args, glue))?
                }
                OperationStrategy::Native => {
                    let args = raws(operands)?;
                    session.call(|k| k.general_fuse(&args, glue))?
                }
                OperationStrategy::Pairwise => session.fuse_pairwise(operands)?,
            };
            session.finish(fused, options.simplify)
        },
    )?;

    let kind = handle
        .raw()
        .map_err(OpError::from)
        .and_then(|raw| Ok(kernel.with(|k| k.shape_kind(raw))?));
    let rejected = match kind {
        Ok(found) if found.is_body() => None,
        Ok(found) => Some(OpError::TypeMismatch {
            operation: "fuse_all".into(),
            expected: "solid or compound".into(),
            found,
        }),
        Err(error) => Some(error),
    };
    if let Some(error) = rejected {
        if let Err(release) = handle.release() {
            warn!(error = %release, "failed to release rejected fuse result");
        }
        return Err(error);
    }

    diagnostics.elapsed_ms = elapsed_ms(started);
    info!(
        ?strategy,
        native_calls = diagnostics.native_calls,
        warnings = diagnostics.warnings.len(),
        "fuse_all complete"
    );
    Ok(BooleanOutput {
        handle,
        strategy: Some(strategy),
        diagnostics,
    })
}

/// Subtract every tool from `base`.
///
/// With no tools the base is returned unchanged. Under the native preference
/// a single tool is cut directly; several tools are first gathered into one
/// compound. Forced pairwise folds the tools one cut at a time.
#[instrument(skip(base, tools), fields(tools = tools.len()))]
pub fn cut_all(base: &Handle, tools: &[Handle], options: &CutOptions) -> Result<BooleanOutput, OpError> {
    let started = Instant::now();
    let kernel = base.kernel().clone();
    let mut all = vec![base];
    all.extend(tools);
    validate_operands(&kernel, &all)?;

    if tools.is_empty() {
        debug!("no tools, returning base unchanged");
        return Ok(BooleanOutput {
            handle: base.clone(),
            strategy: None,
            diagnostics: Diagnostics::default(),
        });
    }

    let plan = OperationStrategy::plan_cut(options.strategy, kernel.capabilities());
    debug!(?plan, "cut plan");
    let mut diagnostics = Diagnostics::default();
    let glue: GlueMode = options.glue;
    let (handle, strategy) = run_plan(
        BooleanKind::Subtract,
        &kernel,
        &plan,
        &mut diagnostics,
        |strategy, session| {
            let base_raw = base.raw()?;
            let cut = match strategy {
                OperationStrategy::BatchFastPath => {
                    let tool_raws = raws(tools)?;
                    session.call(|k| k.cut_bulk(base_raw, &tool_raws, glue))?
                }
                OperationStrategy::Native => match tools {
                    [tool] => {
                        let tool_raw = tool.raw()?;
                        session.call(|k| k.cut(base_raw, tool_raw))?
                    }
                    _ => {
                        let tool_raws = raws(tools)?;
                        let compound = session.call(|k| k.make_compound(&tool_raws))?;
                        let compound_raw = compound.raw()?;
                        let cut = session.call(|k| k.cut(base_raw, compound_raw))?;
                        session.consume(&compound);
                        cut
                    }
                },
                OperationStrategy::Pairwise => session.cut_sequential(base, tools)?,
            };
            session.finish(cut, options.simplify)
        },
    )?;

    diagnostics.elapsed_ms = elapsed_ms(started);
    info!(
        ?strategy,
        native_calls = diagnostics.native_calls,
        warnings = diagnostics.warnings.len(),
        "cut_all complete"
    );
    Ok(BooleanOutput {
        handle,
        strategy: Some(strategy),
        diagnostics,
    })
}

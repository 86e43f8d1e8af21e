//! Workbench: fluent API for scripting shape workflows in tests.
//!
//! Goes through the public entry points (`fuse_all`, `cut_all`, the mesh
//! cache, import/export staging), not a simulation. Shapes are addressed by
//! name and owned by one scope that is closed by [`Workbench::finish`].

use std::collections::HashMap;
use std::rc::Rc;

use file_format::{export_shape, import_shape};
use lifecycle::{Handle, Scope};
use modeling_ops::{cut_all, fuse_all, BooleanOutput, CutOptions, Diagnostics, FuseOptions, OperationStrategy};
use native_kernel::{Capabilities, EdgeMesh, FileFormat, MockControl, RenderMesh, SharedKernel};
use tessellation::{EdgeParams, MeshCache, MeshParams};
use tracing::debug;

use crate::helpers::*;
use crate::oracle::{self, OracleVerdict};

/// A fluent builder for constructing and verifying shapes in tests.
pub struct Workbench {
    pub kernel: SharedKernel,
    pub control: MockControl,
    scope: Scope,
    cache: MeshCache,
    named: HashMap<String, Handle>,
    diagnostics: HashMap<String, Diagnostics>,
    history: Vec<(String, String)>,
}

impl Workbench {
    /// Workbench over a mock kernel exposing every fast path.
    pub fn mock() -> Self {
        Self::with_capabilities(Capabilities::full())
    }

    /// Workbench over a mock kernel with the given capability set.
    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        let (kernel, control) = mock_kernel(capabilities);
        Self {
            kernel,
            control,
            scope: Scope::new(),
            cache: MeshCache::new(),
            named: HashMap::new(),
            diagnostics: HashMap::new(),
            history: Vec::new(),
        }
    }

    // ── Construction ────────────────────────────────────────────────────

    pub fn add_box(&mut self, name: &str, min: [f64; 3], max: [f64; 3]) -> Result<&mut Self, HarnessError> {
        self.check_name_available(name)?;
        let handle = make_box(&self.kernel, min, max)?;
        self.insert(name, "box", handle);
        Ok(self)
    }

    /// Fuse named shapes. Returns the strategy that ran.
    pub fn fuse(
        &mut self,
        name: &str,
        operands: &[&str],
        options: &FuseOptions,
    ) -> Result<Option<OperationStrategy>, HarnessError> {
        self.check_name_available(name)?;
        let handles = self.handles(operands)?;
        let output = fuse_all(&handles, options)?;
        Ok(self.record(name, "fuse", output))
    }

    /// Cut named tools from a named base. Returns the strategy that ran.
    pub fn cut(
        &mut self,
        name: &str,
        base: &str,
        tools: &[&str],
        options: &CutOptions,
    ) -> Result<Option<OperationStrategy>, HarnessError> {
        self.check_name_available(name)?;
        let base = self.shape(base)?.clone();
        let tools = self.handles(tools)?;
        let output = cut_all(&base, &tools, options)?;
        Ok(self.record(name, "cut", output))
    }

    pub fn import(&mut self, name: &str, bytes: &[u8], format: FileFormat) -> Result<&mut Self, HarnessError> {
        self.check_name_available(name)?;
        let handle = import_shape(&self.kernel, bytes, format)?;
        self.insert(name, "import", handle);
        Ok(self)
    }

    /// Release a named shape before the workbench finishes.
    pub fn release(&mut self, name: &str) -> Result<(), HarnessError> {
        let handle = self.named.remove(name).ok_or_else(|| HarnessError::ShapeNotFound {
            name: name.to_string(),
        })?;
        self.scope.forget(&handle);
        handle.release().map_err(|e| HarnessError::AssertionFailed {
            detail: format!("release of {name} failed: {e}"),
        })
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn shape(&self, name: &str) -> Result<&Handle, HarnessError> {
        self.named.get(name).ok_or_else(|| HarnessError::ShapeNotFound {
            name: name.to_string(),
        })
    }

    pub fn volume(&self, name: &str) -> Result<f64, HarnessError> {
        shape_volume(self.shape(name)?)
    }

    pub fn diagnostics(&self, name: &str) -> Option<&Diagnostics> {
        self.diagnostics.get(name)
    }

    pub fn mesh(&mut self, name: &str, params: &MeshParams) -> Result<Rc<RenderMesh>, HarnessError> {
        let handle = self.shape(name)?.clone();
        Ok(self.cache.mesh(&handle, params)?)
    }

    pub fn edges(&mut self, name: &str, params: &EdgeParams) -> Result<Rc<EdgeMesh>, HarnessError> {
        let handle = self.shape(name)?.clone();
        Ok(self.cache.mesh_edges(&handle, params)?)
    }

    pub fn export(&self, name: &str, format: FileFormat) -> Result<Vec<u8>, HarnessError> {
        Ok(export_shape(self.shape(name)?, format)?)
    }

    /// `(name, operation)` pairs in creation order.
    pub fn history(&self) -> &[(String, String)] {
        &self.history
    }

    pub fn shape_count(&self) -> usize {
        self.named.len()
    }

    // ── Assertions ──────────────────────────────────────────────────────

    pub fn assert_volume(&self, name: &str, expected: f64, tol: f64) -> Result<&Self, HarnessError> {
        crate::assertions::assert_volume_near(self.shape(name)?, expected, tol, name)?;
        Ok(self)
    }

    pub fn assert_strategy(&self, name: &str, expected: OperationStrategy) -> Result<&Self, HarnessError> {
        let found = self
            .history
            .iter()
            .any(|(n, op)| n == name && op.ends_with(&format!("{expected:?}")));
        if found {
            Ok(self)
        } else {
            Err(HarnessError::AssertionFailed {
                detail: format!("{name} was not produced by {expected:?}. History: {:?}", self.history),
            })
        }
    }

    // ── Oracle Integration ──────────────────────────────────────────────

    /// Run all mesh oracles on a named shape's default mesh.
    pub fn check_mesh(&mut self, name: &str) -> Result<Vec<OracleVerdict>, HarnessError> {
        let mesh = self.mesh(name, &MeshParams::default())?;
        let mut verdicts = oracle::run_all_mesh_checks(&mesh);
        verdicts.push(oracle::check_mesh_volume(self.shape(name)?, &mesh, 1e-4));
        Ok(verdicts)
    }

    /// Close the owning scope, releasing every shape, and hand back the
    /// control view for post-mortem checks.
    pub fn finish(self) -> Result<MockControl, HarnessError> {
        let Workbench { scope, control, .. } = self;
        scope.close()?;
        Ok(control)
    }

    // ── Internal ────────────────────────────────────────────────────────

    fn check_name_available(&self, name: &str) -> Result<(), HarnessError> {
        if self.named.contains_key(name) {
            Err(HarnessError::DuplicateName {
                name: name.to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn handles(&self, names: &[&str]) -> Result<Vec<Handle>, HarnessError> {
        names.iter().map(|n| self.shape(n).cloned()).collect()
    }

    fn insert(&mut self, name: &str, operation: &str, handle: Handle) {
        debug!(name, operation, raw = ?handle.native_id(), "workbench shape");
        self.named.insert(name.to_string(), self.scope.register(handle));
        self.history.push((name.to_string(), operation.to_string()));
    }

    fn record(&mut self, name: &str, operation: &str, output: BooleanOutput) -> Option<OperationStrategy> {
        let label = match output.strategy {
            Some(strategy) => format!("{operation}:{strategy:?}"),
            None => format!("{operation}:passthrough"),
        };
        self.insert(name, &label, output.handle);
        self.diagnostics.insert(name.to_string(), output.diagnostics);
        output.strategy
    }
}

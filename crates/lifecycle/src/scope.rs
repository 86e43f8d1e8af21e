//! Scoped registration and deterministic LIFO release.

use std::cell::{Cell, RefCell};
use std::fmt;

use native_kernel::{NativeRef, SharedKernel};
use tracing::{debug, warn};

use crate::error::{CloseError, ReleaseError};
use crate::handle::Handle;

/// Anything a [`Scope`] can tear down.
pub trait Disposable {
    /// Release the resource. Must be safe to call more than once.
    fn dispose(&self) -> Result<(), ReleaseError>;
}

impl Disposable for Handle {
    fn dispose(&self) -> Result<(), ReleaseError> {
        self.release()
    }
}

/// A cleanup closure run at most once.
struct Deferred<F> {
    label: String,
    action: RefCell<Option<F>>,
}

impl<F> Disposable for Deferred<F>
where
    F: FnOnce() -> Result<(), ReleaseError>,
{
    fn dispose(&self) -> Result<(), ReleaseError> {
        match self.action.borrow_mut().take() {
            Some(action) => {
                debug!(label = %self.label, "running deferred cleanup");
                action()
            }
            None => Ok(()),
        }
    }
}

enum Entry {
    Handle(Handle),
    Other(Box<dyn Disposable>),
}

impl Entry {
    fn dispose(&self) -> Result<(), ReleaseError> {
        match self {
            Entry::Handle(h) => h.release(),
            Entry::Other(d) => d.dispose(),
        }
    }
}

/// Ordered registry of disposables owned by one unit of work.
///
/// Closing releases every entry in reverse registration order. A failing
/// release does not stop the others; the first failure is reported once all
/// releases were attempted. Dropping an unclosed scope closes it, so early
/// returns and panics release everything too.
///
/// A scope is `!Send` and owned by exactly one caller. Nested scopes keep
/// independent lists.
pub struct Scope {
    entries: RefCell<Vec<Entry>>,
    closed: Cell<bool>,
}

impl Scope {
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
            closed: Cell::new(false),
        }
    }

    /// Register a handle for release at scope exit and hand it back unchanged.
    pub fn register(&self, handle: Handle) -> Handle {
        self.entries.borrow_mut().push(Entry::Handle(handle.clone()));
        handle
    }

    /// Wrap a freshly returned native reference and register it.
    pub fn adopt(&self, kernel: &SharedKernel, raw: NativeRef) -> Handle {
        self.register(Handle::new(kernel, raw))
    }

    pub fn register_disposable(&self, disposable: impl Disposable + 'static) {
        self.entries.borrow_mut().push(Entry::Other(Box::new(disposable)));
    }

    /// Run `action` when the scope closes.
    pub fn defer<F>(&self, label: &str, action: F)
    where
        F: FnOnce() -> Result<(), ReleaseError> + 'static,
    {
        self.register_disposable(Deferred {
            label: label.to_string(),
            action: RefCell::new(Some(action)),
        });
    }

    /// Deregister every entry for `handle` so it survives scope exit.
    /// Returns whether the handle was registered.
    pub fn forget(&self, handle: &Handle) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|e| !matches!(e, Entry::Handle(h) if h.ptr_eq(handle)));
        before != entries.len()
    }

    /// Move ownership of `handle` from this scope to `outer`.
    pub fn escape_to(&self, handle: &Handle, outer: &Scope) -> Handle {
        self.forget(handle);
        outer.register(handle.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release everything registered, last registered first.
    pub fn close(self) -> Result<(), CloseError> {
        self.close_entries()
    }

    fn close_entries(&self) -> Result<(), CloseError> {
        if self.closed.replace(true) {
            return Ok(());
        }
        // Take the list first so disposables may open or close other scopes.
        let entries = std::mem::take(&mut *self.entries.borrow_mut());
        let total = entries.len();
        let mut first = None;
        let mut failed = 0;
        for entry in entries.into_iter().rev() {
            if let Err(error) = entry.dispose() {
                warn!(%error, "release failed while closing scope");
                failed += 1;
                first.get_or_insert(error);
            }
        }
        debug!(total, failed, "scope closed");
        match first {
            None => Ok(()),
            Some(first) => Err(CloseError { first, failed, total }),
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        if let Err(error) = self.close_entries() {
            warn!(%error, "scope dropped with release failures");
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("registered", &self.len())
            .field("closed", &self.closed.get())
            .finish()
    }
}

/// Run `body` with a fresh scope and close it on every exit path.
///
/// If `body` fails its error is returned and close failures are only logged.
/// If `body` succeeds but a release fails, the close failure is returned.
/// The value returned by `body` must not be registered in the scope if it is
/// meant to outlive it.
pub fn with_scope<R, E>(body: impl FnOnce(&Scope) -> Result<R, E>) -> Result<R, E>
where
    E: From<CloseError>,
{
    let scope = Scope::new();
    let result = body(&scope);
    match (result, scope.close()) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close)) => Err(close.into()),
        (Err(error), Ok(())) => Err(error),
        (Err(error), Err(close)) => {
            warn!(error = %close, "release failures while leaving a failed scope");
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use native_kernel::{MockControl, MockKernel};
    use std::rc::Rc;

    fn kernel() -> (SharedKernel, MockControl) {
        let mock = MockKernel::new();
        let control = mock.control();
        (SharedKernel::new(mock), control)
    }

    fn make_box(kernel: &SharedKernel, x: f64) -> NativeRef {
        kernel
            .with(|k| k.make_box([x, 0.0, 0.0], [x + 1.0, 1.0, 1.0]))
            .unwrap()
    }

    #[test]
    fn test_close_releases_in_reverse_order() {
        let (kernel, control) = kernel();
        let scope = Scope::new();
        let raws: Vec<_> = (0..3).map(|i| make_box(&kernel, i as f64)).collect();
        for &raw in &raws {
            scope.adopt(&kernel, raw);
        }
        assert!(control.released().is_empty());
        scope.close().unwrap();
        assert_eq!(control.released(), vec![raws[2], raws[1], raws[0]]);
    }

    #[test]
    fn test_close_continues_after_failure_and_reports_first() {
        let (kernel, control) = kernel();
        let scope = Scope::new();
        let a = scope.adopt(&kernel, make_box(&kernel, 0.0));
        let b = scope.adopt(&kernel, make_box(&kernel, 1.0));
        let c = scope.adopt(&kernel, make_box(&kernel, 2.0));
        control.fail_release_of(b.native_id());

        let err = scope.close().unwrap_err();
        assert_eq!(err.failed, 1);
        assert_eq!(err.total, 3);
        assert!(matches!(err.first, ReleaseError::Native { raw, .. } if raw == b.native_id()));
        assert_eq!(control.released(), vec![c.native_id(), a.native_id()]);
        assert!(a.is_disposed() && b.is_disposed() && c.is_disposed());
    }

    #[test]
    fn test_register_returns_same_handle() {
        let (kernel, _control) = kernel();
        let scope = Scope::new();
        let h = Handle::new(&kernel, make_box(&kernel, 0.0));
        let registered = scope.register(h.clone());
        assert!(registered.ptr_eq(&h));
        assert_eq!(scope.len(), 1);
    }

    #[test]
    fn test_drop_closes_scope() {
        let (kernel, control) = kernel();
        let raw = make_box(&kernel, 0.0);
        {
            let scope = Scope::new();
            scope.adopt(&kernel, raw);
        }
        assert_eq!(control.released(), vec![raw]);
    }

    #[test]
    fn test_forget_lets_handle_escape() {
        let (kernel, control) = kernel();
        let scope = Scope::new();
        let temp = scope.adopt(&kernel, make_box(&kernel, 0.0));
        let result = scope.adopt(&kernel, make_box(&kernel, 1.0));
        assert!(scope.forget(&result));
        assert!(!scope.forget(&result));
        scope.close().unwrap();
        assert!(temp.is_disposed());
        assert!(!result.is_disposed());
        assert_eq!(control.live_objects(), 1);
        result.release().unwrap();
    }

    #[test]
    fn test_nested_scopes_are_independent() {
        let (kernel, control) = kernel();
        let outer = Scope::new();
        let kept = outer.adopt(&kernel, make_box(&kernel, 0.0));
        let escaped = {
            let inner = Scope::new();
            let transient = inner.adopt(&kernel, make_box(&kernel, 1.0));
            let result = inner.adopt(&kernel, make_box(&kernel, 2.0));
            let escaped = inner.escape_to(&result, &outer);
            inner.close().unwrap();
            assert!(transient.is_disposed());
            escaped
        };
        assert!(!kept.is_disposed());
        assert!(!escaped.is_disposed());
        assert_eq!(outer.len(), 2);
        outer.close().unwrap();
        assert_eq!(control.live_objects(), 0);
    }

    #[test]
    fn test_handle_registered_twice_is_released_once() {
        let (kernel, control) = kernel();
        let outer = Scope::new();
        let inner = Scope::new();
        let h = outer.register(inner.adopt(&kernel, make_box(&kernel, 0.0)));
        inner.close().unwrap();
        outer.close().unwrap();
        assert_eq!(control.release_attempts(h.native_id()), 1);
    }

    #[test]
    fn test_deferred_cleanup_runs_once_in_order() {
        let (kernel, control) = kernel();
        let log = Rc::new(RefCell::new(Vec::new()));
        let scope = Scope::new();
        let raw = make_box(&kernel, 0.0);
        let first = Rc::clone(&log);
        scope.defer("first", move || {
            first.borrow_mut().push("first");
            Ok(())
        });
        scope.adopt(&kernel, raw);
        let second = Rc::clone(&log);
        scope.defer("second", move || {
            second.borrow_mut().push("second");
            Ok(())
        });
        scope.close().unwrap();
        assert_eq!(*log.borrow(), vec!["second", "first"]);
        assert_eq!(control.released(), vec![raw]);
    }

    #[test]
    fn test_closing_inner_scope_from_a_disposable() {
        let (kernel, control) = kernel();
        let outer = Scope::new();
        let inner = Scope::new();
        let raw_inner = make_box(&kernel, 0.0);
        let raw_outer = make_box(&kernel, 1.0);
        inner.adopt(&kernel, raw_inner);
        outer.adopt(&kernel, raw_outer);
        outer.defer("close inner", move || {
            inner.close().map_err(|e| e.first)
        });
        outer.close().unwrap();
        assert_eq!(control.released(), vec![raw_inner, raw_outer]);
    }

    #[test]
    fn test_with_scope_releases_on_error_path() {
        let (kernel, control) = kernel();
        let raw = make_box(&kernel, 0.0);
        let result: Result<(), CloseError> = with_scope(|scope| {
            scope.adopt(&kernel, raw);
            Err(CloseError {
                first: ReleaseError::Cleanup {
                    label: "body".into(),
                    reason: "aborted".into(),
                },
                failed: 0,
                total: 0,
            })
        });
        assert!(result.is_err());
        assert_eq!(control.released(), vec![raw]);
    }

    #[test]
    fn test_with_scope_reports_close_failure_after_success() {
        let (kernel, control) = kernel();
        let raw = make_box(&kernel, 0.0);
        control.fail_release_of(raw);
        let result: Result<u32, CloseError> = with_scope(|scope| {
            scope.adopt(&kernel, raw);
            Ok(7)
        });
        let err = result.unwrap_err();
        assert_eq!(err.total, 1);
    }
}

//! Owning wrapper around one native reference.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use native_kernel::{KernelError, NativeRef, SharedKernel};
use tracing::{debug, warn};

use crate::error::{HandleError, ReleaseError};
use crate::safety_net::SafetyNet;

pub(crate) struct HandleCell {
    pub(crate) raw: NativeRef,
    /// Shared with the safety net so it can tell explicit disposal apart
    /// from a reclaimed-while-live wrapper.
    pub(crate) disposed: Rc<Cell<bool>>,
    pub(crate) kernel: SharedKernel,
    tracked: bool,
}

impl Drop for HandleCell {
    fn drop(&mut self) {
        if !self.disposed.get() && !self.tracked {
            warn!(raw = ?self.raw, "native handle dropped without release; native memory leaked");
        }
    }
}

/// A native reference plus its disposed flag.
///
/// Clones share the same flag: releasing through any clone disposes all of
/// them. `Live --release--> Disposed`, and releasing again is a no-op.
/// Every other access after disposal fails with [`HandleError::Disposed`].
#[derive(Clone)]
pub struct Handle {
    cell: Rc<HandleCell>,
}

impl Handle {
    /// Take ownership of a freshly returned native reference.
    pub fn new(kernel: &SharedKernel, raw: NativeRef) -> Self {
        Self::build(kernel, raw, false)
    }

    /// Like [`Handle::new`], and register the handle with a safety net that
    /// releases it if every clone is dropped while still live.
    pub fn tracked(kernel: &SharedKernel, raw: NativeRef, net: &SafetyNet) -> Self {
        let handle = Self::build(kernel, raw, true);
        net.register(&handle);
        handle
    }

    fn build(kernel: &SharedKernel, raw: NativeRef, tracked: bool) -> Self {
        Self {
            cell: Rc::new(HandleCell {
                raw,
                disposed: Rc::new(Cell::new(false)),
                kernel: kernel.clone(),
                tracked,
            }),
        }
    }

    /// The native reference, for passing into a kernel call.
    pub fn raw(&self) -> Result<NativeRef, HandleError> {
        if self.cell.disposed.get() {
            return Err(HandleError::Disposed { raw: self.cell.raw });
        }
        Ok(self.cell.raw)
    }

    /// The native identity of the wrapped object, readable even after release.
    /// Never pass it to the kernel; use [`Handle::raw`] for that.
    pub fn native_id(&self) -> NativeRef {
        self.cell.raw
    }

    pub fn is_disposed(&self) -> bool {
        self.cell.disposed.get()
    }

    pub fn kernel(&self) -> &SharedKernel {
        &self.cell.kernel
    }

    /// Free the native object. Idempotent: only the first call reaches the kernel.
    ///
    /// A kernel-side failure still marks the handle disposed, since the native
    /// object may already be gone and a retry could double-free. The one
    /// exception is [`KernelError::Busy`], where nothing was attempted.
    pub fn release(&self) -> Result<(), ReleaseError> {
        if self.cell.disposed.replace(true) {
            return Ok(());
        }
        let raw = self.cell.raw;
        debug!(?raw, "releasing native handle");
        match self.cell.kernel.with(|k| k.release(raw)) {
            Ok(()) => Ok(()),
            Err(KernelError::Busy) => {
                self.cell.disposed.set(false);
                Err(ReleaseError::Native {
                    raw,
                    source: KernelError::Busy,
                })
            }
            Err(source) => Err(ReleaseError::Native { raw, source }),
        }
    }

    /// Whether both handles are clones of the same wrapper.
    pub fn ptr_eq(&self, other: &Handle) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    pub fn downgrade(&self) -> WeakHandle {
        WeakHandle {
            cell: Rc::downgrade(&self.cell),
        }
    }

    pub(crate) fn cell(&self) -> &Rc<HandleCell> {
        &self.cell
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("raw", &self.cell.raw)
            .field("disposed", &self.cell.disposed.get())
            .finish()
    }
}

/// Non-owning reference to a handle wrapper.
#[derive(Clone)]
pub struct WeakHandle {
    cell: Weak<HandleCell>,
}

impl WeakHandle {
    pub fn upgrade(&self) -> Option<Handle> {
        self.cell.upgrade().map(|cell| Handle { cell })
    }

    /// Some clone of the wrapper is still alive and it was not released.
    pub fn is_live(&self) -> bool {
        self.cell.upgrade().is_some_and(|cell| !cell.disposed.get())
    }

    /// Whether this weak reference was taken from `handle`'s wrapper.
    pub fn points_to(&self, handle: &Handle) -> bool {
        std::ptr::eq(self.cell.as_ptr(), Rc::as_ptr(&handle.cell))
    }
}

impl fmt::Debug for WeakHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakHandle").field("live", &self.is_live()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use native_kernel::{MockKernel, NativeKernel};

    fn kernel_with_box() -> (SharedKernel, native_kernel::MockControl, NativeRef) {
        let mut mock = MockKernel::new();
        let control = mock.control();
        let raw = mock.make_box([0.0; 3], [1.0; 3]).unwrap();
        (SharedKernel::new(mock), control, raw)
    }

    #[test]
    fn test_release_twice_calls_kernel_once() {
        let (kernel, control, raw) = kernel_with_box();
        let h = Handle::new(&kernel, raw);
        h.release().unwrap();
        assert!(h.is_disposed());
        h.release().unwrap();
        assert!(h.is_disposed());
        assert_eq!(control.release_attempts(raw), 1);
    }

    #[test]
    fn test_raw_after_release_is_typed_error() {
        let (kernel, _control, raw) = kernel_with_box();
        let h = Handle::new(&kernel, raw);
        assert_eq!(h.raw(), Ok(raw));
        h.release().unwrap();
        assert_eq!(h.raw(), Err(HandleError::Disposed { raw }));
        assert_eq!(h.native_id(), raw);
    }

    #[test]
    fn test_clones_share_disposed_flag() {
        let (kernel, control, raw) = kernel_with_box();
        let a = Handle::new(&kernel, raw);
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        b.release().unwrap();
        assert!(a.is_disposed());
        a.release().unwrap();
        assert_eq!(control.release_attempts(raw), 1);
    }

    #[test]
    fn test_failed_release_still_disposes() {
        let (kernel, control, raw) = kernel_with_box();
        control.fail_release_of(raw);
        let h = Handle::new(&kernel, raw);
        assert!(matches!(h.release(), Err(ReleaseError::Native { .. })));
        assert!(h.is_disposed());
        h.release().unwrap();
        assert_eq!(control.release_attempts(raw), 1);
    }

    #[test]
    fn test_release_while_kernel_busy_can_be_retried() {
        let (kernel, control, raw) = kernel_with_box();
        let h = Handle::new(&kernel, raw);
        let busy = kernel.with(|_k| Ok(h.release())).unwrap();
        assert!(matches!(
            busy,
            Err(ReleaseError::Native {
                source: KernelError::Busy,
                ..
            })
        ));
        assert!(!h.is_disposed());
        h.release().unwrap();
        assert_eq!(control.released(), vec![raw]);
    }

    #[test]
    fn test_weak_handle_tracks_liveness() {
        let (kernel, _control, raw) = kernel_with_box();
        let h = Handle::new(&kernel, raw);
        let weak = h.downgrade();
        assert!(weak.is_live());
        assert!(weak.points_to(&h));
        h.release().unwrap();
        assert!(!weak.is_live());
        assert!(weak.upgrade().is_some());
        drop(h);
        assert!(weak.upgrade().is_none());
    }
}

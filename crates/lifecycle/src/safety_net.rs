//! Best-effort backstop for handles that were never released.
//!
//! The net holds a weak association from each tracked wrapper to its native
//! reference. When [`SafetyNet::collect`] runs, every wrapper that was
//! dropped while still live gets its native object released. Nothing
//! guarantees `collect` runs promptly, or at all before exit, so it bounds
//! leakage from bugs and never replaces [`crate::Scope`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use native_kernel::{KernelError, NativeRef, SharedKernel};
use tracing::{debug, warn};

use crate::error::ReleaseError;
use crate::handle::{Handle, HandleCell};

struct WeakSafetyEntry {
    wrapper: Weak<HandleCell>,
    native: NativeRef,
    already_released: Rc<Cell<bool>>,
    kernel: SharedKernel,
}

/// Summary of one collection pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectReport {
    /// Leaked native objects released by this pass.
    pub reclaimed: usize,
    /// Entries dropped because their handle was released explicitly.
    pub already_released: usize,
    /// Entries whose wrapper is still reachable.
    pub still_live: usize,
    /// Releases attempted by this pass that failed.
    pub failures: Vec<ReleaseError>,
}

/// Registry of weakly held handles. Clones share the same registry.
#[derive(Clone, Default)]
pub struct SafetyNet {
    entries: Rc<RefCell<Vec<WeakSafetyEntry>>>,
}

impl SafetyNet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, handle: &Handle) {
        let cell = handle.cell();
        self.entries.borrow_mut().push(WeakSafetyEntry {
            wrapper: Rc::downgrade(cell),
            native: cell.raw,
            already_released: Rc::clone(&cell.disposed),
            kernel: cell.kernel.clone(),
        });
    }

    /// Entries not yet resolved by a collection pass.
    pub fn pending(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Finalize every tracked wrapper that is gone.
    ///
    /// Idempotent with explicit disposal: the disposed flag is shared with
    /// the handle, so an object released through its handle is never
    /// released again here.
    pub fn collect(&self) -> CollectReport {
        let entries = std::mem::take(&mut *self.entries.borrow_mut());
        let mut report = CollectReport::default();
        let mut keep = Vec::new();

        for entry in entries {
            if entry.already_released.get() {
                report.already_released += 1;
                continue;
            }
            if entry.wrapper.strong_count() > 0 {
                report.still_live += 1;
                keep.push(entry);
                continue;
            }
            entry.already_released.set(true);
            warn!(raw = ?entry.native, "safety net releasing a handle that was never released");
            match entry.kernel.with(|k| k.release(entry.native)) {
                Ok(()) => report.reclaimed += 1,
                Err(KernelError::Busy) => {
                    // Nothing was freed; retry on the next pass.
                    entry.already_released.set(false);
                    report.failures.push(ReleaseError::Native {
                        raw: entry.native,
                        source: KernelError::Busy,
                    });
                    keep.push(entry);
                }
                Err(source) => report.failures.push(ReleaseError::Native {
                    raw: entry.native,
                    source,
                }),
            }
        }

        // Handles tracked while this pass ran were pushed onto the emptied list.
        self.entries.borrow_mut().extend(keep);
        debug!(
            reclaimed = report.reclaimed,
            already_released = report.already_released,
            still_live = report.still_live,
            "safety net collected"
        );
        report
    }
}

impl fmt::Debug for SafetyNet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafetyNet").field("pending", &self.pending()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use native_kernel::{MockControl, MockKernel};

    fn kernel() -> (SharedKernel, MockControl) {
        let mock = MockKernel::new();
        let control = mock.control();
        (SharedKernel::new(mock), control)
    }

    fn tracked_box(kernel: &SharedKernel, net: &SafetyNet) -> Handle {
        let raw = kernel.with(|k| k.make_box([0.0; 3], [1.0; 3])).unwrap();
        Handle::tracked(kernel, raw, net)
    }

    #[test]
    fn test_collect_releases_dropped_live_handle() {
        let (kernel, control) = kernel();
        let net = SafetyNet::new();
        let h = tracked_box(&kernel, &net);
        let raw = h.native_id();
        drop(h);
        assert_eq!(control.live_objects(), 1);

        let report = net.collect();
        assert_eq!(report.reclaimed, 1);
        assert_eq!(control.released(), vec![raw]);
        assert_eq!(net.pending(), 0);
    }

    #[test]
    fn test_collect_skips_explicitly_released_handle() {
        let (kernel, control) = kernel();
        let net = SafetyNet::new();
        let h = tracked_box(&kernel, &net);
        let raw = h.native_id();
        h.release().unwrap();
        drop(h);

        let report = net.collect();
        assert_eq!(report.reclaimed, 0);
        assert_eq!(report.already_released, 1);
        assert_eq!(control.release_attempts(raw), 1);
    }

    #[test]
    fn test_collect_keeps_reachable_handles() {
        let (kernel, control) = kernel();
        let net = SafetyNet::new();
        let h = tracked_box(&kernel, &net);
        let report = net.collect();
        assert_eq!(report.still_live, 1);
        assert_eq!(net.pending(), 1);
        assert!(control.released().is_empty());

        let clone = h.clone();
        drop(h);
        assert_eq!(net.collect().still_live, 1);
        drop(clone);
        assert_eq!(net.collect().reclaimed, 1);
    }

    #[test]
    fn test_second_collect_after_reclaim_is_empty() {
        let (kernel, control) = kernel();
        let net = SafetyNet::new();
        let h = tracked_box(&kernel, &net);
        let weak = h.downgrade();
        drop(h);
        net.collect();
        assert!(weak.upgrade().is_none());
        assert_eq!(control.live_objects(), 0);
        assert_eq!(net.collect(), CollectReport::default());
    }

    #[test]
    fn test_collect_while_kernel_busy_retries_next_pass() {
        let (kernel, control) = kernel();
        let net = SafetyNet::new();
        let raw = tracked_box(&kernel, &net).native_id();

        let busy = kernel.with(|_| Ok(net.collect())).unwrap();
        assert_eq!(busy.reclaimed, 0);
        assert_eq!(busy.failures.len(), 1);
        assert_eq!(net.pending(), 1);
        assert_eq!(control.live_objects(), 1);

        let report = net.collect();
        assert_eq!(report.reclaimed, 1);
        assert_eq!(control.release_attempts(raw), 1);
        assert_eq!(control.live_objects(), 0);
        assert_eq!(net.pending(), 0);
    }

    #[test]
    fn test_collect_reports_failed_release() {
        let (kernel, control) = kernel();
        let net = SafetyNet::new();
        let h = tracked_box(&kernel, &net);
        control.fail_release_of(h.native_id());
        drop(h);
        let report = net.collect();
        assert_eq!(report.reclaimed, 0);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(net.pending(), 0);
    }
}

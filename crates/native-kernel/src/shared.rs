//! Single-threaded shared access to one kernel instance.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::traits::NativeKernel;
use crate::types::{Capabilities, KernelError};

/// Identity of one kernel instance. A [`crate::NativeRef`] is only unique
/// within the instance that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelId(usize);

/// A cloneable, `!Send` reference to one kernel instance.
///
/// The kernel is stateful and synchronous, so every holder (handles, scopes,
/// caches) shares it through this type. A call made while another call is
/// still borrowing the kernel fails with [`KernelError::Busy`].
#[derive(Clone)]
pub struct SharedKernel {
    inner: Rc<RefCell<dyn NativeKernel>>,
}

impl SharedKernel {
    pub fn new<K: NativeKernel + 'static>(kernel: K) -> Self {
        let inner: Rc<RefCell<dyn NativeKernel>> = Rc::new(RefCell::new(kernel));
        Self { inner }
    }

    /// Run `f` with exclusive access to the kernel.
    pub fn with<R>(
        &self,
        f: impl FnOnce(&mut dyn NativeKernel) -> Result<R, KernelError>,
    ) -> Result<R, KernelError> {
        let mut kernel = self.inner.try_borrow_mut().map_err(|_| KernelError::Busy)?;
        f(&mut *kernel)
    }

    /// Probe the optional entry points. Reports nothing when the kernel is busy.
    pub fn capabilities(&self) -> Capabilities {
        self.inner
            .try_borrow()
            .map(|k| k.capabilities())
            .unwrap_or_else(|_| Capabilities::minimal())
    }

    /// Whether both values refer to the same kernel instance.
    pub fn same_kernel(&self, other: &SharedKernel) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Stable for as long as any clone of this value is alive.
    pub fn id(&self) -> KernelId {
        KernelId(Rc::as_ptr(&self.inner).cast::<()>() as usize)
    }
}

impl fmt::Debug for SharedKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedKernel")
            .field("instance", &Rc::as_ptr(&self.inner).cast::<()>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_kernel::MockKernel;

    #[test]
    fn test_reentrant_call_reports_busy() {
        let kernel = SharedKernel::new(MockKernel::new());
        let inner = kernel.clone();
        let result = kernel.with(|k| {
            let nested = inner.with(|k2| k2.make_box([0.0; 3], [1.0; 3]));
            assert!(matches!(nested, Err(KernelError::Busy)));
            k.make_box([0.0; 3], [1.0; 3])
        });
        assert!(result.is_ok());
    }

    #[test]
    fn test_same_kernel_compares_instances() {
        let a = SharedKernel::new(MockKernel::new());
        let b = SharedKernel::new(MockKernel::new());
        assert!(a.same_kernel(&a.clone()));
        assert!(!a.same_kernel(&b));
        assert_eq!(a.id(), a.clone().id());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.capabilities(), Capabilities::full());
    }
}

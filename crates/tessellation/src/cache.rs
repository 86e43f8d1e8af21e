//! Memoization of derived data per native object.
//!
//! The outer key is the native reference itself, qualified by the kernel
//! instance that issued it. Derived hash codes are never used as keys, since
//! distinct objects may share one. Each slot keeps
//! a weak reference to the owning handle: once that handle is released or
//! dropped the slot is stale, and is replaced on the next lookup or removed
//! by [`IdentityCache::prune`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use lifecycle::{Handle, WeakHandle};
use native_kernel::{EdgeMesh, KernelId, NativeRef, RenderMesh};
use tracing::{debug, instrument};

use crate::error::TessellationError;
use crate::extract::{extract_edges, extract_mesh};
use crate::params::{EdgeParams, MeshParams};

/// Lookup counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    /// Slots discarded because their owner was gone.
    pub stale: usize,
}

struct Slot<V> {
    owner: WeakHandle,
    values: HashMap<String, Rc<V>>,
}

impl<V> Slot<V> {
    fn is_owned_by(&self, handle: &Handle) -> bool {
        self.owner.points_to(handle) && self.owner.is_live()
    }
}

type Identity = (KernelId, NativeRef);

fn identity(handle: &Handle) -> Identity {
    (handle.kernel().id(), handle.native_id())
}

/// Values of type `V` keyed by `(native identity, parameter key)`.
pub struct IdentityCache<V> {
    slots: HashMap<Identity, Slot<V>>,
    stats: CacheStats,
}

impl<V> IdentityCache<V> {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Return the cached value for `(owner, key)`, computing it with `f` on a miss.
    ///
    /// Repeated calls with the same live handle and key return the same `Rc`.
    pub fn get_or_try_insert_with<E>(
        &mut self,
        owner: &Handle,
        key: &str,
        f: impl FnOnce() -> Result<V, E>,
    ) -> Result<Rc<V>, E> {
        let id = identity(owner);
        if self.slots.get(&id).is_some_and(|slot| !slot.is_owned_by(owner)) {
            debug!(?id, "replacing stale cache slot");
            self.slots.remove(&id);
            self.stats.stale += 1;
        }
        let slot = self.slots.entry(id).or_insert_with(|| Slot {
            owner: owner.downgrade(),
            values: HashMap::new(),
        });
        if let Some(value) = slot.values.get(key) {
            self.stats.hits += 1;
            return Ok(Rc::clone(value));
        }
        self.stats.misses += 1;
        let value = Rc::new(f()?);
        slot.values.insert(key.to_string(), Rc::clone(&value));
        Ok(value)
    }

    /// Cached value without computing anything. Stale slots never answer.
    pub fn get(&self, owner: &Handle, key: &str) -> Option<Rc<V>> {
        self.slots
            .get(&identity(owner))
            .filter(|slot| slot.is_owned_by(owner))
            .and_then(|slot| slot.values.get(key))
            .cloned()
    }

    /// Drop every value derived from `owner`. Returns whether anything was cached.
    pub fn evict(&mut self, owner: &Handle) -> bool {
        self.slots.remove(&identity(owner)).is_some()
    }

    /// Drop slots whose owner was released or dropped. Returns how many were removed.
    pub fn prune(&mut self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.owner.is_live());
        let removed = before - self.slots.len();
        self.stats.stale += removed;
        removed
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Number of cached values across all objects.
    pub fn len(&self) -> usize {
        self.slots.values().map(|slot| slot.values.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

impl<V> Default for IdentityCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Mesh and edge caches plus the extraction entry points that use them.
///
/// Construct one with [`MeshCache::new`] for an isolated cache, or use
/// [`with_default_cache`] for the per-thread instance.
#[derive(Default)]
pub struct MeshCache {
    pub meshes: IdentityCache<RenderMesh>,
    pub edges: IdentityCache<EdgeMesh>,
}

impl MeshCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Triangle mesh of `shape`, memoized per object and parameter set.
    #[instrument(skip(self, shape), fields(shape = ?shape.native_id()))]
    pub fn mesh(&mut self, shape: &Handle, params: &MeshParams) -> Result<Rc<RenderMesh>, TessellationError> {
        shape.raw()?;
        params.validate()?;
        self.meshes
            .get_or_try_insert_with(shape, &params.cache_key(), || extract_mesh(shape, params))
    }

    /// Edge polylines of `shape`, memoized per object and parameter set.
    #[instrument(skip(self, shape), fields(shape = ?shape.native_id()))]
    pub fn mesh_edges(&mut self, shape: &Handle, params: &EdgeParams) -> Result<Rc<EdgeMesh>, TessellationError> {
        shape.raw()?;
        params.validate()?;
        self.edges
            .get_or_try_insert_with(shape, &params.cache_key(), || extract_edges(shape, params))
    }

    /// Forget everything derived from `shape`.
    pub fn evict(&mut self, shape: &Handle) -> bool {
        let meshes = self.meshes.evict(shape);
        let edges = self.edges.evict(shape);
        meshes || edges
    }

    pub fn prune(&mut self) -> usize {
        self.meshes.prune() + self.edges.prune()
    }

    pub fn clear(&mut self) {
        self.meshes.clear();
        self.edges.clear();
    }
}

thread_local! {
    static DEFAULT_CACHE: RefCell<MeshCache> = RefCell::new(MeshCache::new());
}

/// Run `f` with this thread's default cache.
///
/// Fails with [`TessellationError::CacheBusy`] when called from inside
/// another `with_default_cache` closure.
pub fn with_default_cache<R>(f: impl FnOnce(&mut MeshCache) -> R) -> Result<R, TessellationError> {
    DEFAULT_CACHE.with(|cache| {
        let mut cache = cache.try_borrow_mut().map_err(|_| TessellationError::CacheBusy)?;
        Ok(f(&mut cache))
    })
}

/// [`MeshCache::mesh`] on the default cache.
pub fn mesh(shape: &Handle, params: &MeshParams) -> Result<Rc<RenderMesh>, TessellationError> {
    with_default_cache(|cache| cache.mesh(shape, params))?
}

/// [`MeshCache::mesh_edges`] on the default cache.
pub fn mesh_edges(shape: &Handle, params: &EdgeParams) -> Result<Rc<EdgeMesh>, TessellationError> {
    with_default_cache(|cache| cache.mesh_edges(shape, params))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use native_kernel::{MockKernel, SharedKernel};

    fn kernel_and_box() -> (SharedKernel, Handle) {
        let kernel = SharedKernel::new(MockKernel::new());
        let raw = kernel.with(|k| k.make_box([0.0; 3], [1.0; 3])).unwrap();
        let handle = Handle::new(&kernel, raw);
        (kernel, handle)
    }

    #[test]
    fn test_hit_returns_same_rc() {
        let (_kernel, h) = kernel_and_box();
        let mut cache: IdentityCache<u32> = IdentityCache::new();
        let a = cache.get_or_try_insert_with(&h, "k", || Ok::<_, ()>(1)).unwrap();
        let b = cache
            .get_or_try_insert_with(&h, "k", || -> Result<u32, ()> { panic!("recomputed") })
            .unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1, stale: 0 });
    }

    #[test]
    fn test_failed_compute_is_not_cached() {
        let (_kernel, h) = kernel_and_box();
        let mut cache: IdentityCache<u32> = IdentityCache::new();
        assert!(cache.get_or_try_insert_with(&h, "k", || Err("boom")).is_err());
        assert!(cache.is_empty());
        assert_eq!(*cache.get_or_try_insert_with(&h, "k", || Ok::<_, &str>(2)).unwrap(), 2);
    }

    #[test]
    fn test_reused_native_ref_does_not_hit_old_entry() {
        let (kernel, first) = kernel_and_box();
        let raw = first.native_id();
        let mut cache: IdentityCache<&str> = IdentityCache::new();
        cache.get_or_try_insert_with(&first, "k", || Ok::<_, ()>("first")).unwrap();
        first.release().unwrap();
        assert!(cache.get(&first, "k").is_none());

        // A second wrapper around the same reference, as after native reuse.
        let second = Handle::new(&kernel, raw);
        let value = cache.get_or_try_insert_with(&second, "k", || Ok::<_, ()>("second")).unwrap();
        assert_eq!(*value, "second");
        assert_eq!(cache.stats().stale, 1);
    }

    #[test]
    fn test_same_ref_from_two_kernels_keeps_both_slots() {
        let (_first_kernel, a) = kernel_and_box();
        let (_second_kernel, b) = kernel_and_box();
        assert_eq!(a.native_id(), b.native_id());

        let mut cache: IdentityCache<&str> = IdentityCache::new();
        let first = cache.get_or_try_insert_with(&a, "k", || Ok::<_, ()>("a")).unwrap();
        let other = cache.get_or_try_insert_with(&b, "k", || Ok::<_, ()>("b")).unwrap();
        let again = cache.get_or_try_insert_with(&a, "k", || Ok::<_, ()>("recomputed")).unwrap();

        assert_eq!(*other, "b");
        assert!(Rc::ptr_eq(&first, &again));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 2, stale: 0 });
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_prune_drops_released_owners() {
        let (_kernel, h) = kernel_and_box();
        let mut cache: IdentityCache<u32> = IdentityCache::new();
        cache.get_or_try_insert_with(&h, "a", || Ok::<_, ()>(1)).unwrap();
        cache.get_or_try_insert_with(&h, "b", || Ok::<_, ()>(2)).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.prune(), 0);
        h.release().unwrap();
        assert_eq!(cache.prune(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evict_and_clear() {
        let (_kernel, h) = kernel_and_box();
        let mut cache: IdentityCache<u32> = IdentityCache::new();
        cache.get_or_try_insert_with(&h, "a", || Ok::<_, ()>(1)).unwrap();
        assert!(cache.evict(&h));
        assert!(!cache.evict(&h));
        cache.get_or_try_insert_with(&h, "a", || Ok::<_, ()>(1)).unwrap();
        cache.clear();
        assert!(cache.get(&h, "a").is_none());
    }

    #[test]
    fn test_nested_default_cache_access_is_busy() {
        let nested = with_default_cache(|_outer| with_default_cache(|_inner| ())).unwrap();
        assert!(matches!(nested, Err(TessellationError::CacheBusy)));
    }
}

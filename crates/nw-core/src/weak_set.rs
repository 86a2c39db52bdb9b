use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::id::InstanceId;

trait ErasedWeak: Send + Sync {
    fn is_live(&self) -> bool;
    fn as_any(&self) -> &dyn Any;
}

impl<K: ?Sized + Send + Sync + 'static> ErasedWeak for Weak<K> {
    fn is_live(&self) -> bool {
        self.strong_count() > 0
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A type-erased, non-owning handle to an instance viewed as some type `K`.
///
/// The same instance is held once per ancestor type, each handle carrying a
/// `Weak<K>` for its own view (the concrete type, a trait object, or the
/// root `dyn Trackable`). Cloning a handle is cheap.
#[derive(Clone)]
pub struct WeakHandle {
    inner: Arc<dyn ErasedWeak>,
}

impl WeakHandle {
    /// Wrap a weak reference.
    pub fn new<K: ?Sized + Send + Sync + 'static>(weak: Weak<K>) -> Self {
        Self {
            inner: Arc::new(weak),
        }
    }

    /// Build a handle from a strong reference without keeping it alive.
    pub fn from_arc<K: ?Sized + Send + Sync + 'static>(strong: &Arc<K>) -> Self {
        Self::new(Arc::downgrade(strong))
    }

    /// Whether the target is still alive.
    pub fn is_live(&self) -> bool {
        self.inner.is_live()
    }

    /// Resolve the handle as `K`. Returns `None` if the target is gone or the
    /// handle holds a different view.
    pub fn upgrade<K: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<K>> {
        self.inner
            .as_any()
            .downcast_ref::<Weak<K>>()
            .and_then(Weak::upgrade)
    }
}

impl fmt::Debug for WeakHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakHandle")
            .field("live", &self.is_live())
            .finish()
    }
}

/// Weak handles to every tracked instance of one type.
///
/// Handles are keyed by [`InstanceId`], so an instance is never held twice and
/// snapshots come out in creation order. The set never keeps an instance
/// alive. Handles whose target is gone are removed by the owning tracker when
/// the instance drops, skipped by [`snapshot`](Self::snapshot), and dropped by
/// [`prune`](Self::prune).
#[derive(Debug, Default)]
pub struct WeakInstanceSet {
    handles: BTreeMap<InstanceId, WeakHandle>,
}

impl WeakInstanceSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handle. Re-adding an ID replaces its handle.
    pub fn add(&mut self, id: InstanceId, handle: WeakHandle) {
        self.handles.insert(id, handle);
    }

    /// Insert a weak reference to `instance`.
    pub fn add_instance<K: ?Sized + Send + Sync + 'static>(
        &mut self,
        id: InstanceId,
        instance: &Arc<K>,
    ) {
        self.add(id, WeakHandle::from_arc(instance));
    }

    /// Remove the handle for `id`. Absent IDs are ignored.
    ///
    /// Returns whether a handle was removed.
    pub fn remove(&mut self, id: InstanceId) -> bool {
        self.handles.remove(&id).is_some()
    }

    /// Whether a handle for `id` is present (live or not).
    pub fn contains(&self, id: InstanceId) -> bool {
        self.handles.contains_key(&id)
    }

    /// The live instances viewed as `K`, in creation order.
    pub fn snapshot<K: ?Sized + Send + Sync + 'static>(&self) -> Vec<Arc<K>> {
        self.handles
            .values()
            .filter_map(WeakHandle::upgrade::<K>)
            .collect()
    }

    /// Drop handles whose target is gone. Returns how many were dropped.
    pub fn prune(&mut self) -> usize {
        let before = self.handles.len();
        self.handles.retain(|_, handle| handle.is_live());
        before - self.handles.len()
    }

    /// Number of handles, including any not yet pruned.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Number of handles whose target is alive.
    pub fn live_len(&self) -> usize {
        self.handles.values().filter(|h| h.is_live()).count()
    }

    /// Whether the set holds no handles.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// IDs of all held handles, in creation order.
    pub fn ids(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.handles.keys().copied()
    }
}

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, Weak};

use parking_lot::Mutex;

use crate::catalog::is_trackable;
use crate::error::{TrackError, TrackResult};
use crate::id::InstanceId;
use crate::key::TypeKey;
use crate::trackable::{Binding, Class, Trackable, Tracker};
use crate::weak_set::WeakInstanceSet;

static GLOBAL: LazyLock<InstanceRegistry> = LazyLock::new(InstanceRegistry::new);

/// Maps every tracked type to the weak set of its live instances.
///
/// An instance is filed under each type of its lineage, so a query by an
/// ancestor returns instances of every descendant. The registry never owns
/// an instance. Cloning yields another handle to the same registry.
///
/// Instances are never dropped while the internal lock is held, so a
/// tracker's drop hook can always take it.
#[derive(Clone, Default)]
pub struct InstanceRegistry {
    sets: Arc<Mutex<HashMap<TypeKey, WeakInstanceSet>>>,
}

impl InstanceRegistry {
    /// Create an empty, isolated registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static InstanceRegistry {
        &GLOBAL
    }

    // -----------------------------------------------------------------------
    // Construction hook
    // -----------------------------------------------------------------------

    /// Build a trackable instance and register it under its lineage.
    ///
    /// The tracker is allocated, bound to the instance's future address and
    /// registered (unless the class opts out) before `build` runs, and must be
    /// stored in the returned value. While `build` runs the instance is
    /// already filed but not yet resolvable, so queries skip it.
    pub fn create<T: Class>(&self, build: impl FnOnce(Tracker) -> T) -> Arc<T> {
        let mut id = None;
        let object = Arc::new_cyclic(|weak: &Weak<T>| {
            let tracker = self.prepare(weak);
            id = Some(tracker.id());
            build(tracker)
        });
        debug_assert_eq!(
            Some(object.tracker().id()),
            id,
            "constructor must store the tracker it was given"
        );
        self.created(&object);
        object
    }

    /// Fallible form of [`create`](Self::create). The instance is registered
    /// once `build` succeeds; nothing is registered when it fails.
    pub fn try_create<T: Class, E>(
        &self,
        build: impl FnOnce(Tracker) -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        let tracker = Tracker::new::<T>(self.clone());
        let id = tracker.id();
        let object = Arc::new(build(tracker)?);
        debug_assert_eq!(
            object.tracker().id(),
            id,
            "constructor must store the tracker it was given"
        );
        object.tracker().bind(T::lineage().bind(&Arc::downgrade(&object)));
        if T::TRACK_INSTANCES {
            object.tracker().start();
        }
        self.created(&object);
        Ok(object)
    }

    fn prepare<T: Class>(&self, weak: &Weak<T>) -> Tracker {
        let tracker = Tracker::new::<T>(self.clone());
        tracker.bind(T::lineage().bind(weak));
        if T::TRACK_INSTANCES {
            tracker.start();
        }
        tracker
    }

    fn created<T: Class>(&self, object: &Arc<T>) {
        tracing::debug!(
            id = %object.instance_id(),
            class = object.tracker().class_name(),
            tracked = T::TRACK_INSTANCES,
            "instance created"
        );
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// File `object` under every type of its lineage.
    ///
    /// For the object's home registry this is
    /// [`start_tracking`](Trackable::start_tracking). Any other registry is
    /// remembered by the object's tracker, which withdraws from it when the
    /// object stops tracking or drops.
    pub fn add(&self, object: &dyn Trackable) {
        object.tracker().file_in(self);
    }

    /// Remove `object` from every type of its lineage. Entries that do not
    /// hold it are left alone.
    pub fn remove(&self, object: &dyn Trackable) {
        object.tracker().withdraw_from(self);
    }

    /// Whether `self` and `other` are handles to the same registry.
    pub fn is_same(&self, other: &InstanceRegistry) -> bool {
        Arc::ptr_eq(&self.sets, &other.sets)
    }

    pub(crate) fn insert_bindings(&self, id: InstanceId, bindings: &[Binding]) {
        let mut sets = self.sets.lock();
        for (key, handle) in bindings {
            sets.entry(*key).or_default().add(id, handle.clone());
            tracing::trace!(%id, key = key.name(), "handle added");
        }
    }

    pub(crate) fn remove_bindings(&self, id: InstanceId, bindings: &[Binding]) {
        let mut sets = self.sets.lock();
        for (key, _) in bindings {
            if sets.get_mut(key).is_some_and(|set| set.remove(id)) {
                tracing::trace!(%id, key = key.name(), "handle removed");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Live instances filed under `K`.
    ///
    /// Returns an empty list when `K` is trackable but has no instances yet,
    /// and [`TrackError::NotTrackable`] when `K` was never declared trackable.
    pub fn get<K: ?Sized + Send + Sync + 'static>(&self) -> TrackResult<Vec<Arc<K>>> {
        let key = TypeKey::of::<K>();
        if !is_trackable(&key) {
            return Err(TrackError::NotTrackable(key.name()));
        }
        let sets = self.sets.lock();
        Ok(sets
            .get(&key)
            .map(WeakInstanceSet::snapshot::<K>)
            .unwrap_or_default())
    }

    /// Whether the instance `id` is filed under `K`.
    pub fn contains<K: ?Sized + 'static>(&self, id: InstanceId) -> bool {
        self.sets
            .lock()
            .get(&TypeKey::of::<K>())
            .is_some_and(|set| set.contains(id))
    }

    /// Raw number of handles filed under `K`, including any not yet pruned.
    pub fn handle_count<K: ?Sized + 'static>(&self) -> usize {
        self.sets
            .lock()
            .get(&TypeKey::of::<K>())
            .map_or(0, WeakInstanceSet::len)
    }

    /// Types that have an entry, in no particular order.
    pub fn tracked_types(&self) -> Vec<TypeKey> {
        self.sets.lock().keys().copied().collect()
    }

    /// Compaction pass: drop every handle whose target is gone, then every
    /// empty entry. Returns the number of handles dropped.
    pub fn prune(&self) -> usize {
        let mut sets = self.sets.lock();
        let dropped: usize = sets.values_mut().map(WeakInstanceSet::prune).sum();
        sets.retain(|_, set| !set.is_empty());
        if dropped > 0 {
            tracing::debug!(dropped, "pruned dead handles");
        }
        dropped
    }
}

impl fmt::Debug for InstanceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sets = self.sets.lock();
        let mut map = f.debug_map();
        for (key, set) in sets.iter() {
            map.entry(&key.name(), &set.len());
        }
        map.finish()
    }
}

/// Live instances of `K` in the process-wide registry.
///
/// Fails with [`TrackError::NotTrackable`] when `K` never carried the
/// trackable capability.
pub fn get_instances<K: ?Sized + Send + Sync + 'static>() -> TrackResult<Vec<Arc<K>>> {
    InstanceRegistry::global().get::<K>()
}

use std::any::type_name;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{OnceLock, Weak};

use parking_lot::Mutex;

use crate::id::InstanceId;
use crate::key::TypeKey;
use crate::registry::InstanceRegistry;
use crate::weak_set::WeakHandle;

/// One registry entry of an instance: the type it is filed under and the
/// handle filed there.
pub(crate) type Binding = (TypeKey, WeakHandle);

/// The trackable capability.
///
/// Implementors embed a [`Tracker`] and hand it out here; everything else is
/// provided. The trait is object safe, and `dyn Trackable` is the root of
/// every lineage: querying it returns every tracked instance.
pub trait Trackable: Send + Sync + 'static {
    /// The tracker embedded in this instance.
    fn tracker(&self) -> &Tracker;

    /// This instance's ID.
    fn instance_id(&self) -> InstanceId {
        self.tracker().id()
    }

    /// Remove this instance from every registry it is filed in.
    /// Calling it on an untracked instance does nothing.
    fn stop_tracking(&self) {
        self.tracker().stop();
    }

    /// Re-register this instance under every type of its lineage in its home
    /// registry. Calling it on a tracked instance does nothing.
    fn start_tracking(&self) {
        self.tracker().start();
    }

    /// Whether the instance is currently registered.
    fn is_tracked(&self) -> bool {
        self.tracker().is_tracked()
    }
}

/// Static, per-type side of the trackable capability.
///
/// Usually implemented through [`trackable!`](crate::trackable).
pub trait Class: Trackable + Sized {
    /// When `false`, instances are not registered at construction. They can
    /// still opt in individually with [`Trackable::start_tracking`].
    const TRACK_INSTANCES: bool = true;

    /// The ancestor chain of this type.
    fn lineage() -> Lineage<Self>;
}

struct Link<T> {
    key: TypeKey,
    bind: Box<dyn Fn(&Weak<T>) -> WeakHandle>,
}

/// Ancestor chain of a trackable type, most derived first.
///
/// The type itself always comes first and the root `dyn Trackable` always
/// comes last; [`extends`](Self::extends) adds the trait-object ancestors in
/// between. Each link knows how to view a `Weak<T>` as its ancestor.
pub struct Lineage<T> {
    links: Vec<Link<T>>,
}

impl<T: Trackable> Default for Lineage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Trackable> Lineage<T> {
    /// A lineage with only `T` and the root.
    pub fn new() -> Self {
        Self { links: Vec::new() }
    }

    /// Add the ancestor `K`, viewed through `upcast`.
    pub fn extends<K: ?Sized + Send + Sync + 'static>(
        mut self,
        upcast: fn(&Weak<T>) -> Weak<K>,
    ) -> Self {
        self.links.push(Link {
            key: TypeKey::of::<K>(),
            bind: Box::new(move |object| WeakHandle::new(upcast(object))),
        });
        self
    }

    /// Keys of the full chain, without duplicates.
    pub fn keys(&self) -> Vec<TypeKey> {
        let mut keys = vec![TypeKey::of::<T>()];
        let rest = self
            .links
            .iter()
            .map(|link| link.key)
            .chain(std::iter::once(TypeKey::of::<dyn Trackable>()));
        for key in rest {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    pub(crate) fn bind(&self, object: &Weak<T>) -> Vec<Binding> {
        let mut bindings: Vec<Binding> = Vec::with_capacity(self.links.len() + 2);
        bindings.push((TypeKey::of::<T>(), WeakHandle::new(Weak::clone(object))));
        for link in &self.links {
            if bindings.iter().all(|(key, _)| *key != link.key) {
                bindings.push((link.key, (link.bind)(object)));
            }
        }
        let root_key = TypeKey::of::<dyn Trackable>();
        if bindings.iter().all(|(key, _)| *key != root_key) {
            let concrete: Weak<T> = Weak::clone(object);
            let root: Weak<dyn Trackable> = concrete;
            bindings.push((root_key, WeakHandle::new(root)));
        }
        bindings
    }
}

/// The lineage keys of `T`, most derived first.
pub fn ancestor_chain<T: Class>() -> Vec<TypeKey> {
    T::lineage().keys()
}

/// Per-instance tracking state.
///
/// A tracker is handed to the constructor closure of
/// [`InstanceRegistry::create`] and must be stored in the instance it builds.
/// It remembers every registry the instance is filed in: its home registry
/// and any other registry it was explicitly [`add`](InstanceRegistry::add)ed
/// to. Dropping it (with the instance) removes the instance from all of them.
pub struct Tracker {
    id: InstanceId,
    class: &'static str,
    registry: InstanceRegistry,
    bindings: OnceLock<Vec<Binding>>,
    tracked: AtomicBool,
    foreign: Mutex<Vec<InstanceRegistry>>,
}

impl Tracker {
    pub(crate) fn new<T: ?Sized + 'static>(registry: InstanceRegistry) -> Self {
        Self {
            id: InstanceId::next(),
            class: type_name::<T>(),
            registry,
            bindings: OnceLock::new(),
            tracked: AtomicBool::new(false),
            foreign: Mutex::new(Vec::new()),
        }
    }

    /// ID of the owning instance.
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Type name of the owning instance.
    pub fn class_name(&self) -> &'static str {
        self.class
    }

    /// The registry this instance was created in.
    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    /// Whether the instance is filed in any registry.
    pub fn is_tracked(&self) -> bool {
        self.tracked.load(Ordering::Acquire) || !self.foreign.lock().is_empty()
    }

    /// Lineage keys the instance is filed under when tracked.
    pub fn keys(&self) -> Vec<TypeKey> {
        self.bindings().iter().map(|(key, _)| *key).collect()
    }

    pub(crate) fn bindings(&self) -> &[Binding] {
        self.bindings.get().map(Vec::as_slice).unwrap_or_default()
    }

    pub(crate) fn bind(&self, bindings: Vec<Binding>) {
        if self.bindings.set(bindings).is_err() {
            tracing::warn!(id = %self.id, class = self.class, "tracker bound twice");
        }
    }

    /// Register the instance under its lineage in its home registry.
    pub fn start(&self) {
        if self.bindings().is_empty() {
            return;
        }
        self.registry.insert_bindings(self.id, self.bindings());
        self.tracked.store(true, Ordering::Release);
    }

    /// Remove the instance from every registry it is filed in.
    pub fn stop(&self) {
        self.registry.remove_bindings(self.id, self.bindings());
        self.tracked.store(false, Ordering::Release);
        self.withdraw_foreign();
    }

    pub(crate) fn file_in(&self, registry: &InstanceRegistry) {
        if registry.is_same(&self.registry) {
            self.start();
            return;
        }
        if self.bindings().is_empty() {
            return;
        }
        registry.insert_bindings(self.id, self.bindings());
        let mut foreign = self.foreign.lock();
        if !foreign.iter().any(|r| r.is_same(registry)) {
            foreign.push(registry.clone());
        }
    }

    pub(crate) fn withdraw_from(&self, registry: &InstanceRegistry) {
        if registry.is_same(&self.registry) {
            self.registry.remove_bindings(self.id, self.bindings());
            self.tracked.store(false, Ordering::Release);
            return;
        }
        registry.remove_bindings(self.id, self.bindings());
        self.foreign.lock().retain(|r| !r.is_same(registry));
    }

    fn withdraw_foreign(&self) {
        // Registry locks are taken only after the tracker lock is released.
        let foreign = std::mem::take(&mut *self.foreign.lock());
        for registry in &foreign {
            registry.remove_bindings(self.id, self.bindings());
        }
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        if !self.bindings().is_empty() {
            self.registry.remove_bindings(self.id, self.bindings());
            self.withdraw_foreign();
            tracing::debug!(id = %self.id, class = self.class, "instance dropped");
        }
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("id", &self.id)
            .field("class", &self.class)
            .field("tracked", &self.is_tracked())
            .field("foreign", &self.foreign.lock().len())
            .finish()
    }
}

/// Implement [`Class`] for a type and declare it, and every ancestor named,
/// as trackable.
///
/// Ancestors are trait objects the type implements, most derived first. The
/// root `dyn Trackable` is implied. Prefix the type with `untracked` to opt
/// the whole class out of registration at construction.
///
/// ```ignore
/// trackable!(NeuronGroup: dyn Group);
/// trackable!(untracked Scratch);
/// ```
#[macro_export]
macro_rules! trackable {
    (@class $ty:ty, $track:expr $(, $ancestor:ty)*) => {
        impl $crate::Class for $ty {
            const TRACK_INSTANCES: bool = $track;

            fn lineage() -> $crate::Lineage<Self> {
                $crate::Lineage::new()
                    $(.extends::<$ancestor>(
                        |this: &::std::sync::Weak<$ty>| -> ::std::sync::Weak<$ancestor> {
                            let weak: ::std::sync::Weak<$ty> = ::std::sync::Weak::clone(this);
                            weak
                        },
                    ))*
            }
        }

        $crate::declare_trackable!($ty $(, $ancestor)*);
    };
    (untracked $ty:ty $(: $($ancestor:ty),+ $(,)?)?) => {
        $crate::trackable!(@class $ty, false $($(, $ancestor)+)?);
    };
    ($ty:ty $(: $($ancestor:ty),+ $(,)?)?) => {
        $crate::trackable!(@class $ty, true $($(, $ancestor)+)?);
    };
}

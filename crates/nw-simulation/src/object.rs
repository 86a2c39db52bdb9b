use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nw_core::{InstanceId, InstanceRegistry, Trackable, Tracker};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::clock::{Clock, ClockId};
use crate::config::ScheduleConfig;
use crate::error::{SimError, SimResult};

/// The lifecycle contract every scheduled object fulfils.
///
/// Implementors embed a [`ScheduledObject`] and return it from
/// [`base`](Self::base); the [`scheduled!`](crate::scheduled) macro derives
/// the tracking side from it. Only `update` has to be written by hand.
///
/// An implementor that holds scheduled objects (or anything that may point
/// back at it) in its own fields must override [`erase`](Self::erase) to
/// release them, then erase its base. Otherwise `clear(true)` cannot break
/// reference cycles that run through those fields.
pub trait Scheduled: Trackable {
    /// The embedded scheduling state.
    fn base(&self) -> &ScheduledObject;

    /// Called once before a run starts. May be called again before later runs.
    fn prepare(&self) -> SimResult<()> {
        Ok(())
    }

    /// Called every timestep the object is active.
    fn update(&self) -> SimResult<()> {
        Err(SimError::NotImplemented {
            class: short_name(self.tracker().class_name()),
        })
    }

    /// Called when the scheduler restarts from time zero.
    fn reinit(&self) -> SimResult<()> {
        Ok(())
    }

    /// Null out the object's state, dropping its nested objects.
    ///
    /// The default erases the base only.
    fn erase(&self) {
        self.base().erase();
    }

    /// Whether the scheduler should run this object.
    fn active(&self) -> bool {
        self.base().active()
    }

    /// Set the activation flag here and on every nested object.
    fn set_active(&self, active: bool) {
        self.propagate_active(active, &mut HashSet::new());
    }

    /// One step of the activation cascade. Every nested object is reached
    /// through this method, so overriding it sees each change made by a
    /// parent. Overrides should finish with
    /// [`ScheduledObject::cascade_active`] on their base.
    fn propagate_active(&self, active: bool, visited: &mut HashSet<InstanceId>) {
        self.base().cascade_active(active, visited);
    }

    /// The nested objects.
    fn contained_objects(&self) -> &ContainedObjects {
        self.base().contained_objects()
    }

    /// Phase label, `None` once erased.
    fn when(&self) -> Option<String> {
        self.base().when()
    }

    /// Tie-break order, `None` once erased.
    fn order(&self) -> Option<f64> {
        self.base().order()
    }

    /// Time base, `None` once erased.
    fn clock(&self) -> Option<Arc<Clock>> {
        self.base().clock()
    }

    /// Serializable view of the current state.
    fn summary(&self) -> ObjectSummary {
        self.base().summary()
    }
}

#[derive(Debug, Clone)]
struct Schedule {
    when: String,
    order: f64,
    clock: Arc<Clock>,
}

/// Scheduling state shared by every simulated object.
///
/// On its own it is a bare scheduled object with no `update`; concrete types
/// embed it and implement [`Scheduled`]. The schedule (`when`, `order`,
/// `clock`) is fixed at construction and reads as `None` once the object has
/// been erased.
pub struct ScheduledObject {
    tracker: Tracker,
    schedule: RwLock<Option<Schedule>>,
    active: AtomicBool,
    contained: ContainedObjects,
}

impl ScheduledObject {
    /// Build the scheduling state around `tracker`. An unset clock resolves to
    /// the default clock.
    pub fn new(tracker: Tracker, config: ScheduleConfig) -> Self {
        let clock = config.resolve_clock();
        Self {
            tracker,
            schedule: RwLock::new(Some(Schedule {
                when: config.when,
                order: config.order,
                clock,
            })),
            active: AtomicBool::new(true),
            contained: ContainedObjects::default(),
        }
    }

    /// Build from a dynamic parameter table; see [`ScheduleConfig::from_json`].
    pub fn from_json(tracker: Tracker, params: &Value) -> SimResult<Self> {
        Ok(Self::new(tracker, ScheduleConfig::from_json(params)?))
    }

    /// A bare scheduled object in the process-wide registry.
    pub fn create(config: ScheduleConfig) -> Arc<Self> {
        Self::create_in(InstanceRegistry::global(), config)
    }

    /// A bare scheduled object in `registry`.
    pub fn create_in(registry: &InstanceRegistry, config: ScheduleConfig) -> Arc<Self> {
        registry.create(|tracker| Self::new(tracker, config))
    }

    /// Phase label, `None` once erased.
    pub fn when(&self) -> Option<String> {
        self.schedule.read().as_ref().map(|s| s.when.clone())
    }

    /// Tie-break order, `None` once erased.
    pub fn order(&self) -> Option<f64> {
        self.schedule.read().as_ref().map(|s| s.order)
    }

    /// Time base, `None` once erased.
    pub fn clock(&self) -> Option<Arc<Clock>> {
        self.schedule.read().as_ref().map(|s| Arc::clone(&s.clock))
    }

    /// Whether the scheduler should run this object.
    pub fn active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Set the activation flag here and, depth first, on every nested object.
    ///
    /// Each object is visited at most once, so containment cycles terminate.
    /// Parents are never touched.
    pub fn set_active(&self, active: bool) {
        self.cascade_active(active, &mut HashSet::new());
    }

    /// Set this object's flag unless it was already visited, then hand the
    /// change to each nested object's [`Scheduled::propagate_active`].
    pub fn cascade_active(&self, active: bool, visited: &mut HashSet<InstanceId>) {
        if !visited.insert(self.tracker.id()) {
            return;
        }
        self.active.store(active, Ordering::Release);
        for child in self.contained.snapshot() {
            child.propagate_active(active, visited);
        }
    }

    /// The nested objects.
    pub fn contained_objects(&self) -> &ContainedObjects {
        &self.contained
    }

    /// Null the schedule, deactivate, and drop every nested object.
    pub fn erase(&self) {
        *self.schedule.write() = None;
        self.active.store(false, Ordering::Release);
        let children = self.contained.take();
        tracing::trace!(id = %self.tracker.id(), nested = children.len(), "object erased");
        drop(children);
    }

    /// Serializable view of the current state.
    pub fn summary(&self) -> ObjectSummary {
        let schedule = self.schedule.read().clone();
        ObjectSummary {
            id: self.tracker.id().get(),
            class: short_name(self.tracker.class_name()),
            when: schedule.as_ref().map(|s| s.when.clone()),
            order: schedule.as_ref().map(|s| s.order),
            clock: schedule.as_ref().map(|s| s.clock.id()),
            active: self.active(),
            contained: self.contained.ids().into_iter().map(InstanceId::get).collect(),
        }
    }
}

impl Trackable for ScheduledObject {
    fn tracker(&self) -> &Tracker {
        &self.tracker
    }
}

impl Scheduled for ScheduledObject {
    fn base(&self) -> &ScheduledObject {
        self
    }
}

nw_core::trackable!(ScheduledObject: dyn Scheduled);

impl fmt::Debug for ScheduledObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledObject")
            .field("id", &self.tracker.id())
            .field("when", &self.when())
            .field("order", &self.order())
            .field("active", &self.active())
            .field("contained", &self.contained)
            .finish()
    }
}

/// The nested objects of a scheduled object.
///
/// The container lives as long as its owner and is only ever mutated in
/// place. Removed objects are handed back to the caller, so they are never
/// dropped while the container is locked.
#[derive(Default)]
pub struct ContainedObjects {
    items: Mutex<Vec<Arc<dyn Scheduled>>>,
}

impl ContainedObjects {
    /// Append a nested object.
    pub fn push(&self, object: Arc<dyn Scheduled>) {
        self.items.lock().push(object);
    }

    /// Append several nested objects, in order.
    pub fn extend(&self, objects: impl IntoIterator<Item = Arc<dyn Scheduled>>) {
        self.items.lock().extend(objects);
    }

    /// Remove the object with `id`, if present.
    pub fn remove(&self, id: InstanceId) -> Option<Arc<dyn Scheduled>> {
        let mut items = self.items.lock();
        let index = items.iter().position(|o| o.instance_id() == id)?;
        Some(items.remove(index))
    }

    /// Whether the object with `id` is nested here.
    pub fn contains(&self, id: InstanceId) -> bool {
        self.items.lock().iter().any(|o| o.instance_id() == id)
    }

    /// The nested objects, in insertion order.
    pub fn snapshot(&self) -> Vec<Arc<dyn Scheduled>> {
        self.items.lock().clone()
    }

    /// IDs of the nested objects, in insertion order.
    pub fn ids(&self) -> Vec<InstanceId> {
        self.items.lock().iter().map(|o| o.instance_id()).collect()
    }

    /// Number of nested objects.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether nothing is nested.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Drop every nested object.
    pub fn clear(&self) {
        drop(self.take());
    }

    pub(crate) fn take(&self) -> Vec<Arc<dyn Scheduled>> {
        std::mem::take(&mut *self.items.lock())
    }
}

impl fmt::Debug for ContainedObjects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

/// Serializable view of a scheduled object, for logs and tooling.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ObjectSummary {
    /// Raw instance ID.
    pub id: u64,
    /// Short type name.
    pub class: &'static str,
    /// Phase label, `None` once erased.
    pub when: Option<String>,
    /// Tie-break order, `None` once erased.
    pub order: Option<f64>,
    /// Clock identity, `None` once erased.
    pub clock: Option<ClockId>,
    /// Activation flag.
    pub active: bool,
    /// Raw IDs of the nested objects.
    pub contained: Vec<u64>,
}

fn short_name(type_name: &'static str) -> &'static str {
    let path = type_name.split('<').next().unwrap_or(type_name);
    path.rsplit("::").next().unwrap_or(path)
}

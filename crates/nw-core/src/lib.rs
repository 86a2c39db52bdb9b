//! Core tracking primitives for Neurowerk: type keys, weak instance sets, and
//! the lineage-aware instance registry.
//!
//! Every trackable object embeds a [`Tracker`] and is built through
//! [`InstanceRegistry::create`] (or [`InstanceRegistry::try_create`]). Once
//! built, it can be found by querying the registry with its own type or any
//! ancestor declared in its [`Lineage`], and it disappears from every query as
//! soon as its last strong reference is dropped.
//!
//! ```
//! use nw_core::{InstanceRegistry, Trackable, Tracker, trackable};
//!
//! trait Probe: Trackable {}
//! nw_core::declare_trackable!(dyn Probe);
//!
//! struct Voltmeter {
//!     tracker: Tracker,
//! }
//!
//! impl Trackable for Voltmeter {
//!     fn tracker(&self) -> &Tracker {
//!         &self.tracker
//!     }
//! }
//! impl Probe for Voltmeter {}
//! trackable!(Voltmeter: dyn Probe);
//!
//! fn main() {
//!     let registry = InstanceRegistry::new();
//!     let meter = registry.create(|tracker| Voltmeter { tracker });
//!     assert_eq!(registry.get::<dyn Probe>().unwrap().len(), 1);
//!
//!     drop(meter);
//!     assert!(registry.get::<dyn Probe>().unwrap().is_empty());
//! }
//! ```

/// Static catalog of types that carry the trackable capability.
pub mod catalog;
/// Error types for the tracking layer.
pub mod error;
/// Instance identifiers.
pub mod id;
/// Type identity used to key the registry.
pub mod key;
/// The lineage-aware instance registry.
pub mod registry;
/// The trackable capability: per-instance tracker, class lineage, macros.
pub mod trackable;
/// Weak handles and the per-type weak instance set.
pub mod weak_set;

#[doc(hidden)]
pub extern crate inventory;

/// Re-export of [`catalog::TrackableClass`] and [`catalog::is_trackable`].
pub use catalog::{TrackableClass, is_trackable};
/// Re-exports of [`error::TrackError`] and [`error::TrackResult`].
pub use error::{TrackError, TrackResult};
/// Re-export of [`id::InstanceId`].
pub use id::InstanceId;
/// Re-export of [`key::TypeKey`].
pub use key::TypeKey;
/// Re-exports of [`registry::InstanceRegistry`] and [`registry::get_instances`].
pub use registry::{InstanceRegistry, get_instances};
/// Re-exports of the trackable capability types.
pub use trackable::{Class, Lineage, Trackable, Tracker, ancestor_chain};
/// Re-exports of [`weak_set::WeakHandle`] and [`weak_set::WeakInstanceSet`].
pub use weak_set::{WeakHandle, WeakInstanceSet};

//! Scheduled simulation objects for Neurowerk.
//!
//! Builds on [`nw_core`]: every [`ScheduledObject`] registers itself in an
//! [`InstanceRegistry`](nw_core::InstanceRegistry) at construction, so an
//! external scheduler can find all of them (or all of one kind) with a
//! single query, read their schedule (`when`, `order`, `clock`) and drive
//! their lifecycle (`prepare`, `update`, `reinit`). [`clear`] resets the
//! process between runs.

/// Time base: fixed timestep clock and the default clock.
pub mod clock;
/// Scheduling parameters and their dynamic (JSON) form.
pub mod config;
/// Error types for the simulation crate.
pub mod error;
/// The scheduled object base, its lifecycle trait, and nested objects.
pub mod object;
/// Global reset of scheduled objects.
pub mod reset;

#[doc(hidden)]
pub use nw_core;

/// Re-exports of [`clock::Clock`], [`clock::ClockId`], and the default clock.
pub use clock::{Clock, ClockId, DEFAULT_DT, default_clock};
/// Re-export of [`config::ScheduleConfig`].
pub use config::ScheduleConfig;
/// Re-exports of [`error::SimError`] and [`error::SimResult`].
pub use error::{SimError, SimResult};
/// Re-exports of the scheduled object types.
pub use object::{ContainedObjects, ObjectSummary, Scheduled, ScheduledObject};
/// Re-exports of [`reset::clear`] and [`reset::clear_in`].
pub use reset::{clear, clear_in};

/// Make a type that implements [`Scheduled`] trackable.
///
/// Implements [`Trackable`](nw_core::Trackable) through the embedded
/// [`ScheduledObject`] and declares the lineage, with `dyn Scheduled`
/// appended after any ancestors named. Accepts the same forms as
/// [`nw_core::trackable!`], including the `untracked` prefix.
///
/// ```ignore
/// scheduled!(NeuronGroup: dyn Group);
/// scheduled!(untracked Scratch);
/// ```
#[macro_export]
macro_rules! scheduled {
    (@trackable $ty:ty) => {
        impl $crate::nw_core::Trackable for $ty {
            fn tracker(&self) -> &$crate::nw_core::Tracker {
                $crate::nw_core::Trackable::tracker($crate::Scheduled::base(self))
            }
        }
    };
    (untracked $ty:ty $(: $($ancestor:ty),+ $(,)?)?) => {
        $crate::scheduled!(@trackable $ty);
        $crate::nw_core::trackable!(untracked $ty: $($($ancestor,)+)? dyn $crate::Scheduled);
    };
    ($ty:ty $(: $($ancestor:ty),+ $(,)?)?) => {
        $crate::scheduled!(@trackable $ty);
        $crate::nw_core::trackable!($ty: $($($ancestor,)+)? dyn $crate::Scheduled);
    };
}

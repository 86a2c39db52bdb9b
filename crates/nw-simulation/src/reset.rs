use nw_core::InstanceRegistry;

use crate::error::SimResult;
use crate::object::Scheduled;

/// Deactivate and untrack every scheduled object in the process-wide
/// registry. See [`clear_in`].
pub fn clear(erase: bool) -> SimResult<usize> {
    clear_in(InstanceRegistry::global(), erase)
}

/// Deactivate and untrack every scheduled object in `registry`, then compact
/// the registry. Returns the number of objects cleared.
///
/// With `erase`, every cleared object is also erased once all of them are
/// inactive and untracked. Erasing drops nested objects, which breaks
/// containment cycles that would otherwise keep objects alive.
///
/// A second call finds nothing left to clear and returns 0.
pub fn clear_in(registry: &InstanceRegistry, erase: bool) -> SimResult<usize> {
    let objects = registry.get::<dyn Scheduled>()?;
    let cleared = objects.len();

    for object in &objects {
        object.set_active(false);
        object.stop_tracking();
    }
    if erase {
        for object in &objects {
            object.erase();
        }
    }
    drop(objects);

    let pruned = registry.prune();
    tracing::info!(cleared, erase, pruned, "cleared scheduled objects");
    Ok(cleared)
}

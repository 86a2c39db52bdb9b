use std::collections::HashSet;
use std::sync::LazyLock;

use crate::key::TypeKey;
use crate::trackable::Trackable;

/// Static registration of a type carrying the trackable capability.
///
/// Submitted at link time by [`trackable!`](crate::trackable) and
/// [`declare_trackable!`](crate::declare_trackable); not meant to be built by
/// hand.
pub struct TrackableClass {
    /// Produces the key of the declared type.
    pub key: fn() -> TypeKey,
}
inventory::collect!(TrackableClass);

fn root_key() -> TypeKey {
    TypeKey::of::<dyn Trackable>()
}

inventory::submit! {
    TrackableClass { key: root_key }
}

static CLASSES: LazyLock<HashSet<TypeKey>> = LazyLock::new(|| {
    inventory::iter::<TrackableClass>
        .into_iter()
        .map(|class| (class.key)())
        .collect()
});

/// Whether `key` names a type that was declared trackable.
pub fn is_trackable(key: &TypeKey) -> bool {
    CLASSES.contains(key)
}

/// Number of distinct trackable types known to the process.
pub fn class_count() -> usize {
    CLASSES.len()
}

/// Declare abstract ancestors (trait objects) as trackable.
///
/// Concrete classes declared with [`trackable!`](crate::trackable) already
/// declare every ancestor they name; use this for an ancestor trait that
/// should be queryable before any implementor exists.
#[macro_export]
macro_rules! declare_trackable {
    ($($ty:ty),+ $(,)?) => {
        $(
            const _: () = {
                fn key() -> $crate::TypeKey {
                    $crate::TypeKey::of::<$ty>()
                }
                $crate::inventory::submit! {
                    $crate::TrackableClass { key }
                }
            };
        )+
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Declared: Trackable {}
    crate::declare_trackable!(dyn Declared);

    struct Unrelated;

    #[test]
    fn root_is_always_trackable() {
        assert!(is_trackable(&TypeKey::of::<dyn Trackable>()));
        assert!(class_count() >= 1);
    }

    #[test]
    fn declared_trait_is_trackable() {
        assert!(is_trackable(&TypeKey::of::<dyn Declared>()));
    }

    #[test]
    fn unrelated_type_is_not_trackable() {
        assert!(!is_trackable(&TypeKey::of::<Unrelated>()));
        assert!(!is_trackable(&TypeKey::of::<String>()));
    }
}

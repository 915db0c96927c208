//! Registry publishing factories by base interface and class name.
//!
//! The registration side (run as a plugin library is opened) constructs a
//! [`ClassFactory`], stamps it with the library's resolved path, and publishes
//! it here. Loaders resolve factories through [`acquire`], and the
//! unload-policy side consults [`is_library_in_use`] /
//! [`unregister_library`] before closing a library.
//!
//! [`acquire`]: FactoryRegistry::acquire
//! [`is_library_in_use`]: FactoryRegistry::is_library_in_use
//! [`unregister_library`]: FactoryRegistry::unregister_library

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{FactoryError, Result};
use crate::factory::{ClassFactory, FactoryBase, PluginFactory};
use crate::owner::LoaderId;

/// One published factory, kept under two views of the same allocation:
/// the typed view for downcasting back to `ClassFactory<B>` on lookup, and
/// the erased view for library-wide ownership queries.
struct Entry {
    typed: Arc<dyn Any + Send + Sync>,
    base: Arc<dyn FactoryBase>,
}

/// Factories of one base interface, keyed by class name.
type ClassMap = HashMap<String, Entry>;

/// Thread-safe registry of plugin class factories.
///
/// Factories are published per base interface, so the same class name may be
/// used independently for different interfaces. The registry's own lock is
/// the broader-scope guard that serializes a loader's lookup-then-own step
/// ([`acquire`](FactoryRegistry::acquire)) against the check-then-destroy
/// step ([`unregister_library`](FactoryRegistry::unregister_library)).
pub struct FactoryRegistry {
    factories: RwLock<HashMap<TypeId, ClassMap>>,
}

impl FactoryRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<TypeId, ClassMap>> {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<TypeId, ClassMap>> {
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a factory under its class name for base interface `B`.
    ///
    /// The factory's library path must already be set; the registry reads it
    /// for unload decisions from here on. Returns the shared handle to the
    /// published factory, or an error if the (interface, name) slot is taken.
    pub fn register<B: ?Sized + 'static>(
        &self,
        factory: ClassFactory<B>,
    ) -> Result<Arc<ClassFactory<B>>> {
        let factory = Arc::new(factory);
        let mut factories = self.write();
        let classes = factories.entry(TypeId::of::<B>()).or_default();

        if classes.contains_key(factory.name()) {
            return Err(FactoryError::AlreadyRegistered(factory.name().to_string()));
        }

        tracing::debug!(
            "Registered factory: {} from {}",
            factory.name(),
            factory.library_path(),
        );

        classes.insert(
            factory.name().to_string(),
            Entry {
                typed: factory.clone(),
                base: factory.clone(),
            },
        );
        Ok(factory)
    }

    /// Look up a factory by class name for base interface `B`.
    pub fn lookup<B: ?Sized + 'static>(&self, class_name: &str) -> Option<Arc<ClassFactory<B>>> {
        self.read()
            .get(&TypeId::of::<B>())?
            .get(class_name)?
            .typed
            .clone()
            .downcast::<ClassFactory<B>>()
            .ok()
    }

    /// Look up a factory by class name and register `loader` as an owner.
    ///
    /// Loaders must resolve factories through this method rather than
    /// [`lookup`](FactoryRegistry::lookup) plus a separate
    /// [`add_owning_loader`](FactoryBase::add_owning_loader): the ownership
    /// registration happens while the registry lock is held, so a concurrent
    /// [`unregister_library`](FactoryRegistry::unregister_library) either
    /// runs before the lookup or observes the new owner.
    pub fn acquire<B: ?Sized + 'static>(
        &self,
        class_name: &str,
        loader: LoaderId,
    ) -> Result<Arc<ClassFactory<B>>> {
        let factories = self.read();
        let factory = factories
            .get(&TypeId::of::<B>())
            .and_then(|classes| classes.get(class_name))
            .and_then(|entry| entry.typed.clone().downcast::<ClassFactory<B>>().ok())
            .ok_or_else(|| FactoryError::ClassNotFound(class_name.to_string()))?;
        factory.add_owning_loader(loader);
        drop(factories);
        Ok(factory)
    }

    /// Class names published for base interface `B`, sorted.
    pub fn available_classes<B: ?Sized + 'static>(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .read()
            .get(&TypeId::of::<B>())
            .map(|classes| classes.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// All factories stamped with the given library path, across every base
    /// interface.
    pub fn factories_for_library(&self, library_path: &str) -> Vec<Arc<dyn FactoryBase>> {
        self.read()
            .values()
            .flat_map(|classes| classes.values())
            .filter(|entry| entry.base.library_path() == library_path)
            .map(|entry| entry.base.clone())
            .collect()
    }

    /// Check whether any factory from the given library is currently owned.
    ///
    /// While this returns true the library must not be closed.
    pub fn is_library_in_use(&self, library_path: &str) -> bool {
        self.read()
            .values()
            .flat_map(|classes| classes.values())
            .filter(|entry| entry.base.library_path() == library_path)
            .any(|entry| entry.base.is_owned_by_anybody())
    }

    /// Remove every factory stamped with the given library path, refusing
    /// while any of them is still owned.
    ///
    /// The ownership check and the removal happen under one write lock, so no
    /// loader can slip in between through
    /// [`acquire`](FactoryRegistry::acquire). Returns the number of factories
    /// removed; removing for a library with no factories is a no-op returning
    /// zero.
    pub fn unregister_library(&self, library_path: &str) -> Result<usize> {
        let mut factories = self.write();

        let mut owners: Vec<LoaderId> = factories
            .values()
            .flat_map(|classes| classes.values())
            .filter(|entry| entry.base.library_path() == library_path)
            .flat_map(|entry| entry.base.core().owners())
            .collect();
        if !owners.is_empty() {
            owners.sort();
            owners.dedup();
            return Err(FactoryError::LibraryInUse {
                path: library_path.to_string(),
                owners,
            });
        }

        let mut removed = 0;
        for classes in factories.values_mut() {
            let before = classes.len();
            classes.retain(|_, entry| entry.base.library_path() != library_path);
            removed += before - classes.len();
        }
        factories.retain(|_, classes| !classes.is_empty());

        if removed > 0 {
            tracing::debug!(
                "Unregistered {} factories for library: {}",
                removed,
                library_path,
            );
        }
        Ok(removed)
    }

    /// Total number of published factories across all base interfaces.
    pub fn len(&self) -> usize {
        self.read().values().map(|classes| classes.len()).sum()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_factory;

    trait Shape: Send {
        fn sides(&self) -> u32;
    }

    trait Solid: Send {
        fn faces(&self) -> u32;
    }

    #[derive(Default)]
    struct Square;

    impl Shape for Square {
        fn sides(&self) -> u32 {
            4
        }
    }

    #[derive(Default)]
    struct Triangle;

    impl Shape for Triangle {
        fn sides(&self) -> u32 {
            3
        }
    }

    #[derive(Default)]
    struct Cube;

    impl Solid for Cube {
        fn faces(&self) -> u32 {
            6
        }
    }

    fn shapes_registry() -> FactoryRegistry {
        let registry = FactoryRegistry::new();
        for factory in [
            class_factory!(Square, dyn Shape),
            class_factory!(Triangle, dyn Shape),
        ] {
            factory.set_library_path("libshapes.so");
            registry.register(factory).unwrap();
        }
        registry
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = shapes_registry();

        let factory = registry.lookup::<dyn Shape>("Square").unwrap();
        assert_eq!(factory.name(), "Square");
        assert_eq!(factory.create().sides(), 4);

        assert!(registry.lookup::<dyn Shape>("Pentagon").is_none());
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let registry = shapes_registry();

        let result = registry.register(class_factory!(Square, dyn Shape));
        assert!(matches!(result, Err(FactoryError::AlreadyRegistered(_))));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_interfaces_keep_separate_namespaces() {
        let registry = FactoryRegistry::new();
        registry
            .register(class_factory!("box", Square, dyn Shape))
            .unwrap();
        registry
            .register(class_factory!("box", Cube, dyn Solid))
            .unwrap();

        assert_eq!(registry.lookup::<dyn Shape>("box").unwrap().create().sides(), 4);
        assert_eq!(registry.lookup::<dyn Solid>("box").unwrap().create().faces(), 6);
        assert!(registry.lookup::<dyn Solid>("Square").is_none());
    }

    #[test]
    fn test_available_classes_is_sorted_per_interface() {
        let registry = shapes_registry();
        registry
            .register(class_factory!(Cube, dyn Solid))
            .unwrap();

        assert_eq!(registry.available_classes::<dyn Shape>(), ["Square", "Triangle"]);
        assert_eq!(registry.available_classes::<dyn Solid>(), ["Cube"]);
    }

    #[test]
    fn test_acquire_registers_ownership() {
        let registry = shapes_registry();
        let loader = LoaderId::new();

        let factory = registry.acquire::<dyn Shape>("Triangle", loader).unwrap();
        assert!(factory.is_owned_by(loader));
        assert!(registry.is_library_in_use("libshapes.so"));

        let missing = registry.acquire::<dyn Shape>("Pentagon", loader);
        assert!(matches!(missing, Err(FactoryError::ClassNotFound(_))));
    }

    #[test]
    fn test_unregister_library_refuses_while_owned() {
        let registry = shapes_registry();
        let l1 = LoaderId::new();
        let l2 = LoaderId::new();

        let factory = registry.acquire::<dyn Shape>("Square", l1).unwrap();
        factory.add_owning_loader(l2);

        let err = registry.unregister_library("libshapes.so").unwrap_err();
        match err {
            FactoryError::LibraryInUse { path, owners } => {
                assert_eq!(path, "libshapes.so");
                assert_eq!(owners.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }

        factory.remove_owning_loader(l1);
        assert!(registry.is_library_in_use("libshapes.so"));

        factory.remove_owning_loader(l2);
        assert!(!registry.is_library_in_use("libshapes.so"));
        assert_eq!(registry.unregister_library("libshapes.so").unwrap(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_library_leaves_other_libraries() {
        let registry = shapes_registry();
        let other = class_factory!(Cube, dyn Solid);
        other.set_library_path("libsolids.so");
        registry.register(other).unwrap();

        assert_eq!(registry.factories_for_library("libshapes.so").len(), 2);
        assert_eq!(registry.unregister_library("libshapes.so").unwrap(), 2);

        assert_eq!(registry.len(), 1);
        assert!(registry.lookup::<dyn Solid>("Cube").is_some());
        assert!(registry.factories_for_library("libshapes.so").is_empty());
    }

    #[test]
    fn test_unregister_unknown_library_is_a_noop() {
        let registry = shapes_registry();
        assert_eq!(registry.unregister_library("libnothing.so").unwrap(), 0);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unstamped_factories_group_under_sentinel() {
        let registry = FactoryRegistry::new();
        registry
            .register(class_factory!(Square, dyn Shape))
            .unwrap();

        assert_eq!(
            registry
                .factories_for_library(crate::UNKNOWN_LIBRARY_PATH)
                .len(),
            1
        );
    }
}

//! Loader identities and ownership lifetime helpers.
//!
//! Factories never control a loader's lifetime; they only remember *which*
//! loaders currently depend on them. A [`LoaderId`] is the opaque, comparable
//! token a loader registers under, and an [`OwnershipGuard`] ties the
//! deregistration obligation to the loader's own teardown path.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::factory::FactoryBase;

static NEXT_LOADER_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of a loader that may own factories.
///
/// Ids are unique for the lifetime of the process and are never reused,
/// so a stale id left behind by a destroyed loader can never collide with
/// a live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoaderId(u64);

impl LoaderId {
    /// Allocate a fresh, process-unique loader identity.
    pub fn new() -> Self {
        Self(NEXT_LOADER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for LoaderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loader#{}", self.0)
    }
}

/// RAII registration of a loader with a factory.
///
/// Registers the loader on construction and removes it on drop. Loaders are
/// required to deregister from every factory they own on their own teardown
/// path; holding the registration in a guard makes that automatic.
pub struct OwnershipGuard {
    factory: Arc<dyn FactoryBase>,
    loader: LoaderId,
}

impl OwnershipGuard {
    /// Register `loader` as an owner of `factory` for the guard's lifetime.
    pub fn acquire(factory: Arc<dyn FactoryBase>, loader: LoaderId) -> Self {
        factory.add_owning_loader(loader);
        Self { factory, loader }
    }

    /// The loader identity this guard registered.
    pub fn loader(&self) -> LoaderId {
        self.loader
    }

    /// The factory this guard holds ownership of.
    pub fn factory(&self) -> &Arc<dyn FactoryBase> {
        &self.factory
    }
}

impl Drop for OwnershipGuard {
    fn drop(&mut self) {
        self.factory.remove_owning_loader(self.loader);
    }
}

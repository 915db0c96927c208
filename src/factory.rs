//! Type-erased plugin class factories.
//!
//! A factory manufactures instances of a declared base interface `B` from one
//! concrete implementation type, without exposing that concrete type to
//! callers. Three layers mirror that contract:
//!
//! - [`FactoryCore`] holds the state every factory shares regardless of the
//!   interface it produces: the path of the library it came from and the set
//!   of loaders currently depending on it.
//! - [`PluginFactory<B>`] adds the human-readable class name and the erased
//!   `create() -> Box<B>` contract for one base interface.
//! - [`ClassFactory<B>`] binds that contract to one concrete type, usually
//!   through the [`class_factory!`](crate::class_factory) macro.

use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::owner::LoaderId;

/// Sentinel library path of a factory that has not been stamped with its
/// originating library yet.
pub const UNKNOWN_LIBRARY_PATH: &str = "Unknown";

#[derive(Debug)]
struct CoreState {
    library_path: String,
    owners: Vec<LoaderId>,
}

/// State shared by every factory regardless of produced interface: the
/// associated library path and the set of owning loaders.
///
/// All operations take `&self`; the state lives under a single lock scoped to
/// this core, held only for the duration of each operation. Any thread may
/// call any operation at any time relative to any other thread.
#[derive(Debug)]
pub struct FactoryCore {
    state: RwLock<CoreState>,
}

impl FactoryCore {
    /// Create a core with no owners and the [`UNKNOWN_LIBRARY_PATH`] sentinel.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CoreState {
                library_path: UNKNOWN_LIBRARY_PATH.to_string(),
                owners: Vec::new(),
            }),
        }
    }

    // Critical sections are short and never leave the state torn, so a
    // poisoned lock is still safe to reuse.
    fn read(&self) -> RwLockReadGuard<'_, CoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Path of the library this factory originated from.
    ///
    /// Returns [`UNKNOWN_LIBRARY_PATH`] until [`set_library_path`] is called.
    ///
    /// [`set_library_path`]: FactoryCore::set_library_path
    pub fn library_path(&self) -> String {
        self.read().library_path.clone()
    }

    /// Stamp this factory with the path of the library it came from.
    ///
    /// Overwrites unconditionally. Callers must set the path at most once,
    /// right after construction and before the factory is published to any
    /// loader; the registry caches the path for unload decisions and will not
    /// observe later changes.
    pub fn set_library_path(&self, path: &str) {
        self.write().library_path = path.to_string();
    }

    /// Register `loader` as an owner of this factory.
    ///
    /// Adding a loader that is already registered is a no-op, so a loader
    /// that re-resolves the same factory through several lookup paths still
    /// needs only one matching [`remove_owning_loader`] to let go.
    ///
    /// [`remove_owning_loader`]: FactoryCore::remove_owning_loader
    pub fn add_owning_loader(&self, loader: LoaderId) {
        let mut state = self.write();
        if !state.owners.contains(&loader) {
            state.owners.push(loader);
        }
    }

    /// Remove `loader` from this factory's owners.
    ///
    /// Removing a loader that is not registered is a no-op.
    pub fn remove_owning_loader(&self, loader: LoaderId) {
        self.write().owners.retain(|l| *l != loader);
    }

    /// Check whether `loader` currently owns this factory.
    pub fn is_owned_by(&self, loader: LoaderId) -> bool {
        self.read().owners.contains(&loader)
    }

    /// Check whether any loader currently owns this factory.
    ///
    /// While this returns true the factory must not be destroyed and its
    /// library must not be closed.
    pub fn is_owned_by_anybody(&self) -> bool {
        !self.read().owners.is_empty()
    }

    /// Snapshot of the loaders currently owning this factory.
    pub fn owners(&self) -> Vec<LoaderId> {
        self.read().owners.clone()
    }
}

impl Default for FactoryCore {
    fn default() -> Self {
        Self::new()
    }
}

/// Interface-independent view of a factory.
///
/// Lets the registry and unload-policy code handle factories for different
/// base interfaces uniformly (`Arc<dyn FactoryBase>`). All ownership and
/// library-path operations delegate to the factory's [`FactoryCore`].
pub trait FactoryBase: Send + Sync {
    /// The shared state of this factory.
    fn core(&self) -> &FactoryCore;

    /// See [`FactoryCore::library_path`].
    fn library_path(&self) -> String {
        self.core().library_path()
    }

    /// See [`FactoryCore::set_library_path`].
    fn set_library_path(&self, path: &str) {
        self.core().set_library_path(path);
    }

    /// See [`FactoryCore::add_owning_loader`].
    fn add_owning_loader(&self, loader: LoaderId) {
        self.core().add_owning_loader(loader);
    }

    /// See [`FactoryCore::remove_owning_loader`].
    fn remove_owning_loader(&self, loader: LoaderId) {
        self.core().remove_owning_loader(loader);
    }

    /// See [`FactoryCore::is_owned_by`].
    fn is_owned_by(&self, loader: LoaderId) -> bool {
        self.core().is_owned_by(loader)
    }

    /// See [`FactoryCore::is_owned_by_anybody`].
    fn is_owned_by_anybody(&self) -> bool {
        self.core().is_owned_by_anybody()
    }
}

/// The creation contract for one base interface `B`.
///
/// Each `create` call produces a brand-new, fully independent instance; the
/// factory caches nothing and no call observes another call's result.
/// `create` touches no shared mutable state, so it may run in parallel with
/// other `create` calls and with ownership operations on the same factory.
pub trait PluginFactory<B: ?Sized>: FactoryBase {
    /// The class name this factory was published under. Fixed at
    /// construction, never changes.
    fn name(&self) -> &str;

    /// Construct a new instance of the concrete class, returned through the
    /// base interface. The caller receives exclusive ownership.
    ///
    /// Cannot be used for singletons.
    fn create(&self) -> Box<B>;
}

/// A factory producing instances of base interface `B` from one concrete
/// implementation type.
///
/// The concrete type is captured in the constructor function at the
/// instantiation site — see [`class_factory!`](crate::class_factory), which
/// expands to
/// `ClassFactory::<dyn Base>::new("Concrete", || Box::new(Concrete::default()))`
/// and lets the compiler check that the concrete type is default-constructible
/// and implements the base interface.
///
/// Deliberately neither `Clone` nor `Default`: a copy would be a second
/// factory object claiming the same class name, breaking by-name lookup.
pub struct ClassFactory<B: ?Sized> {
    name: String,
    core: FactoryCore,
    constructor: fn() -> Box<B>,
}

impl<B: ?Sized> ClassFactory<B> {
    /// Create a factory that publishes `constructor`'s instances under
    /// `name`. The library path starts at [`UNKNOWN_LIBRARY_PATH`].
    pub fn new(name: impl Into<String>, constructor: fn() -> Box<B>) -> Self {
        Self {
            name: name.into(),
            core: FactoryCore::new(),
            constructor,
        }
    }
}

impl<B: ?Sized> FactoryBase for ClassFactory<B> {
    fn core(&self) -> &FactoryCore {
        &self.core
    }
}

impl<B: ?Sized> PluginFactory<B> for ClassFactory<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self) -> Box<B> {
        (self.constructor)()
    }
}

impl<B: ?Sized> fmt::Debug for ClassFactory<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassFactory")
            .field("name", &self.name)
            .field("library_path", &self.core.library_path())
            .finish()
    }
}

impl<B: ?Sized> Drop for ClassFactory<B> {
    fn drop(&mut self) {
        tracing::debug!("Destroying factory for class: {}", self.name);
    }
}

/// Build a [`ClassFactory`] for a concrete type behind a base interface.
///
/// ```
/// use lib_class_factory::{class_factory, PluginFactory};
///
/// trait Shape: Send {
///     fn sides(&self) -> u32;
/// }
///
/// #[derive(Default)]
/// struct Square {
///     side: f64,
/// }
///
/// impl Shape for Square {
///     fn sides(&self) -> u32 {
///         4
///     }
/// }
///
/// let factory = class_factory!(Square, dyn Shape);
/// assert_eq!(factory.name(), "Square");
/// assert_eq!(factory.create().sides(), 4);
/// ```
///
/// A third form overrides the published class name:
/// `class_factory!("square", Square, dyn Shape)`.
#[macro_export]
macro_rules! class_factory {
    ($concrete:ty, $base:ty) => {
        $crate::class_factory!(::core::stringify!($concrete), $concrete, $base)
    };
    ($name:expr, $concrete:ty, $base:ty) => {
        $crate::ClassFactory::<$base>::new($name, || -> ::std::boxed::Box<$base> {
            ::std::boxed::Box::new(<$concrete as ::core::default::Default>::default())
        })
    };
}

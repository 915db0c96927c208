//! Type-erased plugin class factories with multi-owner tracking.
//!
//! A plugin library exposes concrete classes through a stable,
//! base-interface-typed creation contract: a [`ClassFactory`] manufactures
//! fresh `Box<dyn Base>` instances without ever exposing the concrete type.
//! Each factory also tracks *which* loaders currently depend on it, so the
//! policy layer that closes plugin libraries can tell when a factory's
//! backing library is still in use.
//!
//! # Example
//!
//! ```
//! use lib_class_factory::{class_factory, FactoryBase, FactoryRegistry, LoaderId, PluginFactory};
//!
//! trait Shape: Send {
//!     fn sides(&self) -> u32;
//! }
//!
//! #[derive(Default)]
//! struct Square {
//!     side: f64,
//! }
//!
//! impl Shape for Square {
//!     fn sides(&self) -> u32 {
//!         4
//!     }
//! }
//!
//! # fn main() -> Result<(), lib_class_factory::FactoryError> {
//! // Registration side, run as the plugin library is opened:
//! let registry = FactoryRegistry::new();
//! let factory = class_factory!(Square, dyn Shape);
//! factory.set_library_path("libshapes.so");
//! registry.register(factory)?;
//!
//! // Loader side:
//! let loader = LoaderId::new();
//! let factory = registry.acquire::<dyn Shape>("Square", loader)?;
//! let shape = factory.create();
//! assert_eq!(shape.sides(), 4);
//!
//! // Teardown: the library may only go away once nobody owns its factories.
//! factory.remove_owning_loader(loader);
//! assert!(!registry.is_library_in_use("libshapes.so"));
//! registry.unregister_library("libshapes.so")?;
//! # Ok(())
//! # }
//! ```

mod error;
mod factory;
mod owner;
mod registry;

pub use error::*;
pub use factory::*;
pub use owner::*;
pub use registry::*;

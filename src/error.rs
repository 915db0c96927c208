//! Error types for factory registry operations.

use thiserror::Error;

use crate::owner::LoaderId;

/// Errors that can occur while publishing, resolving, or tearing down
/// plugin class factories.
#[derive(Debug, Error)]
pub enum FactoryError {
    /// No factory registered under the requested class name
    #[error("No factory registered for class: {0}")]
    ClassNotFound(String),

    /// A factory with this class name is already published for the
    /// same base interface
    #[error("Factory already registered for class: {0}")]
    AlreadyRegistered(String),

    /// A library teardown was requested while loaders still own one of
    /// its factories
    #[error("Library still in use: {path} ({} owner(s))", .owners.len())]
    LibraryInUse {
        /// Path of the library whose factories were asked to go away
        path: String,
        /// The loaders still registered across that library's factories
        owners: Vec<LoaderId>,
    },
}

/// Result type for factory registry operations
pub type Result<T> = std::result::Result<T, FactoryError>;

//! Registry errors

use thiserror::Error;

use crate::meta::TypeId;

/// Errors raised while populating a [`crate::TypeRegistry`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Type id was never registered
    #[error("Unknown type id {0:?}")]
    UnknownType(TypeId),

    /// Type already has an attached property type
    #[error("Type '{0}' already has attached properties")]
    AlreadyAttached(String),
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

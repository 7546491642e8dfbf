use crate::{EntityId, RelationshipId};
use thiserror::Error;

/// Failure taxonomy shared by every graph operation.
///
/// `DataFetch` is recoverable and surfaced to the analyst. `InvariantViolation`
/// marks an internal defect; callers assert on it in debug builds. The
/// remaining variants are synchronous rejections that leave state untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Data fetch failed: {0}")]
    DataFetch(String),
    #[error("Graph invariant violated: {0}")]
    InvariantViolation(String),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Entity {0} not found")]
    EntityNotFound(EntityId),
    #[error("Relationship {0} not found")]
    RelationshipNotFound(RelationshipId),
}

impl GraphError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    pub fn fetch(message: impl Into<String>) -> Self {
        Self::DataFetch(message.into())
    }

    /// Rejections the analyst can act on (retry, change selection).
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvariantViolation(_))
    }
}

/// Error type for enum conversion failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnumConversionError {
    #[error("Invalid EntityType value: {0}")]
    InvalidEntityType(String),
}

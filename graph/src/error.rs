//! Graph error types.

use imo_core::EntityId;
use imo_registry::ConfigError;
use thiserror::Error;

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors that can occur while reading or mutating the graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Unknown type: {name}")]
    UnknownType { name: String },

    #[error("Unknown field: {field} on type {type_name}")]
    UnknownField { type_name: String, field: String },

    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("Invalid reference class: {type_name}.{field} expects {expected}, got {actual}")]
    TypeMismatch {
        type_name: String,
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Key mismatch in {field}: entity {entity} has key {actual}, not {expected}")]
    KeyMismatch {
        field: String,
        entity: EntityId,
        expected: String,
        actual: String,
    },

    #[error("Value {value} of {field} cannot key a collection")]
    UnkeyableValue { field: String, value: String },

    #[error("Field {field} is not a collection")]
    NotACollection { field: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl GraphError {
    pub fn unknown_type(name: impl Into<String>) -> Self {
        Self::UnknownType { name: name.into() }
    }

    pub fn unknown_field(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            type_name: type_name.into(),
            field: field.into(),
        }
    }

    pub fn type_mismatch(
        type_name: impl Into<String>,
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            type_name: type_name.into(),
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn unkeyable_value(field: impl Into<String>, value: impl ToString) -> Self {
        Self::UnkeyableValue {
            field: field.into(),
            value: value.to_string(),
        }
    }

    /// Whether this is a configuration error (unresolvable relation).
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

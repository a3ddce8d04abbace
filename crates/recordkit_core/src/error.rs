//! Façade-level error taxonomy.
//!
//! # Responsibility
//! - Define the single error type returned by access/control operations.
//! - Keep lower-layer errors (schema, storage, registry) intact as sources.
//!
//! # Invariants
//! - Every façade call resolves to exactly one value or exactly one error.
//! - Grammar errors are carried verbatim, never re-worded.
//! - Storage errors are propagated untranslated and never retried.

use crate::model::schema::SchemaError;
use crate::registry::RegistryError;
use crate::storage::StorageError;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RecordResult<T> = Result<T, RecordError>;

/// Malformed record construction or key resolution input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    /// Record data was not a JSON object; carries the received value kind.
    NotAnObject(&'static str),
    /// Record config carries no resolved model name.
    MissingConfigName,
    /// Scope string was neither `create` nor `update`.
    InvalidScope(String),
    /// Key input lacks a required key field.
    MissingKeyField(String),
    /// Key input has an unusable shape.
    InvalidKey(String),
}

impl Display for InputError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject(kind) => {
                write!(f, "record must contain a data object, got {kind}")
            }
            Self::MissingConfigName => write!(f, "record must contain a named config"),
            Self::InvalidScope(scope) => write!(f, "invalid record scope: {scope}"),
            Self::MissingKeyField(field) => write!(f, "key is missing field `{field}`"),
            Self::InvalidKey(message) => write!(f, "invalid key: {message}"),
        }
    }
}

impl Error for InputError {}

/// Record validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Error reported by the validation grammar.
    Schema(SchemaError),
    /// Error raised by a custom validate hook.
    Rejected { message: String },
}

impl ValidationError {
    /// Builds the error a custom validate hook returns to abort a write.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Schema(err) => write!(f, "{err}"),
            Self::Rejected { message } => write!(f, "{message}"),
        }
    }
}

impl Error for ValidationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Schema(err) => Some(err),
            Self::Rejected { .. } => None,
        }
    }
}

impl From<SchemaError> for ValidationError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

/// Uniqueness guard hit for a create that is still in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictError {
    pub model: String,
    pub field: String,
    pub value: Value,
}

impl Display for ConflictError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} object with {}={} is in creating state",
            self.model, self.field, self.value
        )
    }
}

impl Error for ConflictError {}

/// Error returned by every access/control operation.
#[derive(Debug)]
pub enum RecordError {
    InvalidInput(InputError),
    Validation(ValidationError),
    Conflict(ConflictError),
    Storage(StorageError),
    Registry(RegistryError),
    /// Option struct could not be built (unknown or mistyped fields).
    InvalidOptions(String),
}

impl RecordError {
    /// Stable log label for the error class.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Validation(_) => "validation_failed",
            Self::Conflict(_) => "creating_conflict",
            Self::Storage(StorageError::ConditionalCheckFailed { .. }) => "conditional_check_failed",
            Self::Storage(_) => "storage_failed",
            Self::Registry(_) => "registry_lookup_failed",
            Self::InvalidOptions(_) => "invalid_options",
        }
    }
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Conflict(err) => write!(f, "{err}"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::Registry(err) => write!(f, "{err}"),
            Self::InvalidOptions(message) => write!(f, "invalid options: {message}"),
        }
    }
}

impl Error for RecordError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidInput(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Conflict(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::Registry(err) => Some(err),
            Self::InvalidOptions(_) => None,
        }
    }
}

impl From<InputError> for RecordError {
    fn from(value: InputError) -> Self {
        Self::InvalidInput(value)
    }
}

impl From<ValidationError> for RecordError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<SchemaError> for RecordError {
    fn from(value: SchemaError) -> Self {
        Self::Validation(ValidationError::Schema(value))
    }
}

impl From<ConflictError> for RecordError {
    fn from(value: ConflictError) -> Self {
        Self::Conflict(value)
    }
}

impl From<StorageError> for RecordError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

impl From<RegistryError> for RecordError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

/// Short kind label for a JSON value, used in error messages and logs.
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

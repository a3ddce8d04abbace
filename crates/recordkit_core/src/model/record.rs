//! Record validation/normalization pipeline.
//!
//! # Responsibility
//! - Wrap a write payload together with its record config and scope.
//! - Apply scope-specific normalize hooks, update-field projection and
//!   validation before anything reaches storage.
//!
//! # Invariants
//! - Record data is always a JSON object.
//! - Wrapping an existing `Record` returns it unchanged.
//! - `normalize()` runs before `validate()`, so grammars see projected data.

use super::definition::RecordConfig;
use super::Document;
use crate::error::{value_kind, InputError, ValidationError};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;

/// Whether a record is prepared for initial creation or partial update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordScope {
    Create,
    Update,
}

impl RecordScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
        }
    }
}

impl FromStr for RecordScope {
    type Err = InputError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            other => Err(InputError::InvalidScope(other.to_string())),
        }
    }
}

/// Input accepted where a record is expected.
#[derive(Debug, Clone)]
pub enum Payload {
    Raw(Value),
    Wrapped(Record),
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Raw(value)
    }
}

impl From<Document> for Payload {
    fn from(value: Document) -> Self {
        Self::Raw(Value::Object(value))
    }
}

impl From<Record> for Payload {
    fn from(value: Record) -> Self {
        Self::Wrapped(value)
    }
}

/// Transient write payload bound to a record config and scope.
#[derive(Debug, Clone)]
pub struct Record {
    data: Document,
    config: Arc<RecordConfig>,
    scope: RecordScope,
}

impl Record {
    /// Wraps `payload` for the given scope.
    ///
    /// An already wrapped record is returned as-is; its own config and scope
    /// win over the arguments.
    ///
    /// # Errors
    /// - `InputError::NotAnObject` when raw data is not a JSON object.
    /// - `InputError::MissingConfigName` when `config` has no resolved name.
    pub fn create(
        config: Arc<RecordConfig>,
        payload: impl Into<Payload>,
        scope: RecordScope,
    ) -> Result<Self, InputError> {
        let value = match payload.into() {
            Payload::Wrapped(record) => return Ok(record),
            Payload::Raw(value) => value,
        };

        let data = match value {
            Value::Object(data) => data,
            other => return Err(InputError::NotAnObject(value_kind(&other))),
        };

        match config.name.as_deref() {
            Some(name) if !name.trim().is_empty() => {}
            _ => return Err(InputError::MissingConfigName),
        }

        Ok(Self {
            data,
            config,
            scope,
        })
    }

    pub fn scope(&self) -> RecordScope {
        self.scope
    }

    pub fn is_creating(&self) -> bool {
        self.scope == RecordScope::Create
    }

    pub fn is_updating(&self) -> bool {
        self.scope == RecordScope::Update
    }

    /// Resolved model name of the bound config.
    pub fn name(&self) -> &str {
        self.config.name.as_deref().unwrap_or_default()
    }

    pub fn config(&self) -> &RecordConfig {
        &self.config
    }

    /// Applies the scope's normalize hook.
    ///
    /// On update scope, the payload is then projected down to the fields the
    /// update schema declares.
    pub fn normalize(mut self) -> Result<Self, ValidationError> {
        let config = Arc::clone(&self.config);
        match self.scope {
            RecordScope::Create => {
                if let Some(hook) = &config.create_normalize {
                    self.data = hook(std::mem::take(&mut self.data));
                }
            }
            RecordScope::Update => {
                if let Some(hook) = &config.update_normalize {
                    self.data = hook(std::mem::take(&mut self.data));
                }
                if let Some(schema) = &config.update_schema {
                    let declared = schema.field_names();
                    self.data.retain(|field, _| declared.contains(field));
                }
            }
        }
        Ok(self)
    }

    /// Runs the scope's validate hook, then the scope's grammar.
    pub fn validate(self) -> Result<Self, ValidationError> {
        let schema = match self.scope {
            RecordScope::Create => {
                if let Some(hook) = &self.config.create_validate {
                    hook(&self.data)?;
                }
                self.config.create_schema.as_ref()
            }
            RecordScope::Update => {
                if let Some(hook) = &self.config.update_validate {
                    hook(&self.data)?;
                }
                self.config.update_schema.as_ref()
            }
        };

        if let Some(schema) = schema {
            schema.validate(&self.data)?;
        }
        Ok(self)
    }

    pub fn data(&self) -> &Document {
        &self.data
    }

    pub fn into_data(self) -> Document {
        self.data
    }
}

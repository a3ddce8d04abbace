//! Static model and record configuration.
//!
//! # Responsibility
//! - Describe a model's storage identity (table, key fields, indexes).
//! - Carry the optional per-scope record hooks.
//!
//! # Invariants
//! - Both configs are immutable once handed to the catalog.
//! - `RecordConfig::name` is resolved by the catalog at define time.

use super::schema::Schema;
use super::Document;
use crate::error::ValidationError;
use crate::storage::{IndexSpec, TableSpec};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Data-shaping hook applied during `Record::normalize`.
pub type NormalizeHook = Arc<dyn Fn(Document) -> Document + Send + Sync>;

/// Side-effecting check applied during `Record::validate`.
pub type ValidateHook = Arc<dyn Fn(&Document) -> Result<(), ValidationError> + Send + Sync>;

/// Storage identity plus the model's base schema.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub table: TableSpec,
    /// Base grammar; used as the create schema unless the record config
    /// supplies one.
    pub schema: Option<Arc<dyn Schema>>,
}

impl ModelConfig {
    pub fn new(table_name: impl Into<String>, hash_key: impl Into<String>) -> Self {
        Self {
            table: TableSpec::new(table_name, hash_key),
            schema: None,
        }
    }

    pub fn with_range_key(mut self, range_key: impl Into<String>) -> Self {
        self.table.range_key = Some(range_key.into());
        self
    }

    pub fn with_index(mut self, index: IndexSpec) -> Self {
        self.table.indexes.push(index);
        self
    }

    pub fn with_schema(mut self, schema: impl Schema + 'static) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }

    pub fn hash_key(&self) -> &str {
        &self.table.hash_key
    }

    pub fn range_key(&self) -> Option<&str> {
        self.table.range_key.as_deref()
    }

    /// Hash key followed by the range key when declared.
    pub fn key_fields(&self) -> Vec<String> {
        self.table.key_fields()
    }
}

/// Optional per-scope hooks for the record pipeline.
#[derive(Clone, Default)]
pub struct RecordConfig {
    /// Lookup name. When set before `define`, it replaces the definition name
    /// as the catalog key.
    pub name: Option<String>,
    pub create_schema: Option<Arc<dyn Schema>>,
    pub update_schema: Option<Arc<dyn Schema>>,
    pub create_normalize: Option<NormalizeHook>,
    pub update_normalize: Option<NormalizeHook>,
    pub create_validate: Option<ValidateHook>,
    pub update_validate: Option<ValidateHook>,
}

impl RecordConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_create_schema(mut self, schema: impl Schema + 'static) -> Self {
        self.create_schema = Some(Arc::new(schema));
        self
    }

    pub fn with_update_schema(mut self, schema: impl Schema + 'static) -> Self {
        self.update_schema = Some(Arc::new(schema));
        self
    }

    pub fn with_create_normalize<F>(mut self, hook: F) -> Self
    where
        F: Fn(Document) -> Document + Send + Sync + 'static,
    {
        self.create_normalize = Some(Arc::new(hook));
        self
    }

    pub fn with_update_normalize<F>(mut self, hook: F) -> Self
    where
        F: Fn(Document) -> Document + Send + Sync + 'static,
    {
        self.update_normalize = Some(Arc::new(hook));
        self
    }

    pub fn with_create_validate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Document) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.create_validate = Some(Arc::new(hook));
        self
    }

    pub fn with_update_validate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Document) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.update_validate = Some(Arc::new(hook));
        self
    }
}

impl Debug for RecordConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordConfig")
            .field("name", &self.name)
            .field("create_schema", &self.create_schema)
            .field("update_schema", &self.update_schema)
            .field("create_normalize", &self.create_normalize.is_some())
            .field("update_normalize", &self.update_normalize.is_some())
            .field("create_validate", &self.create_validate.is_some())
            .field("update_validate", &self.update_validate.is_some())
            .finish()
    }
}

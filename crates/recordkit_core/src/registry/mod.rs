//! Model catalog.
//!
//! # Responsibility
//! - Register models by name: storage handle, model config, derived record
//!   config.
//! - Resolve names for every access/control call.
//!
//! # Invariants
//! - Entries are immutable once registered; lookups hand out shared refs.
//! - Unknown names fail fast with `RegistryError::NotFound`.
//! - Redefinition follows `CatalogConfig::redefinition`.

use crate::config::{CatalogConfig, RedefinitionPolicy};
use crate::model::definition::{ModelConfig, RecordConfig};
use crate::model::Document;
use crate::storage::query::{Query, QueryRequest};
use crate::storage::{
    EngineParams, EngineResult, ItemKey, StorageEngine, StorageError, StorageResult, TableSpec,
    WriteParams,
};
use log::{info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Debug)]
pub enum RegistryError {
    NotFound(String),
    AlreadyDefined(String),
    InvalidName(String),
    /// Storage engine rejected the table definition.
    Storage(StorageError),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(name) => write!(f, "model not defined: {name}"),
            Self::AlreadyDefined(name) => write!(f, "model already defined: {name}"),
            Self::InvalidName(name) => write!(f, "model name is invalid: `{name}`"),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for RegistryError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

/// Storage handle bound to one table.
#[derive(Clone)]
pub struct ModelHandle {
    table: TableSpec,
    engine: Arc<dyn StorageEngine>,
}

impl Debug for ModelHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl ModelHandle {
    pub fn table(&self) -> &TableSpec {
        &self.table
    }

    pub fn get(&self, key: &ItemKey, params: &EngineParams) -> StorageResult<EngineResult> {
        self.engine.get_item(&self.table, key, params)
    }

    pub fn get_items(&self, keys: &[ItemKey], params: &EngineParams) -> StorageResult<EngineResult> {
        self.engine.batch_get(&self.table, keys, params)
    }

    pub fn create(&self, item: &Document, params: &WriteParams) -> StorageResult<EngineResult> {
        self.engine.put_item(&self.table, item, params)
    }

    pub fn update(&self, item: &Document, params: &WriteParams) -> StorageResult<EngineResult> {
        self.engine.update_item(&self.table, item, params)
    }

    pub fn destroy(&self, key: &ItemKey, params: &WriteParams) -> StorageResult<EngineResult> {
        self.engine.delete_item(&self.table, key, params)
    }

    /// Starts a query on one hash-key partition.
    pub fn query(&self, hash_key: serde_json::Value) -> Query {
        Query::new(hash_key)
    }

    pub fn exec(&self, request: &QueryRequest) -> StorageResult<EngineResult> {
        self.engine.query(&self.table, request)
    }
}

/// One registered model.
#[derive(Debug)]
pub struct ModelEntry {
    name: String,
    handle: ModelHandle,
    config: ModelConfig,
    record_config: Arc<RecordConfig>,
}

impl ModelEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn record_config(&self) -> Arc<RecordConfig> {
        Arc::clone(&self.record_config)
    }
}

/// Name-keyed model registry owned by the application.
pub struct Catalog {
    engine: Arc<dyn StorageEngine>,
    config: CatalogConfig,
    entries: BTreeMap<String, Arc<ModelEntry>>,
}

impl Catalog {
    pub fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self::with_config(engine, CatalogConfig::default())
    }

    pub fn with_config(engine: Arc<dyn StorageEngine>, config: CatalogConfig) -> Self {
        Self {
            engine,
            config,
            entries: BTreeMap::new(),
        }
    }

    /// Registers `name` and returns the new entry.
    ///
    /// The storage table is defined under `config`'s table name. The catalog
    /// key is the record config's own `name` when set, otherwise `name`. The
    /// derived record config falls back to `config.schema` as its create
    /// schema and is tagged with the catalog key.
    ///
    /// # Errors
    /// - `InvalidName` for blank names.
    /// - `AlreadyDefined` when the key exists under the strict policy.
    /// - `Storage` when the engine rejects the table definition.
    pub fn define(
        &mut self,
        name: &str,
        config: ModelConfig,
        record_config: Option<RecordConfig>,
    ) -> RegistryResult<Arc<ModelEntry>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistryError::InvalidName(name.to_string()));
        }

        let mut record_config = record_config.unwrap_or_default();
        let lookup_name = match record_config.name.take() {
            Some(alias) if !alias.trim().is_empty() => alias.trim().to_string(),
            _ => name.to_string(),
        };

        if self.entries.contains_key(&lookup_name) {
            match self.config.redefinition {
                RedefinitionPolicy::Strict => {
                    return Err(RegistryError::AlreadyDefined(lookup_name));
                }
                RedefinitionPolicy::Permissive => {
                    warn!(
                        "event=model_define module=registry status=overwrite model={lookup_name}"
                    );
                }
            }
        }

        self.engine.define_table(&config.table)?;

        if record_config.create_schema.is_none() {
            record_config.create_schema = config.schema.clone();
        }
        record_config.name = Some(lookup_name.clone());

        let entry = Arc::new(ModelEntry {
            name: lookup_name.clone(),
            handle: ModelHandle {
                table: config.table.clone(),
                engine: Arc::clone(&self.engine),
            },
            config,
            record_config: Arc::new(record_config),
        });
        self.entries.insert(lookup_name.clone(), Arc::clone(&entry));

        info!(
            "event=model_define module=registry status=ok model={} table={}",
            lookup_name,
            entry.config.table.name
        );
        Ok(entry)
    }

    pub fn entry(&self, name: &str) -> RegistryResult<Arc<ModelEntry>> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn get_model(&self, name: &str) -> RegistryResult<&ModelHandle> {
        self.lookup(name).map(|entry| &entry.handle)
    }

    pub fn get_config(&self, name: &str) -> RegistryResult<&ModelConfig> {
        self.lookup(name).map(|entry| &entry.config)
    }

    pub fn get_record_config(&self, name: &str) -> RegistryResult<Arc<RecordConfig>> {
        self.lookup(name).map(ModelEntry::record_config)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, name: &str) -> RegistryResult<&ModelEntry> {
        self.entries
            .get(name)
            .map(Arc::as_ref)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }
}

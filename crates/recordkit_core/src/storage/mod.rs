//! Storage engine contract and reference implementation.
//!
//! # Responsibility
//! - Define the `StorageEngine` seam the catalog and façades talk to.
//! - Define engine-side value types: keys, write params, provider-native
//!   items and query pages.
//! - Ship a SQLite-backed engine (`SqliteEngine`).
//!
//! # Invariants
//! - Conditional writes are evaluated by the engine, never by callers.
//! - Engine errors reach callers untranslated.

pub mod condition;
pub mod query;
mod sqlite;

pub use sqlite::SqliteEngine;

use crate::db::DbError;
use crate::error::{value_kind, InputError};
use crate::model::Document;
use query::QueryRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StorageResult<T> = Result<T, StorageError>;

/// Engine-native read parameters, passed through untouched.
pub type EngineParams = Document;

/// Engine-level failure.
#[derive(Debug)]
pub enum StorageError {
    Db(DbError),
    /// Condition expression evaluated to false against the stored item.
    ConditionalCheckFailed { table: String },
    /// Condition expression could not be parsed or resolved.
    InvalidExpression(String),
    /// Table spec rejected by `define_table`.
    InvalidTable(String),
    UnknownIndex { table: String, index: String },
    /// Item lacks one of the table's key fields.
    MissingKey { table: String, field: String },
    /// Persisted row could not be decoded.
    InvalidData(String),
    /// Engine state lock was poisoned by a panicking writer.
    Unavailable(String),
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::ConditionalCheckFailed { table } => {
                write!(f, "the conditional request failed on table `{table}`")
            }
            Self::InvalidExpression(message) => write!(f, "invalid expression: {message}"),
            Self::InvalidTable(message) => write!(f, "invalid table definition: {message}"),
            Self::UnknownIndex { table, index } => {
                write!(f, "table `{table}` has no index named `{index}`")
            }
            Self::MissingKey { table, field } => {
                write!(f, "item for table `{table}` is missing key field `{field}`")
            }
            Self::InvalidData(message) => write!(f, "invalid stored item: {message}"),
            Self::Unavailable(message) => write!(f, "storage unavailable: {message}"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StorageError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        Self::Db(DbError::Json(value))
    }
}

/// Secondary index declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub hash_key: String,
    pub range_key: Option<String>,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, hash_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hash_key: hash_key.into(),
            range_key: None,
        }
    }

    pub fn with_range_key(mut self, range_key: impl Into<String>) -> Self {
        self.range_key = Some(range_key.into());
        self
    }
}

/// Table identity handed to the engine on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub hash_key: String,
    pub range_key: Option<String>,
    pub indexes: Vec<IndexSpec>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>, hash_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hash_key: hash_key.into(),
            range_key: None,
            indexes: Vec::new(),
        }
    }

    pub fn key_fields(&self) -> Vec<String> {
        let mut fields = vec![self.hash_key.clone()];
        fields.extend(self.range_key.clone());
        fields
    }

    pub fn index(&self, name: &str) -> Option<&IndexSpec> {
        self.indexes.iter().find(|index| index.name == name)
    }

    /// Checks the declaration-level invariants `define_table` relies on.
    pub fn validate(&self) -> StorageResult<()> {
        if self.name.trim().is_empty() {
            return Err(StorageError::InvalidTable("table name is empty".to_string()));
        }
        if self.hash_key.trim().is_empty() {
            return Err(StorageError::InvalidTable(format!(
                "table `{}` has an empty hash key",
                self.name
            )));
        }
        if self.range_key.as_deref() == Some(self.hash_key.as_str()) {
            return Err(StorageError::InvalidTable(format!(
                "table `{}` uses `{}` as both hash and range key",
                self.name, self.hash_key
            )));
        }
        let mut seen = Vec::with_capacity(self.indexes.len());
        for index in &self.indexes {
            if index.name.trim().is_empty() || index.hash_key.trim().is_empty() {
                return Err(StorageError::InvalidTable(format!(
                    "table `{}` declares an index without name or hash key",
                    self.name
                )));
            }
            if seen.contains(&index.name.as_str()) {
                return Err(StorageError::InvalidTable(format!(
                    "table `{}` declares index `{}` twice",
                    self.name, index.name
                )));
            }
            seen.push(index.name.as_str());
        }
        Ok(())
    }
}

/// Fully resolved primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemKey {
    pub hash: Value,
    pub range: Option<Value>,
}

impl ItemKey {
    /// Extracts the primary key from a full item.
    pub fn from_item(table: &TableSpec, item: &Document) -> StorageResult<Self> {
        let missing = |field: &str| StorageError::MissingKey {
            table: table.name.clone(),
            field: field.to_string(),
        };
        let hash = item
            .get(&table.hash_key)
            .filter(|value| !value.is_null())
            .cloned()
            .ok_or_else(|| missing(&table.hash_key))?;
        let range = match &table.range_key {
            Some(field) => Some(
                item.get(field)
                    .filter(|value| !value.is_null())
                    .cloned()
                    .ok_or_else(|| missing(field))?,
            ),
            None => None,
        };
        Ok(Self { hash, range })
    }

    /// Key as an attribute map, e.g. for `LastEvaluatedKey`.
    pub fn to_document(&self, table: &TableSpec) -> Document {
        let mut doc = Document::new();
        doc.insert(table.hash_key.clone(), self.hash.clone());
        if let (Some(field), Some(range)) = (&table.range_key, &self.range) {
            doc.insert(field.clone(), range.clone());
        }
        doc
    }
}

/// Caller-facing key input before it is resolved against a table.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyInput {
    /// Bare hash-key value.
    Hash(Value),
    HashRange(Value, Value),
    /// Attribute map naming the key fields.
    Fields(Document),
}

impl KeyInput {
    pub fn resolve(&self, table: &TableSpec) -> Result<ItemKey, InputError> {
        let key = match self {
            Self::Hash(hash) => ItemKey {
                hash: hash.clone(),
                range: None,
            },
            Self::HashRange(hash, range) => ItemKey {
                hash: hash.clone(),
                range: Some(range.clone()),
            },
            Self::Fields(fields) => ItemKey {
                hash: fields
                    .get(&table.hash_key)
                    .cloned()
                    .ok_or_else(|| InputError::MissingKeyField(table.hash_key.clone()))?,
                range: match &table.range_key {
                    Some(field) => Some(
                        fields
                            .get(field)
                            .cloned()
                            .ok_or_else(|| InputError::MissingKeyField(field.clone()))?,
                    ),
                    None => None,
                },
            },
        };

        for value in std::iter::once(&key.hash).chain(key.range.as_ref()) {
            if value.is_null() || value.is_array() || value.is_object() {
                return Err(InputError::InvalidKey(format!(
                    "key values must be scalars, got {}",
                    value_kind(value)
                )));
            }
        }

        match (&table.range_key, &key.range) {
            (Some(field), None) => Err(InputError::MissingKeyField(field.clone())),
            (None, Some(_)) => Err(InputError::InvalidKey(format!(
                "table `{}` has no range key",
                table.name
            ))),
            _ => Ok(key),
        }
    }
}

impl From<Value> for KeyInput {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self::Fields(fields),
            other => Self::Hash(other),
        }
    }
}

impl From<&str> for KeyInput {
    fn from(value: &str) -> Self {
        Self::Hash(Value::from(value))
    }
}

impl From<String> for KeyInput {
    fn from(value: String) -> Self {
        Self::Hash(Value::from(value))
    }
}

impl From<i64> for KeyInput {
    fn from(value: i64) -> Self {
        Self::Hash(Value::from(value))
    }
}

impl From<Document> for KeyInput {
    fn from(value: Document) -> Self {
        Self::Fields(value)
    }
}

/// Engine-native write parameters.
///
/// Serialized with the engine's own field names so callers can pass them as
/// raw JSON; unrecognised keys are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteParams {
    #[serde(
        rename = "ConditionExpression",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub condition_expression: Option<String>,
    #[serde(
        rename = "ExpressionAttributeNames",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub expression_attribute_names: BTreeMap<String, String>,
    #[serde(
        rename = "ExpressionAttributeValues",
        default,
        skip_serializing_if = "Document::is_empty"
    )]
    pub expression_attribute_values: Document,
    #[serde(flatten)]
    pub extra: Document,
}

impl WriteParams {
    /// Condition expression, treating an empty string as absent.
    pub fn condition(&self) -> Option<&str> {
        self.condition_expression
            .as_deref()
            .filter(|expression| !expression.trim().is_empty())
    }
}

/// Provider-native item; unwrap with `to_json()`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredItem {
    table: String,
    attrs: Document,
}

impl StoredItem {
    pub fn new(table: impl Into<String>, attrs: Document) -> Self {
        Self {
            table: table.into(),
            attrs,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attrs.get(field)
    }

    pub fn attrs(&self) -> &Document {
        &self.attrs
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.attrs.clone())
    }

    pub fn into_attrs(self) -> Document {
        self.attrs
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryPage {
    pub items: Vec<StoredItem>,
    pub count: usize,
    pub scanned_count: usize,
    /// Present when the page was cut by a limit.
    pub last_evaluated_key: Option<Document>,
}

/// Raw engine response, before result formatting.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineResult {
    Empty,
    Item(StoredItem),
    Items(Vec<StoredItem>),
    Page(QueryPage),
    /// Already plain data.
    Plain(Value),
}

/// Storage engine operations used by the catalog and façades.
pub trait StorageEngine: Send + Sync {
    /// Registers (or re-registers) a table definition.
    fn define_table(&self, table: &TableSpec) -> StorageResult<()>;

    fn get_item(
        &self,
        table: &TableSpec,
        key: &ItemKey,
        params: &EngineParams,
    ) -> StorageResult<EngineResult>;

    fn batch_get(
        &self,
        table: &TableSpec,
        keys: &[ItemKey],
        params: &EngineParams,
    ) -> StorageResult<EngineResult>;

    /// Stores `item`, replacing any existing item with the same key.
    fn put_item(
        &self,
        table: &TableSpec,
        item: &Document,
        params: &WriteParams,
    ) -> StorageResult<EngineResult>;

    /// Merges `item` into the stored item with the same key.
    fn update_item(
        &self,
        table: &TableSpec,
        item: &Document,
        params: &WriteParams,
    ) -> StorageResult<EngineResult>;

    fn delete_item(
        &self,
        table: &TableSpec,
        key: &ItemKey,
        params: &WriteParams,
    ) -> StorageResult<EngineResult>;

    fn query(&self, table: &TableSpec, request: &QueryRequest) -> StorageResult<EngineResult>;
}

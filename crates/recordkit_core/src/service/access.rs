//! Read façade.
//!
//! # Responsibility
//! - Resolve key input against the model's table and read items.
//! - Translate `QueryOptions` into a `Query` and execute it.
//!
//! # Invariants
//! - Query options are applied in one fixed order regardless of how the
//!   caller built them.
//! - Engine errors are returned unchanged.

use super::log_outcome;
use super::options::{AccessOptions, QueryOptions};
use crate::error::{value_kind, InputError, RecordResult};
use crate::format::{format_result, Formatted, ResultFormat};
use crate::model::Document;
use crate::registry::Catalog;
use crate::storage::query::{Query, RangeOperation, SortOrder};
use crate::storage::{IndexSpec, ItemKey, KeyInput, TableSpec};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

const MODULE: &str = "access";

pub struct AccessService {
    catalog: Arc<Catalog>,
}

impl AccessService {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Reads one item by key; missing items format to `Empty`/`null`.
    pub fn get_item(
        &self,
        model: &str,
        key: impl Into<KeyInput>,
        options: Option<AccessOptions>,
    ) -> RecordResult<Formatted> {
        let started_at = Instant::now();
        let result = self.read_one(model, key.into(), options.unwrap_or_default());
        log_outcome(MODULE, "get_item", model, started_at, &result);
        result
    }

    /// Reads one item of a hash+range model.
    pub fn get_item_by_range_key(
        &self,
        model: &str,
        hash: impl Into<Value>,
        range: impl Into<Value>,
        options: Option<AccessOptions>,
    ) -> RecordResult<Formatted> {
        let started_at = Instant::now();
        let key = KeyInput::HashRange(hash.into(), range.into());
        let result = self.read_one(model, key, options.unwrap_or_default());
        log_outcome(MODULE, "get_item_by_range_key", model, started_at, &result);
        result
    }

    /// Batch read. Without an explicit format the items list is returned.
    pub fn get_items<I, K>(
        &self,
        model: &str,
        keys: I,
        options: Option<AccessOptions>,
    ) -> RecordResult<Formatted>
    where
        I: IntoIterator<Item = K>,
        K: Into<KeyInput>,
    {
        let started_at = Instant::now();
        let keys: Vec<KeyInput> = keys.into_iter().map(Into::into).collect();
        let result = self.read_many(model, &keys, options.unwrap_or_default());
        log_outcome(MODULE, "get_items", model, started_at, &result);
        result
    }

    /// Executes a query described by `options` and formats with
    /// `options.format`.
    pub fn query(&self, model: &str, options: &QueryOptions) -> RecordResult<Formatted> {
        let started_at = Instant::now();
        let result = self.run_query(model, options);
        log_outcome(MODULE, "query", model, started_at, &result);
        result
    }

    /// Builds the engine query for `options` without executing it.
    ///
    /// Application order: start key, index, limit, attributes, consistent
    /// read, sort, range filter, select. Zero limits and blank index names
    /// are skipped.
    pub fn build_query(&self, model: &str, options: &QueryOptions) -> RecordResult<Query> {
        let config = self.catalog.get_config(model)?;
        let handle = self.catalog.get_model(model)?;
        let mut query = handle.query(options.key.clone());

        let index = options.index.as_deref().filter(|name| !name.trim().is_empty());
        if let Some(start_key) = &options.start_key {
            let index_spec = index.and_then(|name| handle.table().index(name));
            if let Some(start_key) =
                resolve_start_key(&options.key, start_key, handle.table(), index_spec)?
            {
                query.start_key(start_key);
            }
        }
        if let Some(index) = index {
            query.using_index(index);
        }
        if let Some(limit) = options.limit.filter(|limit| *limit > 0) {
            query.limit(limit);
        }
        if let Some(attributes) = &options.attributes {
            query.attributes(attributes.clone());
        }
        if options.consistent_read == Some(true) {
            query.consistent_read(true);
        }
        match options.sort {
            Some(SortOrder::Ascending) => {
                query.ascending();
            }
            Some(SortOrder::Descending) => {
                query.descending();
            }
            None => {}
        }
        if let Some(range) = &options.range_key {
            if let (Some(operation), Some(value)) = (range.operation, &range.value) {
                let field = range
                    .name
                    .as_deref()
                    .or(config.range_key())
                    .ok_or_else(|| {
                        InputError::InvalidKey(format!(
                            "model `{model}` has no range key to filter on"
                        ))
                    })?;
                apply_range(&mut query, field, operation, value)?;
            }
        }
        if let Some(select) = options.select {
            query.select(select);
        }

        Ok(query)
    }

    fn read_one(
        &self,
        model: &str,
        key: KeyInput,
        options: AccessOptions,
    ) -> RecordResult<Formatted> {
        let handle = self.catalog.get_model(model)?;
        let key = key.resolve(handle.table())?;
        let result = handle.get(&key, &options.params)?;
        Ok(format_result(options.format.as_ref(), result))
    }

    fn read_many(
        &self,
        model: &str,
        keys: &[KeyInput],
        options: AccessOptions,
    ) -> RecordResult<Formatted> {
        let handle = self.catalog.get_model(model)?;
        let keys = keys
            .iter()
            .map(|key| key.resolve(handle.table()))
            .collect::<Result<Vec<ItemKey>, _>>()?;
        let result = handle.get_items(&keys, &options.params)?;
        let format = options.format.unwrap_or(ResultFormat::Items);
        Ok(format_result(Some(&format), result))
    }

    fn run_query(&self, model: &str, options: &QueryOptions) -> RecordResult<Formatted> {
        let query = self.build_query(model, options)?;
        let handle = self.catalog.get_model(model)?;
        let result = handle.exec(query.request())?;
        Ok(format_result(options.format.as_ref(), result))
    }
}

/// Turns a caller start key into the engine's exclusive start key.
///
/// Objects pass through; a bare scalar is the range value within the
/// queried partition (or the hash value on hash-only tables). On index
/// queries the scalar is resolved against the index keys.
fn resolve_start_key(
    hash: &Value,
    start_key: &Value,
    table: &TableSpec,
    index: Option<&IndexSpec>,
) -> RecordResult<Option<Document>> {
    let key = match start_key {
        Value::Null => return Ok(None),
        Value::Object(fields) => fields.clone(),
        Value::Array(_) => {
            return Err(InputError::InvalidKey(format!(
                "start key must be an object or scalar, got {}",
                value_kind(start_key)
            ))
            .into())
        }
        scalar => {
            if let Some(index) = index {
                let mut key = Document::new();
                match &index.range_key {
                    Some(range_key) => {
                        key.insert(index.hash_key.clone(), hash.clone());
                        key.insert(range_key.clone(), scalar.clone());
                    }
                    None => {
                        key.insert(index.hash_key.clone(), scalar.clone());
                    }
                }
                return Ok(Some(key));
            }
            let key = match &table.range_key {
                Some(_) => ItemKey {
                    hash: hash.clone(),
                    range: Some(scalar.clone()),
                },
                None => ItemKey {
                    hash: scalar.clone(),
                    range: None,
                },
            };
            key.to_document(table)
        }
    };
    Ok(Some(key))
}

fn apply_range(
    query: &mut Query,
    field: &str,
    operation: RangeOperation,
    value: &Value,
) -> RecordResult<()> {
    let clause = query.where_range(field);
    match operation {
        RangeOperation::Gte => {
            clause.gte(value.clone());
        }
        RangeOperation::Gt => {
            clause.gt(value.clone());
        }
        RangeOperation::Lt => {
            clause.lt(value.clone());
        }
        RangeOperation::Lte => {
            clause.lte(value.clone());
        }
        RangeOperation::Equals => {
            clause.equals(value.clone());
        }
        RangeOperation::BeginsWith => {
            let prefix = value.as_str().ok_or_else(|| {
                InputError::InvalidKey(format!(
                    "beginsWith expects a string, got {}",
                    value_kind(value)
                ))
            })?;
            clause.begins_with(prefix);
        }
        RangeOperation::Between => match value.as_array().map(Vec::as_slice) {
            Some([low, high]) => {
                clause.between(low.clone(), high.clone());
            }
            _ => {
                return Err(InputError::InvalidKey(
                    "between expects a two-element array [low, high]".to_string(),
                )
                .into())
            }
        },
    }
    Ok(())
}

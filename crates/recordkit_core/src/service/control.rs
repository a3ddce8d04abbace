//! Write façade.
//!
//! # Responsibility
//! - Run every write payload through the record pipeline.
//! - Synthesize key conditions for `create` and `update`.
//! - Apply the opt-in uniqueness guard on `create`.
//!
//! # Invariants
//! - A pipeline error or guard hit returns before any storage call.
//! - `put` and `destroy` send only the caller's params.
//! - The guard never replaces the engine's conditional check.

use super::condition::{apply_key_condition, KeyComparison};
use super::log_outcome;
use super::options::{CreateOptions, WriteOptions};
use crate::config::GuardConfig;
use crate::error::{ConflictError, RecordResult};
use crate::format::{format_result, Formatted};
use crate::guard::{guard_token, GuardCache, TtlGuardCache};
use crate::model::record::{Payload, Record, RecordScope};
use crate::model::Document;
use crate::registry::{Catalog, ModelEntry};
use crate::storage::KeyInput;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

const MODULE: &str = "control";
const CREATE_OPERATION: &str = "create";

pub struct ControlService {
    catalog: Arc<Catalog>,
    guard: Arc<dyn GuardCache>,
    guard_config: GuardConfig,
}

impl ControlService {
    /// Uses an in-process TTL guard with the default expiry.
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self::with_guard(catalog, Arc::new(TtlGuardCache::new()), GuardConfig::default())
    }

    pub fn with_guard(
        catalog: Arc<Catalog>,
        guard: Arc<dyn GuardCache>,
        guard_config: GuardConfig,
    ) -> Self {
        Self {
            catalog,
            guard,
            guard_config,
        }
    }

    /// Inserts a new item.
    ///
    /// Without an explicit condition the write is insert-only on the
    /// model's key fields, or on `options.keys` when those are given. Keys
    /// in `options.keys` are also checked against the uniqueness guard.
    ///
    /// # Errors
    /// - `Conflict` when a guarded key is still in creating state.
    /// - `Storage(ConditionalCheckFailed)` when the key already exists.
    pub fn create(
        &self,
        model: &str,
        data: impl Into<Payload>,
        options: Option<CreateOptions>,
    ) -> RecordResult<Formatted> {
        let started_at = Instant::now();
        let result = self.run_create(model, data.into(), options.unwrap_or_default());
        log_outcome(MODULE, "record_create", model, started_at, &result);
        result
    }

    /// Partially updates an existing item; by default the stored item must
    /// match the payload's key fields.
    pub fn update(
        &self,
        model: &str,
        data: impl Into<Payload>,
        options: Option<WriteOptions>,
    ) -> RecordResult<Formatted> {
        let started_at = Instant::now();
        let result = self.run_update(model, data.into(), options.unwrap_or_default());
        log_outcome(MODULE, "record_update", model, started_at, &result);
        result
    }

    /// Creates or replaces an item without key condition or guard.
    pub fn put(
        &self,
        model: &str,
        data: impl Into<Payload>,
        options: Option<WriteOptions>,
    ) -> RecordResult<Formatted> {
        let started_at = Instant::now();
        let result = self.run_put(model, data.into(), options.unwrap_or_default());
        log_outcome(MODULE, "record_put", model, started_at, &result);
        result
    }

    /// Deletes by key. Keys are not validated beyond shape.
    pub fn destroy(
        &self,
        model: &str,
        key: impl Into<KeyInput>,
        options: Option<WriteOptions>,
    ) -> RecordResult<Formatted> {
        let started_at = Instant::now();
        let result = self.run_destroy(model, key.into(), options.unwrap_or_default());
        log_outcome(MODULE, "record_destroy", model, started_at, &result);
        result
    }

    fn run_create(
        &self,
        model: &str,
        payload: Payload,
        options: CreateOptions,
    ) -> RecordResult<Formatted> {
        let entry = self.catalog.entry(model)?;
        let data = prepare(&entry, payload, RecordScope::Create)?;
        let CreateOptions {
            format,
            mut params,
            keys,
        } = options;

        let condition_fields = match keys.filter(|keys| !keys.is_empty()) {
            Some(keys) => {
                self.claim_guard(entry.name(), &keys, &data)?;
                keys
            }
            None => entry.config().key_fields(),
        };
        apply_key_condition(
            &mut params,
            KeyComparison::NotEqual,
            &condition_fields,
            &data,
        );

        let result = entry.handle().create(&data, &params)?;
        Ok(format_result(format.as_ref(), result))
    }

    fn run_update(
        &self,
        model: &str,
        payload: Payload,
        options: WriteOptions,
    ) -> RecordResult<Formatted> {
        let entry = self.catalog.entry(model)?;
        let data = prepare(&entry, payload, RecordScope::Update)?;
        let WriteOptions { format, mut params } = options;

        apply_key_condition(
            &mut params,
            KeyComparison::Equal,
            &entry.config().key_fields(),
            &data,
        );

        let result = entry.handle().update(&data, &params)?;
        Ok(format_result(format.as_ref(), result))
    }

    fn run_put(
        &self,
        model: &str,
        payload: Payload,
        options: WriteOptions,
    ) -> RecordResult<Formatted> {
        let entry = self.catalog.entry(model)?;
        let data = prepare(&entry, payload, RecordScope::Create)?;
        let result = entry.handle().create(&data, &options.params)?;
        Ok(format_result(options.format.as_ref(), result))
    }

    fn run_destroy(
        &self,
        model: &str,
        key: KeyInput,
        options: WriteOptions,
    ) -> RecordResult<Formatted> {
        let handle = self.catalog.get_model(model)?;
        let key = key.resolve(handle.table())?;
        let result = handle.destroy(&key, &options.params)?;
        Ok(format_result(options.format.as_ref(), result))
    }

    /// Rejects the create if any guarded key is live, then marks all of
    /// them for the configured TTL.
    fn claim_guard(&self, model: &str, keys: &[String], data: &Document) -> RecordResult<()> {
        let mut tokens = Vec::with_capacity(keys.len());
        for field in keys {
            let value = data.get(field).cloned().unwrap_or(Value::Null);
            let token = guard_token(CREATE_OPERATION, model, field, &value);
            if self.guard.is_live(&token) {
                return Err(ConflictError {
                    model: model.to_string(),
                    field: field.clone(),
                    value,
                }
                .into());
            }
            tokens.push(token);
        }

        for token in &tokens {
            self.guard.mark(token, self.guard_config.ttl);
        }
        Ok(())
    }
}

/// normalize then validate; returns the data to store.
fn prepare(entry: &ModelEntry, payload: Payload, scope: RecordScope) -> RecordResult<Document> {
    let record = Record::create(entry.record_config(), payload, scope)?
        .normalize()?
        .validate()?;
    Ok(record.into_data())
}

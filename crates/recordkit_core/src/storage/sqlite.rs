//! SQLite-backed storage engine.
//!
//! # Responsibility
//! - Persist items as JSON documents keyed by `(table, hash, range)`.
//! - Evaluate condition expressions inside the write transaction.
//! - Execute partition queries with range filters, ordering and paging.
//!
//! # Invariants
//! - Key columns hold canonical JSON of the key value; an absent range key
//!   is stored as the empty string.
//! - A failed condition leaves the stored item untouched.

use super::condition::{compare_values, Comparator, Condition};
use super::query::{QueryRequest, RangeCondition, RangeFilter, SelectMode, SortOrder};
use super::{
    EngineParams, EngineResult, ItemKey, QueryPage, StorageEngine, StorageError, StorageResult,
    StoredItem, TableSpec, WriteParams,
};
use crate::db::{open_db, open_db_in_memory};
use crate::error::value_kind;
use crate::model::Document;
use log::debug;
use rusqlite::{params, Connection};
use serde_json::Value;
use std::cmp::Ordering;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const ATTRIBUTES_TO_GET: &str = "AttributesToGet";

/// Reference engine over one SQLite connection.
pub struct SqliteEngine {
    conn: Mutex<Connection>,
}

impl SqliteEngine {
    /// Wraps a connection that already has migrations applied.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("sqlite connection lock poisoned".to_string()))
    }

    fn conditional_write(
        &self,
        table: &TableSpec,
        key: &ItemKey,
        params: &WriteParams,
        write: impl FnOnce(&Connection, Option<Document>) -> StorageResult<EngineResult>,
    ) -> StorageResult<EngineResult> {
        let condition = Condition::from_params(params)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let existing = load_item(&tx, table, key)?;
        if !condition.evaluate(existing.as_ref()) {
            debug!(
                "event=engine_write module=storage status=condition_failed table={}",
                table.name
            );
            return Err(StorageError::ConditionalCheckFailed {
                table: table.name.clone(),
            });
        }

        let result = write(&tx, existing)?;
        tx.commit()?;
        Ok(result)
    }
}

impl StorageEngine for SqliteEngine {
    fn define_table(&self, table: &TableSpec) -> StorageResult<()> {
        table.validate()?;
        let spec = serde_json::to_string(table)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO model_tables (name, hash_key, range_key, spec)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET
                hash_key = excluded.hash_key,
                range_key = excluded.range_key,
                spec = excluded.spec;",
            params![table.name, table.hash_key, table.range_key, spec],
        )?;
        debug!(
            "event=engine_define module=storage status=ok table={} indexes={}",
            table.name,
            table.indexes.len()
        );
        Ok(())
    }

    fn get_item(
        &self,
        table: &TableSpec,
        key: &ItemKey,
        params: &EngineParams,
    ) -> StorageResult<EngineResult> {
        let conn = self.lock()?;
        let attributes = requested_attributes(params);
        Ok(match load_item(&conn, table, key)? {
            Some(item) => EngineResult::Item(StoredItem::new(
                table.name.as_str(),
                project(item, attributes.as_deref()),
            )),
            None => EngineResult::Empty,
        })
    }

    fn batch_get(
        &self,
        table: &TableSpec,
        keys: &[ItemKey],
        params: &EngineParams,
    ) -> StorageResult<EngineResult> {
        let conn = self.lock()?;
        let attributes = requested_attributes(params);
        let mut items = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(item) = load_item(&conn, table, key)? {
                items.push(StoredItem::new(
                    table.name.as_str(),
                    project(item, attributes.as_deref()),
                ));
            }
        }
        debug!(
            "event=engine_batch_get module=storage status=ok table={} requested={} found={}",
            table.name,
            keys.len(),
            items.len()
        );
        Ok(EngineResult::Items(items))
    }

    fn put_item(
        &self,
        table: &TableSpec,
        item: &Document,
        params: &WriteParams,
    ) -> StorageResult<EngineResult> {
        let key = ItemKey::from_item(table, item)?;
        self.conditional_write(table, &key, params, |conn, _existing| {
            store_item(conn, table, &key, item)?;
            Ok(EngineResult::Item(StoredItem::new(
                table.name.as_str(),
                item.clone(),
            )))
        })
    }

    fn update_item(
        &self,
        table: &TableSpec,
        item: &Document,
        params: &WriteParams,
    ) -> StorageResult<EngineResult> {
        let key = ItemKey::from_item(table, item)?;
        let key_fields = table.key_fields();
        self.conditional_write(table, &key, params, |conn, existing| {
            let mut merged = existing.unwrap_or_default();
            for (field, value) in item {
                if value.is_null() && !key_fields.contains(field) {
                    merged.remove(field);
                } else {
                    merged.insert(field.clone(), value.clone());
                }
            }
            store_item(conn, table, &key, &merged)?;
            Ok(EngineResult::Item(StoredItem::new(table.name.as_str(), merged)))
        })
    }

    fn delete_item(
        &self,
        table: &TableSpec,
        key: &ItemKey,
        params: &WriteParams,
    ) -> StorageResult<EngineResult> {
        self.conditional_write(table, key, params, |conn, existing| match existing {
            Some(item) => {
                remove_item(conn, table, key)?;
                Ok(EngineResult::Item(StoredItem::new(table.name.as_str(), item)))
            }
            None => Ok(EngineResult::Empty),
        })
    }

    fn query(&self, table: &TableSpec, request: &QueryRequest) -> StorageResult<EngineResult> {
        let (candidates, sort_field) = {
            let conn = self.lock()?;
            match &request.index {
                Some(name) => {
                    let index = table.index(name).ok_or_else(|| StorageError::UnknownIndex {
                        table: table.name.clone(),
                        index: name.clone(),
                    })?;
                    let rows = load_rows(&conn, table, None)?
                        .into_iter()
                        .filter(|item| {
                            Comparator::Eq.holds(item.get(&index.hash_key), &request.hash_key)
                        })
                        .collect::<Vec<_>>();
                    (rows, index.range_key.clone())
                }
                None => {
                    let hash = encode_key(&request.hash_key)?;
                    (load_rows(&conn, table, Some(&hash))?, table.range_key.clone())
                }
            }
        };

        let mut matched = candidates
            .into_iter()
            .filter(|item| match &request.range {
                Some(filter) => range_matches(filter, item.get(&filter.field)),
                None => true,
            })
            .collect::<Vec<_>>();

        let sort_field = sort_field.as_deref();
        matched.sort_by(|left, right| {
            compare_order_keys(
                &order_key(left, sort_field, table),
                &order_key(right, sort_field, table),
            )
        });
        if request.order == SortOrder::Descending {
            matched.reverse();
        }

        if let Some(start) = &request.start_key {
            let start_key = order_key(start, sort_field, table);
            let wanted = match request.order {
                SortOrder::Ascending => Ordering::Greater,
                SortOrder::Descending => Ordering::Less,
            };
            matched.retain(|item| {
                compare_to_start(&order_key(item, sort_field, table), &start_key) == wanted
            });
        }

        let scanned_count = matched.len();
        let mut last_evaluated_key = None;
        if let Some(limit) = request.limit {
            if matched.len() > limit {
                matched.truncate(limit);
                last_evaluated_key = matched
                    .last()
                    .map(|item| page_key(item, table, request.index.as_deref()));
            }
        }

        let count = matched.len();
        let items = if request.select == Some(SelectMode::Count) {
            Vec::new()
        } else {
            matched
                .into_iter()
                .map(|item| {
                    StoredItem::new(
                        table.name.as_str(),
                        project(item, request.attributes.as_deref()),
                    )
                })
                .collect()
        };

        debug!(
            "event=engine_query module=storage status=ok table={} index={} count={} scanned={}",
            table.name,
            request.index.as_deref().unwrap_or("-"),
            count,
            scanned_count
        );

        Ok(EngineResult::Page(QueryPage {
            items,
            count,
            scanned_count,
            last_evaluated_key,
        }))
    }
}

fn encode_key(value: &Value) -> StorageResult<String> {
    Ok(serde_json::to_string(value)?)
}

fn range_column(key: &ItemKey) -> StorageResult<String> {
    match &key.range {
        Some(range) => encode_key(range),
        None => Ok(String::new()),
    }
}

fn decode_body(body: &str) -> StorageResult<Document> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(item) => Ok(item),
        other => Err(StorageError::InvalidData(format!(
            "item body must be an object, got {}",
            value_kind(&other)
        ))),
    }
}

fn load_item(
    conn: &Connection,
    table: &TableSpec,
    key: &ItemKey,
) -> StorageResult<Option<Document>> {
    let mut stmt = conn.prepare_cached(
        "SELECT body FROM items
         WHERE table_name = ?1 AND hash_value = ?2 AND range_value = ?3;",
    )?;
    let mut rows = stmt.query(params![table.name, encode_key(&key.hash)?, range_column(key)?])?;
    match rows.next()? {
        Some(row) => Ok(Some(decode_body(&row.get::<_, String>(0)?)?)),
        None => Ok(None),
    }
}

fn load_rows(conn: &Connection, table: &TableSpec, hash: Option<&str>) -> StorageResult<Vec<Document>> {
    let mut stmt = conn.prepare_cached(
        "SELECT body FROM items
         WHERE table_name = ?1 AND (?2 IS NULL OR hash_value = ?2);",
    )?;
    let mut rows = stmt.query(params![table.name, hash])?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(decode_body(&row.get::<_, String>(0)?)?);
    }
    Ok(items)
}

fn store_item(
    conn: &Connection,
    table: &TableSpec,
    key: &ItemKey,
    item: &Document,
) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO items (table_name, hash_value, range_value, body)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(table_name, hash_value, range_value) DO UPDATE SET
            body = excluded.body,
            updated_at = (strftime('%s', 'now') * 1000);",
        params![
            table.name,
            encode_key(&key.hash)?,
            range_column(key)?,
            serde_json::to_string(item)?,
        ],
    )?;
    Ok(())
}

fn remove_item(conn: &Connection, table: &TableSpec, key: &ItemKey) -> StorageResult<()> {
    conn.execute(
        "DELETE FROM items WHERE table_name = ?1 AND hash_value = ?2 AND range_value = ?3;",
        params![table.name, encode_key(&key.hash)?, range_column(key)?],
    )?;
    Ok(())
}

fn requested_attributes(params: &EngineParams) -> Option<Vec<String>> {
    params
        .get(ATTRIBUTES_TO_GET)
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
}

fn project(item: Document, attributes: Option<&[String]>) -> Document {
    match attributes {
        Some(attributes) => item
            .into_iter()
            .filter(|(field, _)| attributes.contains(field))
            .collect(),
        None => item,
    }
}

fn range_matches(filter: &RangeFilter, value: Option<&Value>) -> bool {
    let Some(value) = value else {
        return false;
    };
    match &filter.condition {
        RangeCondition::Gte(operand) => Comparator::Ge.holds(Some(value), operand),
        RangeCondition::Gt(operand) => Comparator::Gt.holds(Some(value), operand),
        RangeCondition::Lt(operand) => Comparator::Lt.holds(Some(value), operand),
        RangeCondition::Lte(operand) => Comparator::Le.holds(Some(value), operand),
        RangeCondition::Equals(operand) => Comparator::Eq.holds(Some(value), operand),
        RangeCondition::BeginsWith(prefix) => value
            .as_str()
            .is_some_and(|text| text.starts_with(prefix.as_str())),
        RangeCondition::Between(low, high) => {
            Comparator::Ge.holds(Some(value), low) && Comparator::Le.holds(Some(value), high)
        }
    }
}

/// Sort value, then primary key, so ordering is total within a partition.
fn order_key<'a>(
    item: &'a Document,
    sort_field: Option<&str>,
    table: &TableSpec,
) -> [Option<&'a Value>; 3] {
    [
        sort_field.and_then(|field| item.get(field)),
        item.get(&table.hash_key),
        table.range_key.as_deref().and_then(|field| item.get(field)),
    ]
}

fn compare_order_keys(left: &[Option<&Value>; 3], right: &[Option<&Value>; 3]) -> Ordering {
    for (left, right) in left.iter().zip(right.iter()) {
        let ordering = match (left, right) {
            (Some(left), Some(right)) => compare_values(left, right),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Like `compare_order_keys`, but parts missing from the start key are
/// skipped, so a partial start key excludes every item sharing its prefix.
fn compare_to_start(item: &[Option<&Value>; 3], start: &[Option<&Value>; 3]) -> Ordering {
    for (item, start) in item.iter().zip(start.iter()) {
        let Some(start) = start else {
            continue;
        };
        let ordering = match item {
            Some(item) => compare_values(item, start),
            None => Ordering::Less,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Primary key plus index key fields of `item`, for `LastEvaluatedKey`.
fn page_key(item: &Document, table: &TableSpec, index: Option<&str>) -> Document {
    let mut fields = table.key_fields();
    if let Some(index) = index.and_then(|name| table.index(name)) {
        fields.push(index.hash_key.clone());
        fields.extend(index.range_key.clone());
    }
    fields
        .into_iter()
        .filter_map(|field| item.get(&field).cloned().map(|value| (field, value)))
        .collect()
}

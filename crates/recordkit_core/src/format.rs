//! Result shaping for façade responses.
//!
//! # Responsibility
//! - Turn raw engine results into the shape the caller asked for.
//!
//! # Invariants
//! - No format (or `model`) returns the engine result untouched.
//! - Unwrapping already plain data is a no-op.

use crate::storage::{EngineResult, QueryPage};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::convert::Infallible;
use std::str::FromStr;

const ITEMS_FIELD: &str = "Items";

/// Requested output shape.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ResultFormat {
    /// Raw engine result.
    Model,
    /// The items collection.
    Items,
    /// First element of the items collection, or `null`.
    First,
    /// Any other name: plain data, otherwise unchanged.
    Other(String),
}

impl FromStr for ResultFormat {
    type Err = Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "model" => Self::Model,
            "items" => Self::Items,
            "first" => Self::First,
            other => Self::Other(other.to_string()),
        })
    }
}

impl From<String> for ResultFormat {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(format) => format,
            Err(never) => match never {},
        }
    }
}

impl From<&str> for ResultFormat {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

/// Formatted façade response.
#[derive(Debug, Clone, PartialEq)]
pub enum Formatted {
    /// Engine result passed through untouched.
    Model(EngineResult),
    /// Plain data after unwrapping.
    Data(Value),
}

impl Formatted {
    /// Plain data view; a pass-through engine result is unwrapped first.
    pub fn into_value(self) -> Value {
        match self {
            Self::Model(result) => unwrap_result(result),
            Self::Data(value) => value,
        }
    }

    pub fn as_model(&self) -> Option<&EngineResult> {
        match self {
            Self::Model(result) => Some(result),
            Self::Data(_) => None,
        }
    }

    pub fn as_data(&self) -> Option<&Value> {
        match self {
            Self::Model(_) => None,
            Self::Data(value) => Some(value),
        }
    }
}

/// Applies `format` to a raw engine result.
pub fn format_result(format: Option<&ResultFormat>, result: EngineResult) -> Formatted {
    let format = match format {
        None | Some(ResultFormat::Model) => return Formatted::Model(result),
        Some(format) => format,
    };

    let data = unwrap_result(result);
    Formatted::Data(match format {
        ResultFormat::Items => take_items(data),
        ResultFormat::First => take_first(data),
        _ => data,
    })
}

/// Converts provider-native items (including inside lists and pages) to
/// plain JSON.
pub fn unwrap_result(result: EngineResult) -> Value {
    match result {
        EngineResult::Empty => Value::Null,
        EngineResult::Item(item) => Value::Object(item.into_attrs()),
        EngineResult::Items(items) => Value::Array(
            items
                .into_iter()
                .map(|item| Value::Object(item.into_attrs()))
                .collect(),
        ),
        EngineResult::Page(page) => page_to_value(page),
        EngineResult::Plain(value) => value,
    }
}

fn page_to_value(page: QueryPage) -> Value {
    let mut map = Map::new();
    map.insert(
        ITEMS_FIELD.to_string(),
        Value::Array(
            page.items
                .into_iter()
                .map(|item| Value::Object(item.into_attrs()))
                .collect(),
        ),
    );
    map.insert("Count".to_string(), Value::from(page.count));
    map.insert("ScannedCount".to_string(), Value::from(page.scanned_count));
    if let Some(key) = page.last_evaluated_key {
        map.insert("LastEvaluatedKey".to_string(), Value::Object(key));
    }
    Value::Object(map)
}

fn take_items(data: Value) -> Value {
    match data {
        Value::Object(mut map) => match map.remove(ITEMS_FIELD) {
            Some(items) => items,
            None => Value::Object(map),
        },
        other => other,
    }
}

fn take_first(data: Value) -> Value {
    match take_items(data) {
        Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
        other => other,
    }
}

//! Per-operation option structs.
//!
//! Every struct enumerates the fields it understands; building one from JSON
//! with an unrecognised field fails with `RecordError::InvalidOptions`.

use crate::error::{RecordError, RecordResult};
use crate::format::ResultFormat;
use crate::storage::query::{RangeOperation, SelectMode, SortOrder};
use crate::storage::{EngineParams, WriteParams};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

fn from_json<T: DeserializeOwned>(value: Value) -> RecordResult<T> {
    serde_json::from_value(value).map_err(|err| RecordError::InvalidOptions(err.to_string()))
}

/// Options for key reads.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessOptions {
    pub format: Option<ResultFormat>,
    /// Engine-native read params, e.g. `AttributesToGet`.
    pub params: EngineParams,
}

impl AccessOptions {
    pub fn from_json(value: Value) -> RecordResult<Self> {
        from_json(value)
    }

    pub fn with_format(mut self, format: impl Into<ResultFormat>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_params(mut self, params: EngineParams) -> Self {
        self.params = params;
        self
    }
}

/// Options for `create`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateOptions {
    pub format: Option<ResultFormat>,
    pub params: WriteParams,
    /// Fields to uniqueness-guard; when non-empty they also replace the
    /// model's key fields in the synthesized condition. Empty means off.
    pub keys: Option<Vec<String>>,
}

impl CreateOptions {
    pub fn from_json(value: Value) -> RecordResult<Self> {
        from_json(value)
    }

    pub fn with_format(mut self, format: impl Into<ResultFormat>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_params(mut self, params: WriteParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }
}

/// Options for `update`, `put` and `destroy`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WriteOptions {
    pub format: Option<ResultFormat>,
    pub params: WriteParams,
}

impl WriteOptions {
    pub fn from_json(value: Value) -> RecordResult<Self> {
        from_json(value)
    }

    pub fn with_format(mut self, format: impl Into<ResultFormat>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_params(mut self, params: WriteParams) -> Self {
        self.params = params;
        self
    }
}

/// Range-key filter inside `QueryOptions`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RangeKeyOptions {
    /// Defaults to the model's range key.
    pub name: Option<String>,
    pub operation: Option<RangeOperation>,
    /// For `between`, a two-element array `[low, high]`. An explicit
    /// `null` is kept as `Some(Value::Null)`; only an absent value is `None`.
    #[serde(deserialize_with = "present_value")]
    pub value: Option<Value>,
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Declarative query description.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QueryOptions {
    /// Hash-key value of the partition to query.
    pub key: Value,
    /// Pagination key: a previous `LastEvaluatedKey` or a bare range value.
    #[serde(default)]
    pub start_key: Option<Value>,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub attributes: Option<Vec<String>>,
    #[serde(default)]
    pub consistent_read: Option<bool>,
    #[serde(default)]
    pub sort: Option<SortOrder>,
    #[serde(default)]
    pub range_key: Option<RangeKeyOptions>,
    #[serde(default)]
    pub select: Option<SelectMode>,
    #[serde(default)]
    pub format: Option<ResultFormat>,
}

impl QueryOptions {
    pub fn new(key: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            start_key: None,
            index: None,
            limit: None,
            attributes: None,
            consistent_read: None,
            sort: None,
            range_key: None,
            select: None,
            format: None,
        }
    }

    pub fn from_json(value: Value) -> RecordResult<Self> {
        from_json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessOptions, CreateOptions, QueryOptions};
    use crate::error::RecordError;
    use crate::format::ResultFormat;
    use crate::storage::query::{RangeOperation, SortOrder};
    use serde_json::{json, Value};

    #[test]
    fn unknown_option_fields_are_rejected() {
        let err = AccessOptions::from_json(json!({ "format": "first", "omit": ["a"] })).unwrap_err();
        assert!(matches!(err, RecordError::InvalidOptions(ref message) if message.contains("omit")));

        let err = QueryOptions::from_json(json!({ "key": "x", "order": "descending" })).unwrap_err();
        assert!(matches!(err, RecordError::InvalidOptions(_)));
    }

    #[test]
    fn query_options_use_camel_case_names() {
        let options = QueryOptions::from_json(json!({
            "key": "user-1",
            "startKey": { "id": "user-1", "sort": 3 },
            "consistentRead": true,
            "sort": "descending",
            "rangeKey": { "operation": "beginsWith", "value": "2024-" },
            "format": "items"
        }))
        .unwrap();

        assert_eq!(options.consistent_read, Some(true));
        assert_eq!(options.sort, Some(SortOrder::Descending));
        let range = options.range_key.unwrap();
        assert_eq!(range.operation, Some(RangeOperation::BeginsWith));
        assert_eq!(range.name, None);
        assert_eq!(options.format, Some(ResultFormat::Items));
    }

    #[test]
    fn explicit_null_range_value_is_kept() {
        let options = QueryOptions::from_json(json!({
            "key": "u1",
            "rangeKey": { "operation": "equals", "value": null }
        }))
        .unwrap();
        assert_eq!(options.range_key.unwrap().value, Some(Value::Null));

        let options = QueryOptions::from_json(json!({
            "key": "u1",
            "rangeKey": { "operation": "equals" }
        }))
        .unwrap();
        assert_eq!(options.range_key.unwrap().value, None);
    }

    #[test]
    fn create_options_carry_engine_params() {
        let options = CreateOptions::from_json(json!({
            "params": { "ConditionExpression": "attribute_not_exists(#id)" },
            "keys": []
        }))
        .unwrap();
        assert_eq!(
            options.params.condition(),
            Some("attribute_not_exists(#id)")
        );
        assert_eq!(options.keys, Some(Vec::new()));
    }
}

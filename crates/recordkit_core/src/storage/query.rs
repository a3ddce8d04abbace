//! Engine query builder.
//!
//! # Responsibility
//! - Collect query settings through builder calls (`Query`).
//! - Produce the immutable `QueryRequest` an engine executes.
//!
//! # Invariants
//! - Every builder call overwrites only its own setting; the resulting
//!   request does not depend on call order.

use crate::model::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// What a query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectMode {
    AllAttributes,
    AllProjectedAttributes,
    SpecificAttributes,
    /// Count only; the page carries no items.
    Count,
}

/// Range-key operation names accepted by query options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RangeOperation {
    Gte,
    Gt,
    Lt,
    Lte,
    Equals,
    BeginsWith,
    Between,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RangeCondition {
    Gte(Value),
    Gt(Value),
    Lt(Value),
    Lte(Value),
    Equals(Value),
    BeginsWith(String),
    Between(Value, Value),
}

/// Range-key condition bound to a field name.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeFilter {
    pub field: String,
    pub condition: RangeCondition,
}

/// Executable query description.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub hash_key: Value,
    /// Exclusive start key (a previous page's `LastEvaluatedKey`).
    pub start_key: Option<Document>,
    pub index: Option<String>,
    pub limit: Option<usize>,
    pub attributes: Option<Vec<String>>,
    pub consistent_read: bool,
    pub order: SortOrder,
    pub range: Option<RangeFilter>,
    pub select: Option<SelectMode>,
}

/// Builder over `QueryRequest`, scoped to one hash-key partition.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    request: QueryRequest,
}

impl Query {
    pub fn new(hash_key: Value) -> Self {
        Self {
            request: QueryRequest {
                hash_key,
                start_key: None,
                index: None,
                limit: None,
                attributes: None,
                consistent_read: false,
                order: SortOrder::Ascending,
                range: None,
                select: None,
            },
        }
    }

    pub fn start_key(&mut self, key: Document) -> &mut Self {
        self.request.start_key = Some(key);
        self
    }

    pub fn using_index(&mut self, name: impl Into<String>) -> &mut Self {
        self.request.index = Some(name.into());
        self
    }

    pub fn limit(&mut self, limit: usize) -> &mut Self {
        self.request.limit = Some(limit);
        self
    }

    pub fn attributes(&mut self, attributes: Vec<String>) -> &mut Self {
        self.request.attributes = Some(attributes);
        self
    }

    pub fn consistent_read(&mut self, enabled: bool) -> &mut Self {
        self.request.consistent_read = enabled;
        self
    }

    pub fn ascending(&mut self) -> &mut Self {
        self.request.order = SortOrder::Ascending;
        self
    }

    pub fn descending(&mut self) -> &mut Self {
        self.request.order = SortOrder::Descending;
        self
    }

    /// Starts a range-key condition on `field`.
    pub fn where_range(&mut self, field: impl Into<String>) -> RangeClause<'_> {
        RangeClause {
            query: self,
            field: field.into(),
        }
    }

    pub fn select(&mut self, mode: SelectMode) -> &mut Self {
        self.request.select = Some(mode);
        self
    }

    pub fn request(&self) -> &QueryRequest {
        &self.request
    }

    pub fn into_request(self) -> QueryRequest {
        self.request
    }
}

/// Pending range-key condition; finish with one operation call.
pub struct RangeClause<'q> {
    query: &'q mut Query,
    field: String,
}

impl<'q> RangeClause<'q> {
    fn finish(self, condition: RangeCondition) -> &'q mut Query {
        self.query.request.range = Some(RangeFilter {
            field: self.field,
            condition,
        });
        self.query
    }

    pub fn gte(self, value: Value) -> &'q mut Query {
        self.finish(RangeCondition::Gte(value))
    }

    pub fn gt(self, value: Value) -> &'q mut Query {
        self.finish(RangeCondition::Gt(value))
    }

    pub fn lt(self, value: Value) -> &'q mut Query {
        self.finish(RangeCondition::Lt(value))
    }

    pub fn lte(self, value: Value) -> &'q mut Query {
        self.finish(RangeCondition::Lte(value))
    }

    pub fn equals(self, value: Value) -> &'q mut Query {
        self.finish(RangeCondition::Equals(value))
    }

    pub fn begins_with(self, prefix: impl Into<String>) -> &'q mut Query {
        self.finish(RangeCondition::BeginsWith(prefix.into()))
    }

    pub fn between(self, low: Value, high: Value) -> &'q mut Query {
        self.finish(RangeCondition::Between(low, high))
    }
}

//! Condition expression parsing and evaluation.
//!
//! # Responsibility
//! - Parse conjunctive condition expressions with `#name` / `:value`
//!   placeholders.
//! - Evaluate them against the currently stored item (if any).
//! - Provide the value ordering shared with query evaluation.
//!
//! # Invariants
//! - A missing attribute is unequal to every value and is never ordered.
//! - Unresolvable placeholders are expression errors, not false conditions.

use super::{StorageError, StorageResult, WriteParams};
use crate::model::Document;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

static AND_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+AND\s+").expect("valid and regex"));
static COMPARE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(#?[A-Za-z0-9_]+)\s*(<>|<=|>=|=|<|>)\s*(:[A-Za-z0-9_]+)\s*$")
        .expect("valid comparison regex")
});
static FUNCTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(attribute_exists|attribute_not_exists)\s*\(\s*(#?[A-Za-z0-9_]+)\s*\)\s*$")
        .expect("valid function regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "=" => Some(Self::Eq),
            "<>" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }

    /// Applies the comparator to a possibly missing attribute.
    pub fn holds(self, attribute: Option<&Value>, operand: &Value) -> bool {
        let Some(attribute) = attribute else {
            return self == Self::Ne;
        };
        if type_rank(attribute) != type_rank(operand) {
            return self == Self::Ne;
        }
        let ordering = compare_values(attribute, operand);
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

/// One clause of a conjunctive condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Compare {
        field: String,
        comparator: Comparator,
        operand: Value,
    },
    Exists(String),
    NotExists(String),
}

/// Parsed condition expression.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Condition {
    clauses: Vec<Clause>,
}

impl Condition {
    /// Parses the condition carried by `params`; absent means always true.
    pub fn from_params(params: &WriteParams) -> StorageResult<Self> {
        match params.condition() {
            Some(expression) => Self::parse(
                expression,
                &params.expression_attribute_names,
                &params.expression_attribute_values,
            ),
            None => Ok(Self::default()),
        }
    }

    pub fn parse(
        expression: &str,
        names: &BTreeMap<String, String>,
        values: &Document,
    ) -> StorageResult<Self> {
        let mut clauses = Vec::new();
        for part in AND_RE.split(expression.trim()) {
            clauses.push(parse_clause(part, names, values)?);
        }
        Ok(Self { clauses })
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn evaluate(&self, existing: Option<&Document>) -> bool {
        self.clauses.iter().all(|clause| {
            let lookup = |field: &str| existing.and_then(|item| item.get(field));
            match clause {
                Clause::Compare {
                    field,
                    comparator,
                    operand,
                } => comparator.holds(lookup(field), operand),
                Clause::Exists(field) => lookup(field).is_some(),
                Clause::NotExists(field) => lookup(field).is_none(),
            }
        })
    }
}

fn parse_clause(
    part: &str,
    names: &BTreeMap<String, String>,
    values: &Document,
) -> StorageResult<Clause> {
    if let Some(captures) = COMPARE_RE.captures(part) {
        let field = resolve_name(&captures[1], names)?;
        let comparator = Comparator::parse(&captures[2]).ok_or_else(|| {
            StorageError::InvalidExpression(format!("unsupported comparator `{}`", &captures[2]))
        })?;
        let placeholder = &captures[3];
        let operand = values.get(placeholder).cloned().ok_or_else(|| {
            StorageError::InvalidExpression(format!(
                "value placeholder `{placeholder}` is not defined"
            ))
        })?;
        return Ok(Clause::Compare {
            field,
            comparator,
            operand,
        });
    }

    if let Some(captures) = FUNCTION_RE.captures(part) {
        let field = resolve_name(&captures[2], names)?;
        return Ok(match &captures[1] {
            "attribute_exists" => Clause::Exists(field),
            _ => Clause::NotExists(field),
        });
    }

    Err(StorageError::InvalidExpression(format!(
        "unsupported clause `{}`",
        part.trim()
    )))
}

fn resolve_name(
    token: &str,
    names: &BTreeMap<String, String>,
) -> StorageResult<String> {
    if token.starts_with('#') {
        return names.get(token).cloned().ok_or_else(|| {
            StorageError::InvalidExpression(format!("name placeholder `{token}` is not defined"))
        });
    }
    Ok(token.to_string())
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: by type rank, then by value.
///
/// Numbers compare numerically, strings lexicographically; arrays and
/// objects fall back to their serialized form.
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => a
                .as_f64()
                .unwrap_or_default()
                .partial_cmp(&b.as_f64().unwrap_or_default())
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            left.to_string().cmp(&right.to_string())
        }
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}

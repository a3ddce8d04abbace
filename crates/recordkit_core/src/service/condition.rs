//! Key-condition synthesis for conditional writes.
//!
//! # Invariants
//! - A caller-supplied condition expression is never replaced.
//! - Clauses follow the given field order, joined with ` AND `.
//! - Each field gets its own `#name` / `:name` placeholder pair, suffixed
//!   `_1`, `_2`, ... when two fields sanitize to the same name.

use crate::model::Document;
use crate::storage::WriteParams;
use serde_json::Value;
use std::collections::HashSet;

/// Comparison applied to every key field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyComparison {
    /// Insert-only: no stored item may share the key.
    NotEqual,
    /// Existence check: the stored item must match the key.
    Equal,
}

impl KeyComparison {
    fn operator(self) -> &'static str {
        match self {
            Self::NotEqual => "<>",
            Self::Equal => "=",
        }
    }
}

/// Synthesizes the key condition into `params` unless one is already set.
///
/// A field missing from `data` is bound to `null`. Returns whether a
/// condition was written.
pub fn apply_key_condition(
    params: &mut WriteParams,
    comparison: KeyComparison,
    fields: &[String],
    data: &Document,
) -> bool {
    if params.condition().is_some() || fields.is_empty() {
        return false;
    }

    let mut clauses = Vec::with_capacity(fields.len());
    let mut used = HashSet::with_capacity(fields.len());
    for field in fields {
        let placeholder = unique_placeholder(placeholder_for(field), &mut used);
        let name = format!("#{placeholder}");
        let value = format!(":{placeholder}");

        clauses.push(format!("{name} {} {value}", comparison.operator()));
        params
            .expression_attribute_names
            .insert(name, field.clone());
        params
            .expression_attribute_values
            .insert(value, data.get(field).cloned().unwrap_or(Value::Null));
    }

    params.condition_expression = Some(clauses.join(" AND "));
    true
}

fn unique_placeholder(base: String, used: &mut HashSet<String>) -> String {
    let mut candidate = base.clone();
    let mut suffix = 0usize;
    while !used.insert(candidate.clone()) {
        suffix += 1;
        candidate = format!("{base}_{suffix}");
    }
    candidate
}

fn placeholder_for(field: &str) -> String {
    field
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

//! Declarative validation grammar for record payloads.
//!
//! # Responsibility
//! - Define the `Schema` seam used by the record pipeline.
//! - Provide `ObjectSchema`, a field-rule based grammar.
//!
//! # Invariants
//! - Validation stops at the first violation and reports it as-is.
//! - `field_names()` lists exactly the declared fields; update projection
//!   relies on it.

use super::Document;
use crate::error::value_kind;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)+$")
        .expect("valid email regex")
});

/// Validation grammar checked against a record payload.
pub trait Schema: Debug + Send + Sync {
    /// Field names declared by this grammar.
    fn field_names(&self) -> Vec<String>;

    /// Checks `data`, returning the grammar's own error on failure.
    fn validate(&self, data: &Document) -> Result<(), SchemaError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    Required,
    Type,
    Length,
    Range,
    Pattern,
    NotAllowed,
    Unknown,
}

/// First violation found by a grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    pub field: String,
    pub kind: SchemaErrorKind,
    pub message: String,
}

impl SchemaError {
    fn new(field: &str, kind: SchemaErrorKind, detail: impl Display) -> Self {
        Self {
            field: field.to_string(),
            kind,
            message: format!("\"{field}\" {detail}"),
        }
    }
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for SchemaError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Any,
}

impl FieldKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Number => "a number",
            Self::Integer => "an integer",
            Self::Boolean => "a boolean",
            Self::Array => "an array",
            Self::Object => "an object",
            Self::Any => "any value",
        }
    }
}

/// Rule for one declared field.
#[derive(Debug, Clone)]
pub struct FieldRule {
    kind: FieldKind,
    required: bool,
    nullable: bool,
    min_len: Option<usize>,
    max_len: Option<usize>,
    min: Option<f64>,
    max: Option<f64>,
    pattern: Option<(Regex, &'static str)>,
    allowed: Vec<Value>,
}

impl FieldRule {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
            nullable: false,
            min_len: None,
            max_len: None,
            min: None,
            max: None,
            pattern: None,
            allowed: Vec::new(),
        }
    }

    pub fn string() -> Self {
        Self::new(FieldKind::String)
    }

    pub fn number() -> Self {
        Self::new(FieldKind::Number)
    }

    pub fn integer() -> Self {
        Self::new(FieldKind::Integer)
    }

    pub fn boolean() -> Self {
        Self::new(FieldKind::Boolean)
    }

    pub fn array() -> Self {
        Self::new(FieldKind::Array)
    }

    pub fn object() -> Self {
        Self::new(FieldKind::Object)
    }

    pub fn any() -> Self {
        Self::new(FieldKind::Any)
    }

    /// Any-kind rule restricted to the given values.
    pub fn valid<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::any().allow(values)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Accepts an explicit `null` in addition to the declared kind.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Exact string length in characters.
    pub fn length(mut self, len: usize) -> Self {
        self.min_len = Some(len);
        self.max_len = Some(len);
        self
    }

    pub fn min_len(mut self, len: usize) -> Self {
        self.min_len = Some(len);
        self
    }

    pub fn max_len(mut self, len: usize) -> Self {
        self.max_len = Some(len);
        self
    }

    pub fn min(mut self, value: f64) -> Self {
        self.min = Some(value);
        self
    }

    pub fn max(mut self, value: f64) -> Self {
        self.max = Some(value);
        self
    }

    /// String must match `pattern`; `name` appears in the error message.
    pub fn pattern(mut self, pattern: Regex, name: &'static str) -> Self {
        self.pattern = Some((pattern, name));
        self
    }

    pub fn email(self) -> Self {
        self.pattern(EMAIL_RE.clone(), "email")
    }

    pub fn allow<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    fn check(&self, field: &str, value: &Value) -> Result<(), SchemaError> {
        if value.is_null() && self.nullable {
            return Ok(());
        }

        if !self.allowed.is_empty() {
            if self.allowed.contains(value) {
                return Ok(());
            }
            let allowed = self
                .allowed
                .iter()
                .map(|value| match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            return Err(SchemaError::new(
                field,
                SchemaErrorKind::NotAllowed,
                format_args!("must be one of [{allowed}]"),
            ));
        }

        if !self.kind.accepts(value) {
            return Err(SchemaError::new(
                field,
                SchemaErrorKind::Type,
                format_args!("must be {}, got {}", self.kind.label(), value_kind(value)),
            ));
        }

        if let Value::String(text) = value {
            self.check_text(field, text)?;
        }

        if let Some(number) = value.as_f64() {
            self.check_number(field, number)?;
        }

        Ok(())
    }

    fn check_text(&self, field: &str, text: &str) -> Result<(), SchemaError> {
        let len = text.chars().count();
        match (self.min_len, self.max_len) {
            (Some(min), Some(max)) if min == max && len != min => {
                return Err(SchemaError::new(
                    field,
                    SchemaErrorKind::Length,
                    format_args!("length must be {min} characters long"),
                ));
            }
            (Some(min), _) if len < min => {
                return Err(SchemaError::new(
                    field,
                    SchemaErrorKind::Length,
                    format_args!("length must be at least {min} characters long"),
                ));
            }
            (_, Some(max)) if len > max => {
                return Err(SchemaError::new(
                    field,
                    SchemaErrorKind::Length,
                    format_args!("length must be less than or equal to {max} characters long"),
                ));
            }
            _ => {}
        }

        if let Some((pattern, name)) = &self.pattern {
            if !pattern.is_match(text) {
                return Err(SchemaError::new(
                    field,
                    SchemaErrorKind::Pattern,
                    format_args!("must match the {name} pattern"),
                ));
            }
        }

        Ok(())
    }

    fn check_number(&self, field: &str, number: f64) -> Result<(), SchemaError> {
        if let Some(min) = self.min {
            if number < min {
                return Err(SchemaError::new(
                    field,
                    SchemaErrorKind::Range,
                    format_args!("must be greater than or equal to {min}"),
                ));
            }
        }
        if let Some(max) = self.max {
            if number > max {
                return Err(SchemaError::new(
                    field,
                    SchemaErrorKind::Range,
                    format_args!("must be less than or equal to {max}"),
                ));
            }
        }
        Ok(())
    }
}

/// Object grammar keyed by field name.
///
/// Undeclared fields are rejected unless `allow_unknown()` is set.
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    fields: BTreeMap<String, FieldRule>,
    allow_unknown: bool,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.insert(name.into(), rule);
        self
    }

    pub fn allow_unknown(mut self) -> Self {
        self.allow_unknown = true;
        self
    }

    pub fn rule(&self, name: &str) -> Option<&FieldRule> {
        self.fields.get(name)
    }
}

impl Schema for ObjectSchema {
    fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn validate(&self, data: &Document) -> Result<(), SchemaError> {
        for (name, rule) in &self.fields {
            match data.get(name) {
                Some(value) => rule.check(name, value)?,
                None if rule.required => {
                    return Err(SchemaError::new(
                        name,
                        SchemaErrorKind::Required,
                        "is required",
                    ));
                }
                None => {}
            }
        }

        if !self.allow_unknown {
            if let Some(unknown) = data.keys().find(|key| !self.fields.contains_key(*key)) {
                return Err(SchemaError::new(
                    unknown,
                    SchemaErrorKind::Unknown,
                    "is not allowed",
                ));
            }
        }

        Ok(())
    }
}

//! Record-level domain model.
//!
//! # Responsibility
//! - Define the payload shape every write travels in (`Document`).
//! - Define static model/record configuration and the record pipeline.
//!
//! # Invariants
//! - Payloads are plain JSON objects; provider-native items never enter
//!   the pipeline.

pub mod definition;
pub mod record;
pub mod schema;

/// Plain field-name to value mapping.
pub type Document = serde_json::Map<String, serde_json::Value>;

//! Caller-facing façades.
//!
//! # Responsibility
//! - `AccessService`: key reads, batch reads and queries.
//! - `ControlService`: validated writes with synthesized key conditions.
//!
//! # Invariants
//! - Every call resolves its model through the `Catalog` first.
//! - Every call returns one formatted value or one `RecordError`.
//!
//! # See also
//! - `crate::format` for result shaping.

pub mod access;
pub mod condition;
pub mod control;
pub mod options;

use crate::error::{RecordError, RecordResult};
use log::{error, info, warn};
use std::time::Instant;

/// Emits the outcome event of one façade call.
///
/// Caller mistakes (input, validation, conflict, options) log at warn;
/// storage and registry failures at error.
fn log_outcome<T>(
    module: &'static str,
    event: &'static str,
    model: &str,
    started_at: Instant,
    result: &RecordResult<T>,
) {
    let duration_ms = started_at.elapsed().as_millis();
    match result {
        Ok(_) => info!(
            "event={event} module={module} status=ok model={model} duration_ms={duration_ms}"
        ),
        Err(
            err @ (RecordError::InvalidInput(_)
            | RecordError::Validation(_)
            | RecordError::Conflict(_)
            | RecordError::InvalidOptions(_)),
        ) => warn!(
            "event={event} module={module} status=rejected model={model} duration_ms={duration_ms} error_code={}",
            err.code()
        ),
        Err(err) => error!(
            "event={event} module={module} status=error model={model} duration_ms={duration_ms} error_code={}",
            err.code()
        ),
    }
}

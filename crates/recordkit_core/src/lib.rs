//! Record layer over a key/value and range-query store.
//!
//! Models are registered in a [`Catalog`]; writes go through
//! [`ControlService`] (normalize, validate, conditional write) and reads
//! through [`AccessService`]. Every result is shaped by [`format_result`].

pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod guard;
pub mod logging;
pub mod model;
pub mod registry;
pub mod service;
pub mod storage;

pub use config::{CatalogConfig, GuardConfig, LoggingConfig, RedefinitionPolicy};
pub use error::{
    ConflictError, InputError, RecordError, RecordResult, ValidationError,
};
pub use format::{format_result, unwrap_result, Formatted, ResultFormat};
pub use guard::{Clock, GuardCache, ManualClock, NoopGuardCache, SystemClock, TtlGuardCache};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::definition::{ModelConfig, RecordConfig};
pub use model::record::{Payload, Record, RecordScope};
pub use model::schema::{FieldRule, ObjectSchema, Schema, SchemaError, SchemaErrorKind};
pub use model::Document;
pub use registry::{Catalog, ModelEntry, ModelHandle, RegistryError};
pub use service::access::AccessService;
pub use service::control::ControlService;
pub use service::options::{
    AccessOptions, CreateOptions, QueryOptions, RangeKeyOptions, WriteOptions,
};
pub use storage::query::{Query, RangeOperation, SelectMode, SortOrder};
pub use storage::{
    EngineResult, IndexSpec, ItemKey, KeyInput, SqliteEngine, StorageEngine, StorageError,
    TableSpec, WriteParams,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}

//! Best-effort duplicate-create guard.
//!
//! # Responsibility
//! - Remember recently started creates per `(operation, model, field, value)`.
//! - Let the control façade reject a duplicate before it reaches storage.
//!
//! # Invariants
//! - Tokens expire after their TTL; an expired token is never reported live.
//! - The guard is not authoritative; the engine's conditional write is.
//! - Check and insert are separate calls; concurrent callers may both pass.

use log::trace;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Time source for guard expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for deterministic expiry tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Time-bounded token store consulted by `create`.
pub trait GuardCache: Send + Sync {
    /// Whether `token` was marked and has not expired yet.
    fn is_live(&self, token: &str) -> bool;

    /// Marks `token` live for `ttl`.
    fn mark(&self, token: &str, ttl: Duration);
}

/// In-process guard cache with lazy expiry.
pub struct TtlGuardCache {
    entries: Mutex<HashMap<String, Instant>>,
    clock: Arc<dyn Clock>,
}

impl TtlGuardCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of tokens that are still live.
    pub fn live_count(&self) -> usize {
        let now = self.clock.now();
        let entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.values().filter(|expires_at| **expires_at > now).count()
    }
}

impl Default for TtlGuardCache {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardCache for TtlGuardCache {
    fn is_live(&self, token: &str) -> bool {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.retain(|_, expires_at| *expires_at > now);
        entries.contains_key(token)
    }

    fn mark(&self, token: &str, ttl: Duration) {
        let expires_at = self.clock.now() + ttl;
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(token.to_string(), expires_at);
        trace!(
            "event=guard_mark module=guard status=ok ttl_ms={} live={}",
            ttl.as_millis(),
            entries.len()
        );
    }
}

/// Guard that never reports a live token.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopGuardCache;

impl GuardCache for NoopGuardCache {
    fn is_live(&self, _token: &str) -> bool {
        false
    }

    fn mark(&self, _token: &str, _ttl: Duration) {}
}

/// Token for one guarded key field: `<operation>:<model>:<field>:<json value>`.
pub fn guard_token(operation: &str, model: &str, field: &str, value: &Value) -> String {
    format!("{operation}:{model}:{field}:{value}")
}

//! Per-task result cache
//!
//! A single slot holding the last committed result and the instant it was
//! committed. The slot is only written by the owning task's execution pass.

use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// Validity window for tasks without an interval
pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

/// Single-slot result cache with a time-to-live
#[derive(Debug, Clone)]
pub struct ResultCache {
    /// Last committed result
    value: Option<Value>,

    /// When `value` was committed
    cached_at: Option<Instant>,

    /// Validity window
    ttl: Duration,
}

impl ResultCache {
    /// Create an empty cache
    pub fn new(ttl: Duration) -> Self {
        ResultCache {
            value: None,
            cached_at: None,
            ttl,
        }
    }

    /// Commit a new result
    pub fn update(&mut self, value: Value) {
        self.value = Some(value);
        self.cached_at = Some(Instant::now());
    }

    /// A cache is valid when it holds a non-null value younger than the TTL
    pub fn is_valid(&self) -> bool {
        match (&self.value, self.cached_at) {
            (Some(value), Some(at)) => !value.is_null() && at.elapsed() < self.ttl,
            _ => false,
        }
    }

    /// The value, only while valid
    pub fn get(&self) -> Option<&Value> {
        if self.is_valid() {
            self.value.as_ref()
        } else {
            None
        }
    }

    /// The value regardless of age
    pub fn get_force(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// When the current value was committed
    pub fn cached_at(&self) -> Option<Instant> {
        self.cached_at
    }

    /// Get the configured TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

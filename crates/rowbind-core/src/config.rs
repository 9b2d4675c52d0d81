//! Binder configuration.

use rowbind_error::{BindError, Result};
use serde::{Deserialize, Serialize};

/// Rows buffered between the cursor reader and the decoder.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Slots reserved up front for a growable destination in streaming mode.
pub const DEFAULT_INITIAL_CAPACITY: usize = 16 * 1024;

/// Upper bound on decode workers regardless of the requested fan-out.
pub const DEFAULT_MAX_WORKERS: usize = 16;

/// Largest accepted `stream.queue_capacity`; the queue is allocated up front.
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

/// Largest accepted `stream.initial_capacity`.
pub const MAX_INITIAL_CAPACITY: usize = 1 << 20;

/// What the coercion engine does when a cell does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsePolicy {
    /// Store the zero value and keep going.
    #[default]
    Lenient,
    /// Fail with `UnsupportedConversion`.
    Strict,
}

/// Streaming filler tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub queue_capacity: usize,
    pub initial_capacity: usize,
    pub max_workers: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

impl StreamConfig {
    /// Worker count actually used for a requested fan-out.
    pub fn workers_for(&self, fan_out: usize) -> usize {
        fan_out.min(self.max_workers).max(1)
    }
}

/// Top-level binder configuration.
///
/// `fan_out` selects the fill mode used by `Binder::scan`: `0` reads every
/// row first and fills synchronously, `1` streams rows and decodes them
/// inline, and anything larger streams rows to that many decode workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BindConfig {
    pub parse_policy: ParsePolicy,
    pub fan_out: usize,
    pub stream: StreamConfig,
}

impl BindConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stream.queue_capacity == 0 {
            return Err(BindError::invalid_config(
                "stream.queue_capacity must be >= 1",
            ));
        }
        if self.stream.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(BindError::invalid_config(format!(
                "stream.queue_capacity must be <= {MAX_QUEUE_CAPACITY}"
            )));
        }
        if self.stream.initial_capacity > MAX_INITIAL_CAPACITY {
            return Err(BindError::invalid_config(format!(
                "stream.initial_capacity must be <= {MAX_INITIAL_CAPACITY}"
            )));
        }
        if self.stream.max_workers == 0 {
            return Err(BindError::invalid_config("stream.max_workers must be >= 1"));
        }
        Ok(())
    }
}

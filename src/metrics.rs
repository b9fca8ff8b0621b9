//! Per-task read metrics.
//!
//! The shuffle reader reports into [`ShuffleReadMetrics`] and the narrow read
//! path into [`InputMetrics`]; both hang off a [`TaskMetrics`] owned by the
//! task's [`TaskContext`](crate::context::TaskContext). Counters are atomics
//! so a reader may update them from whichever thread drives the iterator.
//!
//! # Example
//!
//! ```
//! use ironbeam_cogroup::metrics::{Metric, TaskMetrics};
//!
//! let m = TaskMetrics::default();
//! m.shuffle_read().inc_records(3);
//! assert_eq!(m.shuffle_read().records_read(), 3);
//! assert_eq!(m.value()["shuffle_read"]["records"], 3);
//! ```

use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};

/// A named metric that can render itself as JSON.
pub trait Metric: Send + Sync {
    fn name(&self) -> &str;

    fn value(&self) -> Value;

    fn description(&self) -> Option<&str> {
        None
    }
}

#[derive(Debug, Default)]
pub struct ShuffleReadMetrics {
    records: AtomicU64,
    bytes: AtomicU64,
    blocks: AtomicU64,
}

impl ShuffleReadMetrics {
    pub fn inc_records(&self, n: u64) {
        self.records.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_bytes(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_blocks(&self, n: u64) {
        self.blocks.fetch_add(n, Ordering::Relaxed);
    }

    #[must_use]
    pub fn records_read(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn blocks_fetched(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }
}

impl Metric for ShuffleReadMetrics {
    fn name(&self) -> &str {
        "shuffle_read"
    }

    fn value(&self) -> Value {
        json!({
            "records": self.records_read(),
            "bytes": self.bytes_read(),
            "blocks": self.blocks_fetched(),
        })
    }

    fn description(&self) -> Option<&str> {
        Some("records, bytes and blocks fetched from shuffle output")
    }
}

/// Records read in-process from co-partitioned inputs.
#[derive(Debug, Default)]
pub struct InputMetrics {
    records: AtomicU64,
}

impl InputMetrics {
    pub fn inc_records(&self, n: u64) {
        self.records.fetch_add(n, Ordering::Relaxed);
    }

    #[must_use]
    pub fn records_read(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }
}

impl Metric for InputMetrics {
    fn name(&self) -> &str {
        "input"
    }

    fn value(&self) -> Value {
        json!({ "records": self.records_read() })
    }
}

#[derive(Debug, Default)]
pub struct TaskMetrics {
    shuffle_read: ShuffleReadMetrics,
    input: InputMetrics,
}

impl TaskMetrics {
    #[must_use]
    pub fn shuffle_read(&self) -> &ShuffleReadMetrics {
        &self.shuffle_read
    }

    #[must_use]
    pub fn input(&self) -> &InputMetrics {
        &self.input
    }

    /// Add `other`'s counters into `self` (job-level rollup).
    pub fn absorb(&self, other: &TaskMetrics) {
        self.shuffle_read.inc_records(other.shuffle_read.records_read());
        self.shuffle_read.inc_bytes(other.shuffle_read.bytes_read());
        self.shuffle_read.inc_blocks(other.shuffle_read.blocks_fetched());
        self.input.inc_records(other.input.records_read());
    }
}

impl Metric for TaskMetrics {
    fn name(&self) -> &str {
        "task"
    }

    fn value(&self) -> Value {
        json!({
            "shuffle_read": self.shuffle_read.value(),
            "input": self.input.value(),
        })
    }
}

//! The per-task context handed to every compute and read call.
//!
//! It carries the partition being computed, the metrics sink for the task and
//! a shared interrupt flag. Whoever scheduled the task may set the flag at any
//! time; readers poll it and abort the whole compute call with
//! [`CoGroupError::TaskKilled`].

use crate::error::{CoGroupError, Result};
use crate::ids::PartitionId;
use crate::metrics::TaskMetrics;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Clone, Debug)]
pub struct TaskContext {
    partition_id: PartitionId,
    attempt: u32,
    interrupted: Arc<AtomicBool>,
    metrics: Arc<TaskMetrics>,
    check_interval: usize,
}

impl TaskContext {
    #[must_use]
    pub fn new(partition_id: PartitionId) -> Self {
        Self {
            partition_id,
            attempt: 0,
            interrupted: Arc::new(AtomicBool::new(false)),
            metrics: Arc::new(TaskMetrics::default()),
            check_interval: 1,
        }
    }

    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Share an interrupt flag with the caller (e.g. one flag per job).
    #[must_use]
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = flag;
        self
    }

    /// Poll the interrupt flag every `n` records (minimum 1).
    #[must_use]
    pub fn with_check_interval(mut self, n: usize) -> Self {
        self.check_interval = n.max(1);
        self
    }

    #[must_use]
    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    #[must_use]
    pub fn metrics(&self) -> &TaskMetrics {
        &self.metrics
    }

    #[must_use]
    pub fn check_interval(&self) -> usize {
        self.check_interval
    }

    pub fn kill(&self) {
        self.interrupted.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// # Errors
    /// Returns [`CoGroupError::TaskKilled`] once the task has been interrupted.
    pub fn check_interrupted(&self) -> Result<()> {
        if self.is_interrupted() {
            return Err(CoGroupError::TaskKilled(self.partition_id));
        }
        Ok(())
    }

    /// Interrupt check for the `seen`-th record, honoring the check interval.
    pub(crate) fn check_every(&self, seen: usize) -> Result<()> {
        if seen % self.check_interval == 0 {
            self.check_interrupted()?;
        }
        Ok(())
    }
}

use crate::cogroup::CoGroupedDataset;
use crate::config::CoGroupConfig;
use crate::context::TaskContext;
use crate::dataset::{Data, KeyData, KeyedDataset};
use crate::error::CoGroupError;
use crate::ids::PartitionId;
use crate::merge::CoGrouped;
use crate::metrics::TaskMetrics;
use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExecMode {
    Sequential,
    Parallel { threads: Option<usize> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TaskState {
    Pending,
    Computing,
    Computed,
    Failed,
}

/// What happened to one partition.
#[derive(Debug)]
pub struct TaskOutcome<K, V> {
    pub partition: PartitionId,
    pub state: TaskState,
    pub result: std::result::Result<Vec<CoGrouped<K, V>>, CoGroupError>,
}

#[derive(Debug)]
pub struct JobOutcome<K, V> {
    /// One entry per partition, in partition order.
    pub tasks: Vec<TaskOutcome<K, V>>,
    /// Sum of every task's metrics.
    pub metrics: TaskMetrics,
    /// Reads done by the map stages this job ran, upstream ones included.
    pub map_stage: TaskMetrics,
}

impl<K, V> JobOutcome<K, V> {
    #[must_use]
    pub fn failed(&self) -> usize {
        self.tasks.iter().filter(|t| t.state == TaskState::Failed).count()
    }
}

/// Drives a co-group job: every map stage first (upstream co-groups included),
/// then one task per partition.
pub struct Runner {
    pub mode: ExecMode,
    pub interrupt_check_interval: usize,
    interrupt: Arc<AtomicBool>,
    /// Per-partition state of the most recent job.
    states: Mutex<Vec<TaskState>>,
}

impl Default for Runner {
    fn default() -> Self {
        Self::from_config(&CoGroupConfig::default())
    }
}

impl Runner {
    #[must_use]
    pub fn new(mode: ExecMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn from_config(config: &CoGroupConfig) -> Self {
        Self {
            mode: config.exec_mode,
            interrupt_check_interval: config.interrupt_check_interval,
            interrupt: Arc::new(AtomicBool::new(false)),
            states: Mutex::new(Vec::new()),
        }
    }

    /// Share a kill switch with every task of the jobs this runner starts.
    #[must_use]
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    /// Task states of the current or most recent job, by partition.
    #[must_use]
    pub fn task_states(&self) -> Vec<TaskState> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_state(&self, partition: PartitionId, state: TaskState) {
        if let Some(s) = self.states.lock().unwrap_or_else(PoisonError::into_inner).get_mut(partition) {
            *s = state;
        }
    }

    fn task_context(&self, partition: PartitionId) -> TaskContext {
        TaskContext::new(partition)
            .with_interrupt_flag(Arc::clone(&self.interrupt))
            .with_check_interval(self.interrupt_check_interval)
    }

    /// Run every partition of `op`. Task failures are reported per partition;
    /// only planning and map-stage failures fail the whole call.
    ///
    /// # Errors
    /// Planning, map stage, or thread pool construction failures.
    pub fn run_job<K: KeyData, V: Data>(&self, op: &CoGroupedDataset<K, V>) -> Result<JobOutcome<K, V>> {
        let descriptors = op.partition_descriptors().context("planning co-group")?;
        let n = descriptors.len();
        *self.states.lock().unwrap_or_else(PoisonError::into_inner) = vec![TaskState::Pending; n];

        let map_ctx = self.task_context(0);
        op.run_map_stages(&map_ctx)
            .with_context(|| format!("map stages of {}", op.name()))?;

        let run_task = |partition: PartitionId| -> (TaskOutcome<K, V>, TaskMetrics) {
            self.set_state(partition, TaskState::Computing);
            let ctx = self.task_context(partition);
            let result = op.compute(partition, &ctx).map(|rows| rows.collect::<Vec<_>>());
            let state = match &result {
                Ok(_) => TaskState::Computed,
                Err(e) => {
                    warn!(partition, error = %e, "task failed");
                    TaskState::Failed
                }
            };
            self.set_state(partition, state);
            let metrics = TaskMetrics::default();
            metrics.absorb(ctx.metrics());
            (TaskOutcome { partition, state, result }, metrics)
        };

        let results: Vec<(TaskOutcome<K, V>, TaskMetrics)> = match self.mode {
            ExecMode::Sequential => (0..n).map(run_task).collect(),
            ExecMode::Parallel { threads } => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads.unwrap_or_else(num_cpus::get).max(1))
                    .build()
                    .map_err(|e| anyhow!("building thread pool: {e}"))?;
                pool.install(|| (0..n).into_par_iter().map(run_task).collect())
            }
        };

        let metrics = TaskMetrics::default();
        let mut tasks = Vec::with_capacity(n);
        for (task, task_metrics) in results {
            metrics.absorb(&task_metrics);
            tasks.push(task);
        }
        let map_stage = TaskMetrics::default();
        map_stage.absorb(map_ctx.metrics());
        let outcome = JobOutcome {
            tasks,
            metrics,
            map_stage,
        };
        info!(
            partitions = n,
            failed = outcome.failed(),
            mode = ?self.mode,
            "co-group job finished"
        );
        Ok(outcome)
    }

    /// Run `op` and concatenate its partitions in partition order.
    ///
    /// # Errors
    /// The first failed partition, or any [`run_job`](Self::run_job) failure.
    pub fn collect<K: KeyData, V: Data>(&self, op: &CoGroupedDataset<K, V>) -> Result<Vec<CoGrouped<K, V>>> {
        let mut out = Vec::new();
        for task in self.run_job(op)?.tasks {
            let partition = task.partition;
            out.extend(task.result.with_context(|| format!("partition {partition} failed"))?);
        }
        Ok(out)
    }
}

impl<K, V> TaskOutcome<K, V> {
    #[must_use]
    pub fn is_computed(&self) -> bool {
        self.state == TaskState::Computed
    }
}

//! The co-group operator.
//!
//! [`CoGroupedDataset`] ties the pieces together: it plans one dependency per
//! input, builds one descriptor per target partition, and computes partitions
//! through its [`MergeEngine`]. Dependencies and descriptors are computed at
//! most once and cached.
//!
//! ```text
//! Unplanned ──dependencies()──▶ DependenciesComputed ──partition_descriptors()──▶ PartitionsBuilt
//!      │                                   │                                           │
//!      └───────────────────────────────────┴──────── clear_dependencies() ─────────────┴──▶ TornDown
//! ```
//!
//! After teardown the inputs are released and no new planning is possible, but
//! descriptors built before teardown stay computable: each one holds what it
//! needs to read its inputs.
//!
//! The operator is itself a [`KeyedDataset`] partitioned by its target
//! partitioner, so co-grouping its output again with the same partitioner
//! reads it narrowly. A downstream co-group runs this operator's map stages
//! through [`KeyedDataset::prepare`] before reading it, narrowly or not.
//!
//! # Example
//!
//! ```
//! use ironbeam_cogroup::*;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let a = MemoryDataset::from_vec(vec![(1u32, "a".to_string()), (2, "b".to_string())], 1);
//! let b = MemoryDataset::from_vec(vec![(1u32, "x".to_string()), (1, "y".to_string())], 1);
//! let target: Arc<dyn Partitioner<u32>> = Arc::new(ModuloPartitioner::<u32>::new(2)?);
//!
//! let inputs: Vec<Arc<dyn KeyedDataset<u32, String>>> = vec![Arc::new(a), Arc::new(b)];
//! let op = CoGroupedDataset::new(
//!     inputs,
//!     target,
//!     CoGroupEnv::local(Arc::new(LocalShuffleService::default())),
//! )?;
//! let rows = Runner::default().collect(&op)?;
//! assert_eq!(rows.len(), 2);
//! # Ok(())
//! # }
//! ```

use crate::adapter::RecordDecoder;
use crate::config::CoGroupConfig;
use crate::context::TaskContext;
use crate::dataset::{Data, KeyData, KeyedDataset, RecordIter, SourcePartition};
use crate::dependency::{Dependency, DependencyKind, plan_dependencies};
use crate::error::{CoGroupError, Result};
use crate::ids::PartitionId;
use crate::merge::{Bucket, CoGroupIter, MergeEngine};
use crate::partitioner::{PartitionScheme, Partitioner};
use crate::record::Record;
use crate::serializer::SerializerRegistry;
use crate::shuffle::{LocalShuffleService, ShuffleReader, ShuffleWriter};
use crate::split::{PartitionDescriptor, SplitDependency, build_descriptors};
use serde::Serialize;
use std::fmt::{Display, Formatter, Result as FormatResult};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Collaborators the operator is wired to.
pub struct CoGroupEnv<K, V> {
    pub shuffle_writer: Arc<dyn ShuffleWriter<K, V>>,
    pub shuffle_reader: Arc<dyn ShuffleReader<K, V>>,
    pub serializers: Arc<SerializerRegistry>,
    pub decoder: RecordDecoder<K, V>,
    pub config: CoGroupConfig,
}

impl<K: KeyData, V: Data> CoGroupEnv<K, V> {
    /// Wire both shuffle roles to one in-process service and read with the
    /// encoding it writes.
    #[must_use]
    pub fn local(service: Arc<LocalShuffleService<K, V>>) -> Self {
        let config = CoGroupConfig {
            serializer: service.encoding().name().to_string(),
            ..CoGroupConfig::default()
        };
        Self {
            shuffle_writer: service.clone(),
            shuffle_reader: service,
            serializers: Arc::new(SerializerRegistry::default()),
            decoder: RecordDecoder::default(),
            config,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: CoGroupConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_decoder(mut self, decoder: RecordDecoder<K, V>) -> Self {
        self.decoder = decoder;
        self
    }

    #[must_use]
    pub fn with_serializers(mut self, serializers: SerializerRegistry) -> Self {
        self.serializers = Arc::new(serializers);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum OperatorState {
    Unplanned,
    DependenciesComputed,
    PartitionsBuilt,
    TornDown,
}

struct Lineage<K, V> {
    inputs: Option<Vec<Arc<dyn KeyedDataset<K, V>>>>,
    dependencies: Option<Arc<Vec<Dependency<K, V>>>>,
    descriptors: Option<Arc<Vec<PartitionDescriptor<K, V>>>>,
    state: OperatorState,
}

pub struct CoGroupedDataset<K, V> {
    name: String,
    partitioner: Arc<dyn Partitioner<K>>,
    arity: usize,
    writer: Arc<dyn ShuffleWriter<K, V>>,
    engine: MergeEngine<K, V>,
    config: CoGroupConfig,
    lineage: Mutex<Lineage<K, V>>,
}

impl<K: KeyData, V: Data> CoGroupedDataset<K, V> {
    /// # Errors
    /// - [`CoGroupError::NoInputs`] for an empty input list
    /// - [`CoGroupError::InvalidPartitionCount`] for a zero-partition target
    pub fn new(
        inputs: Vec<Arc<dyn KeyedDataset<K, V>>>,
        partitioner: Arc<dyn Partitioner<K>>,
        env: CoGroupEnv<K, V>,
    ) -> Result<Self> {
        if inputs.is_empty() {
            return Err(CoGroupError::NoInputs);
        }
        if partitioner.num_partitions() == 0 {
            return Err(CoGroupError::InvalidPartitionCount);
        }
        let engine = MergeEngine::new(
            env.shuffle_reader,
            env.serializers,
            env.config.serializer.clone(),
            env.decoder,
        );
        Ok(Self {
            name: "cogroup".to_string(),
            partitioner,
            arity: inputs.len(),
            writer: env.shuffle_writer,
            engine,
            config: env.config,
            lineage: Mutex::new(Lineage {
                inputs: Some(inputs),
                dependencies: None,
                descriptors: None,
                state: OperatorState::Unplanned,
            }),
        })
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn lineage(&self) -> MutexGuard<'_, Lineage<K, V>> {
        self.lineage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of inputs, and so of buckets per key.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.arity
    }

    #[must_use]
    pub fn target(&self) -> &Arc<dyn Partitioner<K>> {
        &self.partitioner
    }

    #[must_use]
    pub fn state(&self) -> OperatorState {
        self.lineage().state
    }

    #[must_use]
    pub fn config(&self) -> &CoGroupConfig {
        &self.config
    }

    #[must_use]
    pub fn engine(&self) -> &MergeEngine<K, V> {
        &self.engine
    }

    #[must_use]
    pub fn shuffle_writer(&self) -> &Arc<dyn ShuffleWriter<K, V>> {
        &self.writer
    }

    fn plan(&self, lineage: &mut Lineage<K, V>) -> Result<Arc<Vec<Dependency<K, V>>>> {
        if let Some(deps) = &lineage.dependencies {
            return Ok(Arc::clone(deps));
        }
        let inputs = lineage.inputs.as_ref().ok_or(CoGroupError::TornDown)?;
        let deps = Arc::new(plan_dependencies(inputs, &self.partitioner, self.writer.as_ref())?);
        lineage.dependencies = Some(Arc::clone(&deps));
        if lineage.state == OperatorState::Unplanned {
            lineage.state = OperatorState::DependenciesComputed;
        }
        Ok(deps)
    }

    /// One dependency per input, planned on first call.
    ///
    /// # Errors
    /// [`CoGroupError::TornDown`] after [`clear_dependencies`](Self::clear_dependencies),
    /// or a shuffle registration failure.
    pub fn dependencies(&self) -> Result<Arc<Vec<Dependency<K, V>>>> {
        let mut lineage = self.lineage();
        self.plan(&mut lineage)
    }

    /// One descriptor per target partition, built on first call.
    ///
    /// # Errors
    /// [`CoGroupError::TornDown`] if teardown happened before they were built,
    /// or any planning/build failure.
    pub fn partition_descriptors(&self) -> Result<Arc<Vec<PartitionDescriptor<K, V>>>> {
        let mut lineage = self.lineage();
        if let Some(descs) = &lineage.descriptors {
            return Ok(Arc::clone(descs));
        }
        let deps = self.plan(&mut lineage)?;
        let descs = Arc::new(build_descriptors(&deps, self.partitioner.num_partitions())?);
        debug!(op = %self.name, partitions = descs.len(), "built partition descriptors");
        lineage.descriptors = Some(Arc::clone(&descs));
        lineage.state = OperatorState::PartitionsBuilt;
        Ok(descs)
    }

    /// A copy of partition `id`'s descriptor, ready to be shipped.
    ///
    /// # Errors
    /// [`CoGroupError::PartitionOutOfRange`] for an unknown id, or whatever
    /// [`partition_descriptors`](Self::partition_descriptors) reports.
    pub fn descriptor(&self, id: PartitionId) -> Result<PartitionDescriptor<K, V>> {
        let descs = self.partition_descriptors()?;
        descs.get(id).cloned().ok_or(CoGroupError::PartitionOutOfRange {
            partition: id,
            num_partitions: descs.len(),
        })
    }

    /// Release the inputs and the cached dependency list.
    pub fn clear_dependencies(&self) {
        let mut lineage = self.lineage();
        lineage.inputs = None;
        lineage.dependencies = None;
        lineage.state = OperatorState::TornDown;
        match &lineage.descriptors {
            Some(descs) => warn!(op = %self.name, descriptors = descs.len(), "cleared dependencies with built descriptors"),
            None => info!(op = %self.name, "cleared dependencies"),
        }
    }

    /// Make every partition computable: prepare each narrow input, then run
    /// the map stage of every shuffled input. Inputs that are themselves
    /// co-grouped run their own stages first. Safe to repeat; finished map
    /// stages are skipped by the writer.
    ///
    /// # Errors
    /// Planning failures, and whatever a narrow input or a map stage reports.
    pub fn run_map_stages(&self, ctx: &TaskContext) -> Result<()> {
        let descriptors = self.partition_descriptors()?;
        // Every descriptor reads the same inputs the same way.
        let Some(first) = descriptors.first() else {
            return Ok(());
        };
        for dep in first.deps() {
            match dep {
                SplitDependency::Narrow(split) => split.dataset().prepare(ctx)?,
                SplitDependency::Shuffle { shuffle_id } => {
                    debug!(op = %self.name, %shuffle_id, "running map stage");
                    self.writer.write_map_outputs(*shuffle_id, ctx)?;
                }
            }
        }
        Ok(())
    }

    /// Ship partition `id` through the transfer hook and merge it.
    ///
    /// # Errors
    /// Stale narrow references, fetch failures, decode failures and interrupts
    /// all abort the partition.
    pub fn compute(&self, id: PartitionId, ctx: &TaskContext) -> Result<CoGroupIter<K, V>> {
        let mut descriptor = self.descriptor(id)?;
        ship(&mut descriptor)?;
        self.engine.compute(&descriptor, ctx)
    }

    /// Describe how each input will be read.
    ///
    /// # Errors
    /// [`CoGroupError::TornDown`] once the inputs are released.
    pub fn explain(&self) -> Result<PlanExplanation> {
        let mut lineage = self.lineage();
        let deps = self.plan(&mut lineage)?;
        let inputs = lineage.inputs.as_ref().ok_or(CoGroupError::TornDown)?;
        Ok(PlanExplanation {
            name: self.name.clone(),
            num_partitions: self.partitioner.num_partitions(),
            scheme: self.partitioner.scheme(),
            inputs: inputs
                .iter()
                .zip(deps.iter())
                .enumerate()
                .map(|(index, (input, dep))| InputPlan {
                    index,
                    name: input.name().to_string(),
                    dependency: dep.kind(),
                })
                .collect(),
        })
    }
}

/// Transfer hook: re-resolve the descriptor's narrow handles right before it
/// leaves the planner's hands.
pub(crate) fn ship<K, V>(descriptor: &mut PartitionDescriptor<K, V>) -> Result<()> {
    let snapshot = descriptor.prepare_for_transfer()?;
    match serde_json::to_string(&snapshot) {
        Ok(descriptor) => debug!(partition = snapshot.partition, %descriptor, "shipping descriptor"),
        Err(e) => warn!(partition = snapshot.partition, ?snapshot, error = %e, "shipping descriptor that does not render as JSON"),
    }
    Ok(())
}

impl<K: KeyData, V: Data> KeyedDataset<K, Vec<Bucket<V>>> for CoGroupedDataset<K, V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn partitioner(&self) -> Option<Arc<dyn Partitioner<K>>> {
        Some(Arc::clone(&self.partitioner))
    }

    fn partitions(&self) -> Vec<SourcePartition> {
        (0..self.partitioner.num_partitions())
            .map(|i| SourcePartition::new(i, 0))
            .collect()
    }

    fn iterator(&self, partition: &SourcePartition, ctx: &TaskContext) -> Result<RecordIter<K, Vec<Bucket<V>>>> {
        let rows = self.compute(partition.index(), ctx)?;
        Ok(Box::new(rows.map(|(k, buckets)| Ok(Record::Decoded(k, buckets)))))
    }

    fn prepare(&self, ctx: &TaskContext) -> Result<()> {
        self.run_map_stages(ctx)
    }
}

/// How one input is read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InputPlan {
    pub index: usize,
    pub name: String,
    pub dependency: DependencyKind,
}

/// Result of [`CoGroupedDataset::explain`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlanExplanation {
    pub name: String,
    pub num_partitions: usize,
    pub scheme: PartitionScheme,
    pub inputs: Vec<InputPlan>,
}

impl PlanExplanation {
    #[must_use]
    pub fn narrow_count(&self) -> usize {
        self.inputs
            .iter()
            .filter(|i| i.dependency == DependencyKind::Narrow)
            .count()
    }
}

impl Display for PlanExplanation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        writeln!(
            f,
            "{} over {} inputs -> {} partitions ({:?})",
            self.name,
            self.inputs.len(),
            self.num_partitions,
            self.scheme
        )?;
        for input in &self.inputs {
            match input.dependency {
                DependencyKind::Narrow => writeln!(f, "  [{}] {}: narrow", input.index, input.name)?,
                DependencyKind::Shuffle { shuffle_id } => {
                    writeln!(f, "  [{}] {}: {shuffle_id}", input.index, input.name)?;
                }
            }
        }
        Ok(())
    }
}

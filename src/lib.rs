//! # ironbeam-cogroup
//!
//! A **distributed co-group operator** for keyed datasets. Given N inputs of
//! `(K, V)` records and a target partitioner, it produces one row per distinct
//! key: `(K, [bucket_0, ..., bucket_{N-1}])`, where bucket *i* holds exactly the
//! values input *i* contributed for that key. Values are never deduplicated or
//! pre-aggregated, which makes the operator the building block for multi-way
//! joins and group-bys.
//!
//! ## Key Features
//!
//! - **Narrow vs shuffle planning** - inputs already partitioned like the target are read in place
//! - **Lazy, cached planning** - dependencies and partition descriptors are built once
//! - **Explicit transfer hook** - narrow partition handles are re-resolved right before shipping
//! - **Pluggable shuffle** - the operator talks to [`ShuffleWriter`] / [`ShuffleReader`] only
//! - **Encoded map-side records** - decoded through capability-checked key adapters
//! - **Sequential and parallel execution** - the [`Runner`] drives partitions on Rayon
//!
//! ## Quick Start
//!
//! ```
//! use ironbeam_cogroup::*;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let target: Arc<dyn Partitioner<u32>> = Arc::new(HashPartitioner::<u32>::new(4)?);
//! let orders = MemoryDataset::from_vec(vec![(7u32, "order-1".to_string()), (9, "order-2".to_string())], 2);
//! let users = MemoryDataset::partition_by(vec![(7u32, "ada".to_string())], Arc::clone(&target))?;
//!
//! let inputs: Vec<Arc<dyn KeyedDataset<u32, String>>> = vec![Arc::new(orders), Arc::new(users)];
//! let op = CoGroupedDataset::new(inputs, target, CoGroupEnv::local(Arc::new(LocalShuffleService::default())))?;
//!
//! // `users` is co-partitioned with the target, `orders` is shuffled.
//! assert_eq!(op.explain()?.narrow_count(), 1);
//!
//! let rows = testing::sorted_rows(Runner::default().collect(&op)?);
//! assert_eq!(rows[0], (7, vec![vec!["order-1".to_string()], vec!["ada".to_string()]]));
//! assert_eq!(rows[1], (9, vec![vec!["order-2".to_string()], vec![]]));
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Datasets
//!
//! A [`KeyedDataset`] exposes its partitioning, handles to its partitions and a
//! per-partition iterator. [`MemoryDataset`] is the in-process implementation.
//! A [`CoGroupedDataset`] is itself a keyed dataset, so co-groups chain.
//!
//! ### Dependencies and descriptors
//!
//! [`plan_dependencies`] decides per input between a [`Dependency::Narrow`]
//! read and a [`Dependency::Shuffle`] through a registered shuffle write.
//! [`build_descriptors`] then turns those into one [`PartitionDescriptor`] per
//! target partition.
//!
//! ### Merge
//!
//! [`MergeEngine::compute`] merges one partition into a [`MergeMap`] and yields
//! its rows. Any failure aborts the whole partition.
//!
//! ### Execution
//!
//! The [`Runner`] runs every map stage, then every partition, in
//! [`ExecMode::Sequential`] or [`ExecMode::Parallel`] mode.
//!
//! ## Joins
//!
//! The [`joins`] module expands co-grouped rows into inner, left outer and full
//! outer join rows.
//!
//! ## Testing
//!
//! The [`testing`] module has helpers for comparing co-group output regardless
//! of key order.

pub mod adapter;
pub mod cogroup;
pub mod config;
pub mod context;
pub mod dataset;
pub mod dependency;
pub mod error;
pub mod ids;
pub mod joins;
pub mod merge;
pub mod metrics;
pub mod partitioner;
pub mod record;
pub mod runner;
pub mod serializer;
pub mod shuffle;
pub mod split;
pub mod testing;
pub mod type_token;

// General re-exports
pub use adapter::{CodecAdapter, KeyAdapter, RecordDecoder};
pub use cogroup::{CoGroupEnv, CoGroupedDataset, InputPlan, OperatorState, PlanExplanation};
pub use config::CoGroupConfig;
pub use context::TaskContext;
pub use dataset::{Data, KeyData, KeyedDataset, MemoryDataset, SourcePartition};
pub use dependency::{Dependency, DependencyKind, plan_dependencies};
pub use error::{CoGroupError, Result};
pub use ids::{PartitionId, ShuffleId};
pub use merge::{Bucket, CoGroupIter, CoGrouped, MergeEngine, MergeMap};
pub use metrics::{Metric, TaskMetrics};
pub use partitioner::{FnPartitioner, HashPartitioner, ModuloPartitioner, PartitionScheme, Partitioner};
pub use record::{EncodedRecord, Record};
pub use runner::{ExecMode, JobOutcome, Runner, TaskOutcome, TaskState};
pub use serializer::{Encoding, SerializerRegistry};
pub use shuffle::{LocalShuffleService, ShuffleReader, ShuffleWriter};
pub use split::{PartitionDescriptor, SplitDependency, build_descriptors};
pub use type_token::TypeTag;

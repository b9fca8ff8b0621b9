//! Per-input dependency planning.
//!
//! An input whose current partitioning equals the target partitioning is read
//! one-to-one: target partition `p` reads source partition `p`, in-process. Any
//! other input gets a shuffle write stage registered against the target, and
//! is read back through the shuffle by partition id.

use crate::dataset::{Data, KeyData, KeyedDataset};
use crate::error::Result;
use crate::ids::ShuffleId;
use crate::partitioner::{Partitioner, same_partitioning};
use crate::shuffle::ShuffleWriter;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// How one input reaches the co-grouped partitions.
pub enum Dependency<K, V> {
    /// One-to-one on an already co-partitioned input.
    Narrow(Arc<dyn KeyedDataset<K, V>>),
    /// Redistributed through a registered shuffle write.
    Shuffle { shuffle_id: ShuffleId },
}

impl<K, V> Clone for Dependency<K, V> {
    fn clone(&self) -> Self {
        match self {
            Self::Narrow(ds) => Self::Narrow(Arc::clone(ds)),
            Self::Shuffle { shuffle_id } => Self::Shuffle {
                shuffle_id: *shuffle_id,
            },
        }
    }
}

/// Payload-free view of a [`Dependency`], for introspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DependencyKind {
    Narrow,
    Shuffle { shuffle_id: ShuffleId },
}

impl<K, V> Dependency<K, V> {
    #[must_use]
    pub fn kind(&self) -> DependencyKind {
        match self {
            Self::Narrow(_) => DependencyKind::Narrow,
            Self::Shuffle { shuffle_id } => DependencyKind::Shuffle {
                shuffle_id: *shuffle_id,
            },
        }
    }

    #[must_use]
    pub fn is_narrow(&self) -> bool {
        matches!(self, Self::Narrow(_))
    }

    #[must_use]
    pub fn shuffle_id(&self) -> Option<ShuffleId> {
        match self {
            Self::Narrow(_) => None,
            Self::Shuffle { shuffle_id } => Some(*shuffle_id),
        }
    }
}

/// Decide Narrow vs Shuffle for every input, in input order.
///
/// Registers one shuffle write per input that is not co-partitioned with
/// `target`; that registration is the only side effect.
///
/// # Errors
/// Propagates registration failures from `writer`.
pub fn plan_dependencies<K: KeyData, V: Data>(
    inputs: &[Arc<dyn KeyedDataset<K, V>>],
    target: &Arc<dyn Partitioner<K>>,
    writer: &dyn ShuffleWriter<K, V>,
) -> Result<Vec<Dependency<K, V>>> {
    inputs
        .iter()
        .enumerate()
        .map(|(index, input)| -> Result<Dependency<K, V>> {
            let co_partitioned = input
                .partitioner()
                .is_some_and(|p| same_partitioning(p.as_ref(), target.as_ref()));
            if co_partitioned {
                debug!(index, input = input.name(), "narrow dependency");
                return Ok(Dependency::Narrow(Arc::clone(input)));
            }
            let shuffle_id = writer.register_shuffle_write(Arc::clone(input), Arc::clone(target))?;
            debug!(index, input = input.name(), %shuffle_id, "shuffle dependency");
            Ok(Dependency::Shuffle { shuffle_id })
        })
        .collect()
}

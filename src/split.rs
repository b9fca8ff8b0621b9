//! Partition descriptors: what each output partition reads from each input.
//!
//! A descriptor is built once per output partition and then shipped to
//! whichever worker computes it. Narrow splits capture a handle to their source
//! partition at build time, but upstream partitions may be replaced before the
//! task ships, so the transfer layer must call
//! [`PartitionDescriptor::prepare_for_transfer`] immediately before handing the
//! descriptor over. Nothing else re-resolves handles.

use crate::dataset::{KeyedDataset, SourcePartition};
use crate::dependency::Dependency;
use crate::error::{CoGroupError, Result};
use crate::ids::{PartitionId, ShuffleId};
use serde::Serialize;
use std::sync::Arc;

/// Narrow read of one co-partitioned input partition.
pub struct NarrowSplit<K, V> {
    input_index: usize,
    source_partition_id: PartitionId,
    source_partition: SourcePartition,
    dataset: Arc<dyn KeyedDataset<K, V>>,
}

impl<K, V> Clone for NarrowSplit<K, V> {
    fn clone(&self) -> Self {
        Self {
            input_index: self.input_index,
            source_partition_id: self.source_partition_id,
            source_partition: self.source_partition,
            dataset: Arc::clone(&self.dataset),
        }
    }
}

impl<K, V> NarrowSplit<K, V> {
    #[must_use]
    pub fn input_index(&self) -> usize {
        self.input_index
    }

    #[must_use]
    pub fn source_partition_id(&self) -> PartitionId {
        self.source_partition_id
    }

    /// The handle as last resolved.
    #[must_use]
    pub fn source_partition(&self) -> &SourcePartition {
        &self.source_partition
    }

    #[must_use]
    pub fn dataset(&self) -> &Arc<dyn KeyedDataset<K, V>> {
        &self.dataset
    }

    fn refresh(&mut self) -> Result<()> {
        let current = self.dataset.partitions();
        self.source_partition = *current
            .get(self.source_partition_id)
            .ok_or(CoGroupError::StalePartitionReference {
                input_index: self.input_index,
                partition: self.source_partition_id,
                available: current.len(),
            })?;
        Ok(())
    }
}

pub enum SplitDependency<K, V> {
    Narrow(NarrowSplit<K, V>),
    Shuffle { shuffle_id: ShuffleId },
}

impl<K, V> Clone for SplitDependency<K, V> {
    fn clone(&self) -> Self {
        match self {
            Self::Narrow(split) => Self::Narrow(split.clone()),
            Self::Shuffle { shuffle_id } => Self::Shuffle {
                shuffle_id: *shuffle_id,
            },
        }
    }
}

/// Serializable summary of a descriptor as it was handed to the transfer layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DescriptorSnapshot {
    pub partition: PartitionId,
    pub splits: Vec<SplitSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SplitSnapshot {
    Narrow {
        input_index: usize,
        source_partition: PartitionId,
        epoch: u64,
    },
    Shuffle {
        shuffle_id: ShuffleId,
    },
}

/// Everything needed to compute one output partition.
pub struct PartitionDescriptor<K, V> {
    id: PartitionId,
    deps: Vec<SplitDependency<K, V>>,
}

impl<K, V> Clone for PartitionDescriptor<K, V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            deps: self.deps.clone(),
        }
    }
}

impl<K, V> PartitionDescriptor<K, V> {
    #[must_use]
    pub fn id(&self) -> PartitionId {
        self.id
    }

    /// One entry per input, in input order.
    #[must_use]
    pub fn deps(&self) -> &[SplitDependency<K, V>] {
        &self.deps
    }

    #[must_use]
    pub fn arity(&self) -> usize {
        self.deps.len()
    }

    /// Shuffle ids this partition reads from.
    pub fn shuffle_ids(&self) -> impl Iterator<Item = ShuffleId> + '_ {
        self.deps.iter().filter_map(|d| match d {
            SplitDependency::Shuffle { shuffle_id } => Some(*shuffle_id),
            SplitDependency::Narrow(_) => None,
        })
    }

    /// Re-resolve every narrow handle to its dataset's current partition, then
    /// return what is being shipped.
    ///
    /// # Errors
    /// Returns [`CoGroupError::StalePartitionReference`] when a source partition
    /// no longer exists; nothing is shipped in that case.
    pub fn prepare_for_transfer(&mut self) -> Result<DescriptorSnapshot> {
        for dep in &mut self.deps {
            if let SplitDependency::Narrow(split) = dep {
                split.refresh()?;
            }
        }
        Ok(self.snapshot())
    }

    #[must_use]
    pub fn snapshot(&self) -> DescriptorSnapshot {
        let splits = self
            .deps
            .iter()
            .map(|d| match d {
                SplitDependency::Narrow(s) => SplitSnapshot::Narrow {
                    input_index: s.input_index,
                    source_partition: s.source_partition.index(),
                    epoch: s.source_partition.epoch(),
                },
                SplitDependency::Shuffle { shuffle_id } => SplitSnapshot::Shuffle {
                    shuffle_id: *shuffle_id,
                },
            })
            .collect();
        DescriptorSnapshot {
            partition: self.id,
            splits,
        }
    }
}

/// Build one descriptor per output partition.
///
/// Narrow handles are looked up here, once per input.
///
/// # Errors
/// Returns [`CoGroupError::StalePartitionReference`] when a narrow input has
/// fewer partitions than `num_partitions`.
pub fn build_descriptors<K, V>(deps: &[Dependency<K, V>], num_partitions: usize) -> Result<Vec<PartitionDescriptor<K, V>>> {
    let handles: Vec<Vec<SourcePartition>> = deps
        .iter()
        .map(|d| match d {
            Dependency::Narrow(ds) => ds.partitions(),
            Dependency::Shuffle { .. } => Vec::new(),
        })
        .collect();

    (0..num_partitions)
        .map(|id| -> Result<PartitionDescriptor<K, V>> {
            let deps = deps
                .iter()
                .zip(&handles)
                .enumerate()
                .map(|(input_index, (dep, handles))| -> Result<SplitDependency<K, V>> {
                    match dep {
                        Dependency::Narrow(ds) => {
                            let source_partition = *handles.get(id).ok_or(CoGroupError::StalePartitionReference {
                                input_index,
                                partition: id,
                                available: handles.len(),
                            })?;
                            Ok(SplitDependency::Narrow(NarrowSplit {
                                input_index,
                                source_partition_id: id,
                                source_partition,
                                dataset: Arc::clone(ds),
                            }))
                        }
                        Dependency::Shuffle { shuffle_id } => Ok(SplitDependency::Shuffle {
                            shuffle_id: *shuffle_id,
                        }),
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(PartitionDescriptor { id, deps })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MemoryDataset;
    use crate::partitioner::ModuloPartitioner;
    use crate::record::Record;

    fn narrow_input() -> Result<Arc<MemoryDataset<u32, String>>> {
        let part = Arc::new(ModuloPartitioner::<u32>::new(2)?);
        Ok(Arc::new(MemoryDataset::partition_by(vec![(1, "a".to_string()), (2, "b".to_string())], part)?))
    }

    #[test]
    fn handles_are_resolved_only_on_transfer() -> Result<()> {
        let ds = narrow_input()?;
        let deps = vec![
            Dependency::Narrow(ds.clone() as Arc<dyn KeyedDataset<u32, String>>),
            Dependency::Shuffle {
                shuffle_id: ShuffleId::new(7),
            },
        ];
        let mut descs = build_descriptors(&deps, 2)?;
        let before = descs[1].snapshot();

        let fresh = ds.replace_partition(1, vec![Record::Decoded(3, "c".to_string())])?;
        assert_eq!(descs[1].snapshot(), before);

        let shipped = descs[1].prepare_for_transfer()?;
        assert_eq!(
            shipped.splits,
            vec![
                SplitSnapshot::Narrow {
                    input_index: 0,
                    source_partition: 1,
                    epoch: fresh.epoch(),
                },
                SplitSnapshot::Shuffle {
                    shuffle_id: ShuffleId::new(7)
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn shrunk_source_is_stale_at_transfer() -> Result<()> {
        let ds = narrow_input()?;
        let deps = vec![Dependency::Narrow(ds.clone() as Arc<dyn KeyedDataset<u32, String>>)];
        let mut descs = build_descriptors(&deps, 2)?;
        ds.set_partitions(vec![vec![]]);
        assert!(descs[0].prepare_for_transfer().is_ok());
        assert!(matches!(
            descs[1].prepare_for_transfer(),
            Err(CoGroupError::StalePartitionReference {
                input_index: 0,
                partition: 1,
                available: 1
            })
        ));
        Ok(())
    }
}

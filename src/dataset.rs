//! Keyed datasets: the input side of a co-group.
//!
//! A [`KeyedDataset`] exposes its current partitioning, handles to its current
//! partitions, and an iterator per partition. Partition handles
//! ([`SourcePartition`]) are snapshots: when a dataset swaps out a partition's
//! contents the handle's epoch goes stale, and reading through it fails with
//! [`CoGroupError::OutdatedPartition`]. Re-resolve handles with
//! [`KeyedDataset::partitions`] right before use.
//!
//! [`MemoryDataset`] is the in-process implementation used by tests and local
//! pipelines.

use crate::context::TaskContext;
use crate::error::{CoGroupError, Result};
use crate::ids::PartitionId;
use crate::partitioner::Partitioner;
use crate::record::Record;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Bound for values flowing through a co-group.
pub trait Data: 'static + Send + Sync + Clone + Debug + Serialize + DeserializeOwned {}
impl<T> Data for T where T: 'static + Send + Sync + Clone + Debug + Serialize + DeserializeOwned {}

/// Bound for keys: [`Data`] that can also key a hash map.
pub trait KeyData: Data + Eq + Hash {}
impl<T> KeyData for T where T: Data + Eq + Hash {}

/// Handle to one partition of a dataset as it existed when the handle was taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct SourcePartition {
    index: PartitionId,
    epoch: u64,
}

impl SourcePartition {
    #[must_use]
    pub fn new(index: PartitionId, epoch: u64) -> Self {
        Self { index, epoch }
    }

    #[must_use]
    pub fn index(&self) -> PartitionId {
        self.index
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

pub type RecordIter<K, V> = Box<dyn Iterator<Item = Result<Record<K, V>>> + Send>;

pub trait KeyedDataset<K, V>: Send + Sync {
    /// Label used in logs and plan explanations.
    fn name(&self) -> &str {
        "dataset"
    }

    /// How the dataset is currently partitioned, if known.
    fn partitioner(&self) -> Option<Arc<dyn Partitioner<K>>>;

    /// Current partition handles, indexed by partition id.
    fn partitions(&self) -> Vec<SourcePartition>;

    fn num_partitions(&self) -> usize {
        self.partitions().len()
    }

    /// Iterate one partition in-process.
    ///
    /// # Errors
    /// Implementations fail when the handle does not refer to a live partition.
    fn iterator(&self, partition: &SourcePartition, ctx: &TaskContext) -> Result<RecordIter<K, V>>;

    /// Run whatever upstream stages must finish before any partition can be
    /// read. Called once per job, before the first [`iterator`](Self::iterator).
    ///
    /// # Errors
    /// Whatever the upstream stages report.
    fn prepare(&self, _ctx: &TaskContext) -> Result<()> {
        Ok(())
    }
}

struct Slot<K, V> {
    epoch: u64,
    records: Arc<Vec<Record<K, V>>>,
}

/// Partitioned in-memory dataset.
///
/// ```
/// use ironbeam_cogroup::dataset::{KeyedDataset, MemoryDataset};
///
/// let ds = MemoryDataset::from_vec(vec![(1u32, "a".to_string()), (2, "b".to_string())], 2);
/// assert_eq!(ds.num_partitions(), 2);
/// assert!(ds.partitioner().is_none());
/// ```
pub struct MemoryDataset<K, V> {
    name: String,
    partitioner: Option<Arc<dyn Partitioner<K>>>,
    slots: RwLock<Vec<Slot<K, V>>>,
    next_epoch: AtomicU64,
}

impl<K: KeyData, V: Data> MemoryDataset<K, V> {
    /// One partition per inner vector; no declared partitioner.
    #[must_use]
    pub fn from_records(partitions: Vec<Vec<Record<K, V>>>) -> Self {
        let slots = partitions
            .into_iter()
            .map(|records| Slot {
                epoch: 0,
                records: Arc::new(records),
            })
            .collect();
        Self {
            name: "memory".to_string(),
            partitioner: None,
            slots: RwLock::new(slots),
            next_epoch: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn from_partitions(partitions: Vec<Vec<(K, V)>>) -> Self {
        Self::from_records(
            partitions
                .into_iter()
                .map(|p| p.into_iter().map(Record::from).collect())
                .collect(),
        )
    }

    /// Split `data` into exactly `slices` contiguous partitions (some may be
    /// empty). Order is preserved within each partition.
    #[must_use]
    pub fn from_vec(data: Vec<(K, V)>, slices: usize) -> Self {
        let slices = slices.max(1);
        let chunk = data.len().div_ceil(slices).max(1);
        let mut it = data.into_iter();
        let parts = (0..slices).map(|_| it.by_ref().take(chunk).collect()).collect();
        Self::from_partitions(parts)
    }

    /// Place every pair in the partition `partitioner` assigns it, and declare
    /// that partitioning. Per-partition order follows input order.
    ///
    /// # Errors
    /// Returns [`CoGroupError::PartitionOutOfRange`] when `partitioner` assigns
    /// a key outside `0..num_partitions()`.
    pub fn partition_by(data: Vec<(K, V)>, partitioner: Arc<dyn Partitioner<K>>) -> Result<Self> {
        let num_partitions = partitioner.num_partitions();
        let mut parts: Vec<Vec<(K, V)>> = (0..num_partitions).map(|_| Vec::new()).collect();
        for (k, v) in data {
            let partition = partitioner.partition(&k);
            parts
                .get_mut(partition)
                .ok_or(CoGroupError::PartitionOutOfRange {
                    partition,
                    num_partitions,
                })?
                .push((k, v));
        }
        Ok(Self::from_partitions(parts).with_partitioner(partitioner))
    }

    /// Declare that the existing partitions already follow `partitioner`.
    #[must_use]
    pub fn with_partitioner(mut self, partitioner: Arc<dyn Partitioner<K>>) -> Self {
        self.partitioner = Some(partitioner);
        self
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Swap one partition's contents. Handles taken earlier become outdated.
    ///
    /// # Errors
    /// Returns [`CoGroupError::PartitionOutOfRange`] for an unknown index.
    pub fn replace_partition(&self, index: PartitionId, records: Vec<Record<K, V>>) -> Result<SourcePartition> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let num_partitions = slots.len();
        let slot = slots.get_mut(index).ok_or(CoGroupError::PartitionOutOfRange {
            partition: index,
            num_partitions,
        })?;
        slot.epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        slot.records = Arc::new(records);
        Ok(SourcePartition::new(index, slot.epoch))
    }

    /// Replace every partition; the partition count may change.
    pub fn set_partitions(&self, partitions: Vec<Vec<Record<K, V>>>) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        *slots = partitions
            .into_iter()
            .map(|records| Slot {
                epoch: self.next_epoch.fetch_add(1, Ordering::Relaxed),
                records: Arc::new(records),
            })
            .collect();
    }
}

impl<K: KeyData, V: Data> KeyedDataset<K, V> for MemoryDataset<K, V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn partitioner(&self) -> Option<Arc<dyn Partitioner<K>>> {
        self.partitioner.clone()
    }

    fn partitions(&self) -> Vec<SourcePartition> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots
            .iter()
            .enumerate()
            .map(|(i, s)| SourcePartition::new(i, s.epoch))
            .collect()
    }

    fn iterator(&self, partition: &SourcePartition, _ctx: &TaskContext) -> Result<RecordIter<K, V>> {
        let records = {
            let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
            let slot = slots.get(partition.index()).ok_or(CoGroupError::PartitionOutOfRange {
                partition: partition.index(),
                num_partitions: slots.len(),
            })?;
            if slot.epoch != partition.epoch() {
                return Err(CoGroupError::OutdatedPartition {
                    partition: partition.index(),
                    held: partition.epoch(),
                    current: slot.epoch,
                });
            }
            Arc::clone(&slot.records)
        };
        Ok(Box::new((0..records.len()).map(move |i| Ok(records[i].clone()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitioner::{ModuloPartitioner, PartitionScheme};

    /// Assigns `k % 2 + 1` while claiming two partitions.
    #[derive(Debug)]
    struct OffByOne;

    impl Partitioner<u32> for OffByOne {
        fn num_partitions(&self) -> usize {
            2
        }

        fn partition(&self, key: &u32) -> PartitionId {
            *key as usize % 2 + 1
        }

        fn scheme(&self) -> PartitionScheme {
            PartitionScheme::Custom {
                name: "off_by_one".into(),
                partitions: 2,
            }
        }
    }

    fn drain(ds: &MemoryDataset<u32, String>, p: &SourcePartition) -> Result<Vec<Record<u32, String>>> {
        ds.iterator(p, &TaskContext::new(p.index()))?.collect()
    }

    #[test]
    fn from_vec_makes_exact_slice_count() {
        let ds = MemoryDataset::from_vec(vec![(1u32, "a".to_string())], 3);
        assert_eq!(ds.num_partitions(), 3);
    }

    #[test]
    fn partition_by_places_keys() -> Result<()> {
        let part = Arc::new(ModuloPartitioner::<u32>::new(2)?);
        let ds = MemoryDataset::partition_by(vec![(1, "a".into()), (2, "b".into()), (3, "c".into())], part)?;
        let p1 = ds.partitions()[1];
        let keys: Vec<u32> = drain(&ds, &p1)?
            .into_iter()
            .filter_map(|r| match r {
                Record::Decoded(k, _) => Some(k),
                Record::Encoded(_) => None,
            })
            .collect();
        assert_eq!(keys, vec![1, 3]);
        Ok(())
    }

    #[test]
    fn partition_by_rejects_out_of_range_ids() {
        let err = MemoryDataset::<u32, String>::partition_by(vec![(0, "a".into()), (1, "b".into())], Arc::new(OffByOne)).err();
        assert!(matches!(
            err,
            Some(CoGroupError::PartitionOutOfRange {
                partition: 2,
                num_partitions: 2
            })
        ));
    }

    #[test]
    fn replaced_partition_outdates_old_handle() -> Result<()> {
        let ds = MemoryDataset::from_partitions(vec![vec![(1u32, "a".to_string())]]);
        let old = ds.partitions()[0];
        let new = ds.replace_partition(0, vec![Record::Decoded(1, "z".to_string())])?;
        assert!(matches!(drain(&ds, &old), Err(CoGroupError::OutdatedPartition { .. })));
        assert_eq!(drain(&ds, &new)?.len(), 1);
        Ok(())
    }
}

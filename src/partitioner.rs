//! Key → partition assignment.
//!
//! A [`Partitioner`] both assigns keys and defines what "already co-partitioned"
//! means: two partitioners are interchangeable exactly when their
//! [`PartitionScheme`]s compare equal (same partition count, same function).

use crate::error::{CoGroupError, Result};
use crate::ids::PartitionId;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::fmt::{Debug, Formatter, Result as FormatResult};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

/// Comparable description of a partitioning function.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum PartitionScheme {
    /// SipHash of the key (seeded) modulo the partition count.
    Hash { partitions: usize, seed: u64 },
    /// Integer key, Euclidean remainder by the partition count.
    Modulo { partitions: usize },
    /// User-supplied function, identified by name.
    Custom { name: String, partitions: usize },
}

impl PartitionScheme {
    #[must_use]
    pub fn num_partitions(&self) -> usize {
        match self {
            Self::Hash { partitions, .. }
            | Self::Modulo { partitions }
            | Self::Custom { partitions, .. } => *partitions,
        }
    }
}

pub trait Partitioner<K>: Send + Sync + Debug {
    fn num_partitions(&self) -> usize;

    /// Partition id for `key`, always in `0..num_partitions()`.
    fn partition(&self, key: &K) -> PartitionId;

    fn scheme(&self) -> PartitionScheme;
}

/// Whether two partitioners place every key identically.
pub fn same_partitioning<K>(a: &dyn Partitioner<K>, b: &dyn Partitioner<K>) -> bool {
    a.num_partitions() == b.num_partitions() && a.scheme() == b.scheme()
}

fn check_partitions(partitions: usize) -> Result<usize> {
    if partitions == 0 {
        return Err(CoGroupError::InvalidPartitionCount);
    }
    Ok(partitions)
}

/// Hash partitioner over any `K: Hash`.
///
/// Uses the std SipHash with fixed keys so placement is stable across runs of
/// the same binary.
pub struct HashPartitioner<K> {
    partitions: usize,
    seed: u64,
    _k: PhantomData<fn(&K)>,
}

impl<K> HashPartitioner<K> {
    /// # Errors
    /// Returns [`CoGroupError::InvalidPartitionCount`] when `partitions` is zero.
    pub fn new(partitions: usize) -> Result<Self> {
        Self::with_seed(partitions, 0)
    }

    /// # Errors
    /// Returns [`CoGroupError::InvalidPartitionCount`] when `partitions` is zero.
    pub fn with_seed(partitions: usize, seed: u64) -> Result<Self> {
        Ok(Self {
            partitions: check_partitions(partitions)?,
            seed,
            _k: PhantomData,
        })
    }
}

impl<K> Debug for HashPartitioner<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.debug_struct("HashPartitioner")
            .field("partitions", &self.partitions)
            .field("seed", &self.seed)
            .finish()
    }
}

impl<K: Hash> Partitioner<K> for HashPartitioner<K> {
    fn num_partitions(&self) -> usize {
        self.partitions
    }

    fn partition(&self, key: &K) -> PartitionId {
        let mut h = DefaultHasher::new();
        self.seed.hash(&mut h);
        key.hash(&mut h);
        (h.finish() % self.partitions as u64) as PartitionId
    }

    fn scheme(&self) -> PartitionScheme {
        PartitionScheme::Hash {
            partitions: self.partitions,
            seed: self.seed,
        }
    }
}

/// `key mod n` for integer keys; negative keys wrap to a non-negative id.
pub struct ModuloPartitioner<K> {
    partitions: usize,
    _k: PhantomData<fn(&K)>,
}

impl<K> ModuloPartitioner<K> {
    /// # Errors
    /// Returns [`CoGroupError::InvalidPartitionCount`] when `partitions` is zero.
    pub fn new(partitions: usize) -> Result<Self> {
        Ok(Self {
            partitions: check_partitions(partitions)?,
            _k: PhantomData,
        })
    }
}

impl<K> Debug for ModuloPartitioner<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.debug_struct("ModuloPartitioner")
            .field("partitions", &self.partitions)
            .finish()
    }
}

impl<K: Copy + Into<i128>> Partitioner<K> for ModuloPartitioner<K> {
    fn num_partitions(&self) -> usize {
        self.partitions
    }

    fn partition(&self, key: &K) -> PartitionId {
        let k: i128 = (*key).into();
        k.rem_euclid(self.partitions as i128) as PartitionId
    }

    fn scheme(&self) -> PartitionScheme {
        PartitionScheme::Modulo {
            partitions: self.partitions,
        }
    }
}

type AssignFn<K> = Arc<dyn Fn(&K) -> PartitionId + Send + Sync>;

/// Partitioner backed by a closure. Two `FnPartitioner`s are considered the
/// same partitioning when their names and partition counts match, so give
/// distinct functions distinct names.
pub struct FnPartitioner<K> {
    name: String,
    partitions: usize,
    assign: AssignFn<K>,
}

impl<K> FnPartitioner<K> {
    /// # Errors
    /// Returns [`CoGroupError::InvalidPartitionCount`] when `partitions` is zero.
    pub fn new<F>(name: impl Into<String>, partitions: usize, assign: F) -> Result<Self>
    where
        F: Fn(&K) -> PartitionId + Send + Sync + 'static,
    {
        Ok(Self {
            name: name.into(),
            partitions: check_partitions(partitions)?,
            assign: Arc::new(assign),
        })
    }
}

impl<K> Debug for FnPartitioner<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.debug_struct("FnPartitioner")
            .field("name", &self.name)
            .field("partitions", &self.partitions)
            .finish_non_exhaustive()
    }
}

impl<K> Partitioner<K> for FnPartitioner<K> {
    fn num_partitions(&self) -> usize {
        self.partitions
    }

    fn partition(&self, key: &K) -> PartitionId {
        // Keeps ids in range even if the closure does not.
        (self.assign)(key) % self.partitions
    }

    fn scheme(&self) -> PartitionScheme {
        PartitionScheme::Custom {
            name: self.name.clone(),
            partitions: self.partitions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modulo_wraps_negative_keys() -> Result<()> {
        let p = ModuloPartitioner::<i64>::new(3)?;
        assert_eq!(p.partition(&-1), 2);
        assert_eq!(p.partition(&7), 1);
        Ok(())
    }

    #[test]
    fn equality_follows_scheme() -> Result<()> {
        let a = HashPartitioner::<String>::new(4)?;
        let b = HashPartitioner::<String>::new(4)?;
        let c = HashPartitioner::<String>::with_seed(4, 9)?;
        let d = HashPartitioner::<String>::new(5)?;
        assert!(same_partitioning::<String>(&a, &b));
        assert!(!same_partitioning::<String>(&a, &c));
        assert!(!same_partitioning::<String>(&a, &d));
        Ok(())
    }

    #[test]
    fn zero_partitions_rejected() {
        assert!(matches!(
            ModuloPartitioner::<u32>::new(0),
            Err(CoGroupError::InvalidPartitionCount)
        ));
    }
}

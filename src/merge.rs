//! Per-partition merge of N inputs into N-bucket groups.
//!
//! [`MergeEngine::compute`] walks a descriptor's dependencies in input order.
//! Narrow entries are iterated in-process (decoding map-side records through
//! the [`RecordDecoder`]); shuffle entries are fetched through the
//! [`ShuffleReader`]. Every value is appended to bucket `i` of its key, where
//! `i` is the input it came from. Nothing is combined, deduplicated or
//! reordered within a bucket.
//!
//! The whole partition is merged before the first group is yielded, so any
//! failure aborts the call and no partial groups escape.

use crate::adapter::RecordDecoder;
use crate::context::TaskContext;
use crate::dataset::{Data, KeyData};
use crate::error::Result;
use crate::serializer::SerializerRegistry;
use crate::shuffle::ShuffleReader;
use crate::split::{PartitionDescriptor, SplitDependency};
use std::collections::HashMap;
use std::collections::hash_map;
use std::hash::Hash;
use std::iter::FusedIterator;
use std::sync::Arc;
use tracing::debug;

/// The values one input contributed for one key, in contribution order.
pub type Bucket<V> = Vec<V>;

/// One output row: a key and one bucket per input.
pub type CoGrouped<K, V> = (K, Vec<Bucket<V>>);

/// Partition-local key → buckets map. Every entry holds exactly `arity` buckets.
pub struct MergeMap<K, V> {
    arity: usize,
    groups: HashMap<K, Vec<Bucket<V>>>,
}

impl<K: Eq + Hash, V> MergeMap<K, V> {
    #[must_use]
    pub fn new(arity: usize) -> Self {
        Self {
            arity,
            groups: HashMap::new(),
        }
    }

    /// Buckets for `key`, created empty on first sight.
    pub fn get_or_create(&mut self, key: K) -> &mut [Bucket<V>] {
        let arity = self.arity;
        self.groups
            .entry(key)
            .or_insert_with(|| (0..arity).map(|_| Vec::new()).collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl<K, V> IntoIterator for MergeMap<K, V> {
    type Item = CoGrouped<K, V>;
    type IntoIter = CoGroupIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        CoGroupIter {
            inner: self.groups.into_iter(),
        }
    }
}

/// Single-pass iterator over a merged partition.
pub struct CoGroupIter<K, V> {
    inner: hash_map::IntoIter<K, Vec<Bucket<V>>>,
}

impl<K, V> Iterator for CoGroupIter<K, V> {
    type Item = CoGrouped<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for CoGroupIter<K, V> {}
impl<K, V> FusedIterator for CoGroupIter<K, V> {}

/// Computes co-grouped partitions from their descriptors.
pub struct MergeEngine<K, V> {
    reader: Arc<dyn ShuffleReader<K, V>>,
    serializers: Arc<SerializerRegistry>,
    serializer: String,
    decoder: RecordDecoder<K, V>,
}

impl<K, V> Clone for MergeEngine<K, V> {
    fn clone(&self) -> Self {
        Self {
            reader: Arc::clone(&self.reader),
            serializers: Arc::clone(&self.serializers),
            serializer: self.serializer.clone(),
            decoder: self.decoder.clone(),
        }
    }
}

impl<K: KeyData, V: Data> MergeEngine<K, V> {
    #[must_use]
    pub fn new(
        reader: Arc<dyn ShuffleReader<K, V>>,
        serializers: Arc<SerializerRegistry>,
        serializer: impl Into<String>,
        decoder: RecordDecoder<K, V>,
    ) -> Self {
        Self {
            reader,
            serializers,
            serializer: serializer.into(),
            decoder,
        }
    }

    /// Name of the serializer shuffle reads are decoded with.
    #[must_use]
    pub fn serializer(&self) -> &str {
        &self.serializer
    }

    /// Merge every input's contribution to `descriptor`'s partition.
    ///
    /// # Errors
    /// Any read, fetch, decode or interrupt failure aborts the whole partition.
    pub fn compute(&self, descriptor: &PartitionDescriptor<K, V>, ctx: &TaskContext) -> Result<CoGroupIter<K, V>> {
        let mut map = MergeMap::new(descriptor.arity());
        let mut seen = 0usize;
        let (mut narrow_records, mut shuffle_records) = (0u64, 0u64);

        for (input, dep) in descriptor.deps().iter().enumerate() {
            ctx.check_interrupted()?;
            match dep {
                SplitDependency::Narrow(split) => {
                    for record in split.dataset().iterator(split.source_partition(), ctx)? {
                        seen += 1;
                        ctx.check_every(seen)?;
                        let (k, v) = self.decoder.decode(record?)?;
                        map.get_or_create(k)[input].push(v);
                        narrow_records += 1;
                    }
                }
                SplitDependency::Shuffle { shuffle_id } => {
                    let encoding = self.serializers.get(&self.serializer)?;
                    let pairs = self
                        .reader
                        .fetch(*shuffle_id, descriptor.id(), ctx.metrics().shuffle_read(), encoding)?;
                    for pair in pairs {
                        seen += 1;
                        ctx.check_every(seen)?;
                        let (k, v) = pair?;
                        map.get_or_create(k)[input].push(v);
                        shuffle_records += 1;
                    }
                }
            }
        }

        ctx.metrics().input().inc_records(narrow_records);
        debug!(
            partition = descriptor.id(),
            keys = map.len(),
            narrow_records,
            shuffle_records,
            "merged partition"
        );
        Ok(map.into_iter())
    }
}

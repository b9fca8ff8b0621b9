//! Shuffle write registration and shuffle reads.
//!
//! The co-group operator only talks to a shuffle through the two traits here.
//! [`LocalShuffleService`] implements both in-process: map outputs are encoded
//! blocks held in memory, one block per (map partition, reduce partition) pair
//! that received any records.
//!
//! The map stage never combines values; every record written is read back
//! unchanged and in map-side order.

use crate::adapter::RecordDecoder;
use crate::context::TaskContext;
use crate::dataset::{Data, KeyData, KeyedDataset};
use crate::error::{CoGroupError, Result};
use crate::ids::{PartitionId, ShuffleId};
use crate::metrics::ShuffleReadMetrics;
use crate::partitioner::Partitioner;
use crate::serializer::Encoding;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

pub trait ShuffleWriter<K, V>: Send + Sync {
    /// Register a write stage that redistributes `input` by `partitioner`.
    /// No map-side aggregation is requested.
    fn register_shuffle_write(
        &self,
        input: Arc<dyn KeyedDataset<K, V>>,
        partitioner: Arc<dyn Partitioner<K>>,
    ) -> Result<ShuffleId>;

    /// Run the map stage of a registered shuffle. Calling it again once the
    /// outputs exist is a no-op.
    fn write_map_outputs(&self, shuffle_id: ShuffleId, ctx: &TaskContext) -> Result<()>;
}

pub type FetchIter<'a, K, V> = Box<dyn Iterator<Item = Result<(K, V)>> + Send + 'a>;

pub trait ShuffleReader<K, V>: Send + Sync {
    /// Read every record the map stage of `shuffle_id` routed to `partition`.
    fn fetch<'a>(
        &self,
        shuffle_id: ShuffleId,
        partition: PartitionId,
        metrics: &'a ShuffleReadMetrics,
        serializer: Encoding,
    ) -> Result<FetchIter<'a, K, V>>;
}

struct Registration<K, V> {
    input: Arc<dyn KeyedDataset<K, V>>,
    partitioner: Arc<dyn Partitioner<K>>,
}

impl<K, V> Clone for Registration<K, V> {
    fn clone(&self) -> Self {
        Self {
            input: Arc::clone(&self.input),
            partitioner: Arc::clone(&self.partitioner),
        }
    }
}

struct MapOutputs {
    encoding: Encoding,
    /// `blocks[reduce]` holds that partition's blocks in map-partition order.
    blocks: Vec<Vec<Arc<[u8]>>>,
}

struct State<K, V> {
    registrations: HashMap<ShuffleId, Registration<K, V>>,
    outputs: HashMap<ShuffleId, Arc<MapOutputs>>,
}

/// In-process shuffle: registration, map stage and block reads.
pub struct LocalShuffleService<K, V> {
    encoding: Encoding,
    decoder: RecordDecoder<K, V>,
    next_id: AtomicU64,
    state: Mutex<State<K, V>>,
}

impl<K: KeyData, V: Data> Default for LocalShuffleService<K, V> {
    fn default() -> Self {
        Self::new(Encoding::Postcard)
    }
}

impl<K: KeyData, V: Data> LocalShuffleService<K, V> {
    /// A service that writes map outputs with `encoding`.
    #[must_use]
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            decoder: RecordDecoder::default(),
            next_id: AtomicU64::new(0),
            state: Mutex::new(State {
                registrations: HashMap::new(),
                outputs: HashMap::new(),
            }),
        }
    }

    /// Decoder used by the map stage for encoded input records.
    #[must_use]
    pub fn with_decoder(mut self, decoder: RecordDecoder<K, V>) -> Self {
        self.decoder = decoder;
        self
    }

    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State<K, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn registered_shuffles(&self) -> usize {
        self.state().registrations.len()
    }

    #[must_use]
    pub fn has_map_outputs(&self, shuffle_id: ShuffleId) -> bool {
        self.state().outputs.contains_key(&shuffle_id)
    }

    /// Drop the map outputs of `shuffle_id`, as if the executors holding them
    /// were lost. Returns whether anything was dropped.
    pub fn unregister_map_outputs(&self, shuffle_id: ShuffleId) -> bool {
        self.state().outputs.remove(&shuffle_id).is_some()
    }

    fn run_map_stage(&self, shuffle_id: ShuffleId, reg: &Registration<K, V>, ctx: &TaskContext) -> Result<MapOutputs> {
        let reduce_partitions = reg.partitioner.num_partitions();
        let mut blocks: Vec<Vec<Arc<[u8]>>> = (0..reduce_partitions).map(|_| Vec::new()).collect();
        let mut written = 0usize;

        reg.input.prepare(ctx)?;
        for handle in reg.input.partitions() {
            let mut buckets: Vec<Vec<(K, V)>> = (0..reduce_partitions).map(|_| Vec::new()).collect();
            let mut read = 0u64;
            for (seen, record) in reg.input.iterator(&handle, ctx)?.enumerate() {
                ctx.check_every(seen)?;
                let (k, v) = self.decoder.decode(record?)?;
                let target = reg.partitioner.partition(&k);
                buckets
                    .get_mut(target)
                    .ok_or(CoGroupError::PartitionOutOfRange {
                        partition: target,
                        num_partitions: reduce_partitions,
                    })?
                    .push((k, v));
                read += 1;
            }
            ctx.metrics().input().inc_records(read);
            for (reduce, rows) in buckets.into_iter().enumerate() {
                if rows.is_empty() {
                    continue;
                }
                written += rows.len();
                blocks[reduce].push(self.encoding.encode(&rows)?.into());
            }
        }

        info!(
            %shuffle_id,
            input = reg.input.name(),
            records = written,
            reduce_partitions,
            "map stage finished"
        );
        Ok(MapOutputs {
            encoding: self.encoding,
            blocks,
        })
    }
}

impl<K: KeyData, V: Data> ShuffleWriter<K, V> for LocalShuffleService<K, V> {
    fn register_shuffle_write(
        &self,
        input: Arc<dyn KeyedDataset<K, V>>,
        partitioner: Arc<dyn Partitioner<K>>,
    ) -> Result<ShuffleId> {
        let id = ShuffleId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(shuffle_id = %id, input = input.name(), partitions = partitioner.num_partitions(), "registered shuffle write");
        self.state()
            .registrations
            .insert(id, Registration { input, partitioner });
        Ok(id)
    }

    fn write_map_outputs(&self, shuffle_id: ShuffleId, ctx: &TaskContext) -> Result<()> {
        let reg = {
            let state = self.state();
            if state.outputs.contains_key(&shuffle_id) {
                return Ok(());
            }
            state
                .registrations
                .get(&shuffle_id)
                .cloned()
                .ok_or(CoGroupError::UnknownShuffle(shuffle_id))?
        };
        // The lock is not held while the map stage runs.
        let outputs = self.run_map_stage(shuffle_id, &reg, ctx)?;
        self.state()
            .outputs
            .entry(shuffle_id)
            .or_insert_with(|| Arc::new(outputs));
        Ok(())
    }
}

impl<K: KeyData, V: Data> ShuffleReader<K, V> for LocalShuffleService<K, V> {
    fn fetch<'a>(
        &self,
        shuffle_id: ShuffleId,
        partition: PartitionId,
        metrics: &'a ShuffleReadMetrics,
        serializer: Encoding,
    ) -> Result<FetchIter<'a, K, V>> {
        let outputs = self
            .state()
            .outputs
            .get(&shuffle_id)
            .cloned()
            .ok_or_else(|| CoGroupError::fetch(shuffle_id, partition, "missing map output"))?;
        if outputs.encoding != serializer {
            return Err(CoGroupError::fetch(
                shuffle_id,
                partition,
                format!("map output written as {}, read as {serializer}", outputs.encoding),
            ));
        }
        let blocks = outputs.blocks.get(partition).cloned().ok_or_else(|| {
            CoGroupError::fetch(
                shuffle_id,
                partition,
                format!("no such reduce partition (0..{})", outputs.blocks.len()),
            )
        })?;
        Ok(Box::new(BlockIter {
            shuffle_id,
            partition,
            encoding: serializer,
            blocks: blocks.into(),
            current: Vec::new().into_iter(),
            metrics,
        }))
    }
}

/// Decodes one block at a time and yields its records.
struct BlockIter<'a, K, V> {
    shuffle_id: ShuffleId,
    partition: PartitionId,
    encoding: Encoding,
    blocks: VecDeque<Arc<[u8]>>,
    current: std::vec::IntoIter<(K, V)>,
    metrics: &'a ShuffleReadMetrics,
}

impl<K: KeyData, V: Data> Iterator for BlockIter<'_, K, V> {
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(pair) = self.current.next() {
                self.metrics.inc_records(1);
                return Some(Ok(pair));
            }
            let block = self.blocks.pop_front()?;
            self.metrics.inc_blocks(1);
            self.metrics.inc_bytes(block.len() as u64);
            match self.encoding.decode::<Vec<(K, V)>>(&block) {
                Ok(rows) => self.current = rows.into_iter(),
                Err(e) => {
                    self.blocks.clear();
                    return Some(Err(CoGroupError::fetch(self.shuffle_id, self.partition, e.to_string())));
                }
            }
        }
    }
}

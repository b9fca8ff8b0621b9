//! Error taxonomy for planning and merging co-grouped partitions.
//!
//! Every failure inside a partition's compute call surfaces as a [`CoGroupError`]
//! and aborts that partition as a whole; no partially filled buckets are ever
//! emitted. Retrying is left to whoever scheduled the task.

use crate::ids::{PartitionId, ShuffleId};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = CoGroupError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum CoGroupError {
    /// A shuffle block for this reduce partition could not be read.
    #[error("fetch failed for {shuffle_id} partition {partition}: {reason}")]
    FetchFailed {
        shuffle_id: ShuffleId,
        partition: PartitionId,
        reason: String,
    },

    /// A narrow split no longer points at an existing source partition.
    #[error(
        "stale partition reference: input {input_index} needs source partition {partition}, \
         but only {available} exist"
    )]
    StalePartitionReference {
        input_index: usize,
        partition: PartitionId,
        available: usize,
    },

    /// A partition handle was read after its data had been replaced.
    #[error("partition {partition} was replaced (handle epoch {held}, current epoch {current})")]
    OutdatedPartition {
        partition: PartitionId,
        held: u64,
        current: u64,
    },

    /// An encoded record declares a key type that is not the operator's key type.
    #[error("key type mismatch: expected `{expected}`, record carries `{found}`")]
    KeyTypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("no serializer registered under `{0}`")]
    UnknownSerializer(String),

    #[error("no key adapter accepts records encoded as {0}")]
    NoAdapter(&'static str),

    #[error("failed to decode {encoding} payload: {reason}")]
    Decode {
        encoding: &'static str,
        reason: String,
    },

    #[error("failed to encode {encoding} payload: {reason}")]
    Encode {
        encoding: &'static str,
        reason: String,
    },

    #[error("task for partition {0} was killed")]
    TaskKilled(PartitionId),

    #[error("co-group needs at least one input")]
    NoInputs,

    #[error("partitioner must have at least one partition")]
    InvalidPartitionCount,

    #[error("partition {partition} out of range (0..{num_partitions})")]
    PartitionOutOfRange {
        partition: PartitionId,
        num_partitions: usize,
    },

    /// Planning was requested after the operator released its inputs.
    #[error("dependencies were cleared; the operator can no longer plan")]
    TornDown,

    #[error("{0} was never registered")]
    UnknownShuffle(ShuffleId),

    #[error("expected {expected} buckets per key, found {found}")]
    ArityMismatch { expected: usize, found: usize },
}

impl CoGroupError {
    pub(crate) fn fetch(shuffle_id: ShuffleId, partition: PartitionId, reason: impl Into<String>) -> Self {
        Self::FetchFailed {
            shuffle_id,
            partition,
            reason: reason.into(),
        }
    }

    /// Whether the failure came from reading shuffle output, which a scheduler
    /// typically answers by re-running the map stage.
    #[must_use]
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::FetchFailed { .. })
    }
}

//! Small identifiers shared by planning, shuffle and merge code.
//!
//! Shuffle ids are handed out sequentially by a shuffle writer. They're `Copy`
//! and hashable so they can key block stores and sets of pending map stages.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FormatResult};

/// Index of a partition, `0 <= id < num_partitions`.
pub type PartitionId = usize;

/// Unique identifier of a registered shuffle write stage.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct ShuffleId(u64);

impl ShuffleId {
    /// Create a new `ShuffleId`.
    #[must_use]
    pub fn new(v: u64) -> Self {
        Self(v)
    }

    /// Return the underlying numeric value.
    #[must_use]
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Display for ShuffleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        write!(f, "shuffle#{}", self.0)
    }
}

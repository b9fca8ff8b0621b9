//! Testing utilities for co-group jobs.
//!
//! Co-grouped output has no defined order: keys come out of a hash map and
//! partitions may finish in any order. The helpers here normalize rows before
//! comparing them.
//!
//! - [`sorted_rows`]: sort rows by key (bucket contents are left untouched)
//! - [`assert_cogroup_eq`]: compare two row sets ignoring key order
//! - [`scenario_inputs`]: the two-input fixture used throughout the docs
//!
//! ```
//! use ironbeam_cogroup::testing::*;
//! use ironbeam_cogroup::*;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let (inputs, target) = scenario_inputs()?;
//! let op = CoGroupedDataset::new(inputs, target, CoGroupEnv::local(Arc::new(LocalShuffleService::default())))?;
//! assert_cogroup_eq(
//!     Runner::default().collect(&op)?,
//!     vec![
//!         (1, vec![vec!["a".to_string()], vec!["x".to_string(), "y".to_string()]]),
//!         (2, vec![vec!["b".to_string()], vec![]]),
//!     ],
//! );
//! # Ok(())
//! # }
//! ```

use crate::dataset::{KeyedDataset, MemoryDataset};
use crate::error::Result;
use crate::merge::CoGrouped;
use crate::partitioner::{ModuloPartitioner, Partitioner};
use std::fmt::Debug;
use std::sync::Arc;

/// Rows ordered by key.
#[must_use]
pub fn sorted_rows<K: Ord, V>(mut rows: Vec<CoGrouped<K, V>>) -> Vec<CoGrouped<K, V>> {
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    rows
}

/// Assert that two co-group results hold the same rows, ignoring key order.
/// Bucket contents are compared in order.
///
/// # Panics
///
/// Panics if the key sets differ or any key's buckets differ.
pub fn assert_cogroup_eq<K, V>(actual: Vec<CoGrouped<K, V>>, expected: Vec<CoGrouped<K, V>>)
where
    K: Ord + Debug,
    V: PartialEq + Debug,
{
    let actual = sorted_rows(actual);
    let expected = sorted_rows(expected);
    let actual_keys: Vec<&K> = actual.iter().map(|(k, _)| k).collect();
    let expected_keys: Vec<&K> = expected.iter().map(|(k, _)| k).collect();
    assert_eq!(
        actual_keys, expected_keys,
        "Key set mismatch:\n  Expected: {expected_keys:?}\n  Actual: {actual_keys:?}"
    );
    for ((k, a), (_, e)) in actual.iter().zip(&expected) {
        assert_eq!(a, e, "Buckets differ for key {k:?}:\n  Expected: {e:?}\n  Actual: {a:?}");
    }
}

/// Two unpartitioned inputs and a modulo-2 target.
///
/// Input A holds `(1, "a"), (2, "b")`; input B holds `(1, "x"), (1, "y")`.
///
/// # Errors
///
/// Never in practice; the partitioner constructor is fallible.
#[allow(clippy::type_complexity)]
pub fn scenario_inputs() -> Result<(Vec<Arc<dyn KeyedDataset<u32, String>>>, Arc<dyn Partitioner<u32>>)> {
    let a = MemoryDataset::from_vec(vec![(1u32, "a".to_string()), (2, "b".to_string())], 1).named("A");
    let b = MemoryDataset::from_vec(vec![(1u32, "x".to_string()), (1, "y".to_string())], 1).named("B");
    let inputs: Vec<Arc<dyn KeyedDataset<u32, String>>> = vec![Arc::new(a), Arc::new(b)];
    let target: Arc<dyn Partitioner<u32>> = Arc::new(ModuloPartitioner::<u32>::new(2)?);
    Ok((inputs, target))
}

//! Join helpers built on top of co-grouped rows.
//!
//! Each helper consumes the `(K, buckets)` rows a co-group produces and expands
//! every key's buckets into joined rows. They work on any row source: the rows
//! of one partition, or everything a [`Runner`](crate::runner::Runner) collected.
//!
//! ## Available operations
//! - [`inner`] - N-way inner join: the cartesian product of all buckets
//! - [`left_outer`] - 2-way left outer join
//! - [`full_outer`] - 2-way full outer join
//!
//! Ordering of output rows follows the input rows; within a key, the left
//! bucket varies slowest.
//!
//! ```
//! use ironbeam_cogroup::joins;
//!
//! # fn main() -> ironbeam_cogroup::Result<()> {
//! let rows = vec![
//!     (1u32, vec![vec!["a"], vec!["x", "y"]]),
//!     (2u32, vec![vec!["b"], vec![]]),
//! ];
//! assert_eq!(joins::inner(rows.clone())?, vec![(1, vec!["a", "x"]), (1, vec!["a", "y"])]);
//! assert_eq!(joins::left_outer(rows)?.len(), 3);
//! # Ok(())
//! # }
//! ```

use crate::error::{CoGroupError, Result};
use crate::merge::{Bucket, CoGrouped};

fn check_arity(expected: usize, buckets: &[Bucket<impl Sized>]) -> Result<()> {
    if buckets.len() != expected {
        return Err(CoGroupError::ArityMismatch {
            expected,
            found: buckets.len(),
        });
    }
    Ok(())
}

/// One row per combination of values across all buckets of a key. Keys with
/// any empty bucket produce nothing.
///
/// # Errors
/// [`CoGroupError::ArityMismatch`] if rows disagree on their bucket count.
pub fn inner<K: Clone, V: Clone>(rows: impl IntoIterator<Item = CoGrouped<K, V>>) -> Result<Vec<(K, Vec<V>)>> {
    let mut arity = None;
    let mut out = Vec::new();
    for (k, buckets) in rows {
        check_arity(*arity.get_or_insert(buckets.len()), &buckets)?;
        let mut combos: Vec<Vec<V>> = vec![Vec::new()];
        for bucket in &buckets {
            combos = combos
                .iter()
                .flat_map(|prefix| {
                    bucket.iter().map(move |v| {
                        let mut row = prefix.clone();
                        row.push(v.clone());
                        row
                    })
                })
                .collect();
        }
        out.extend(combos.into_iter().map(|combo| (k.clone(), combo)));
    }
    Ok(out)
}

/// Every left value, paired with each right value or `None` when the key has
/// no right values.
///
/// # Errors
/// [`CoGroupError::ArityMismatch`] unless every row has exactly two buckets.
pub fn left_outer<K: Clone, V: Clone>(
    rows: impl IntoIterator<Item = CoGrouped<K, V>>,
) -> Result<Vec<(K, (V, Option<V>))>> {
    let mut out = Vec::new();
    for (k, buckets) in rows {
        check_arity(2, &buckets)?;
        let (left, right) = (&buckets[0], &buckets[1]);
        for v in left {
            if right.is_empty() {
                out.push((k.clone(), (v.clone(), None)));
            }
            for w in right {
                out.push((k.clone(), (v.clone(), Some(w.clone()))));
            }
        }
    }
    Ok(out)
}

/// Like [`left_outer`], but right values without a left match are kept too.
///
/// # Errors
/// [`CoGroupError::ArityMismatch`] unless every row has exactly two buckets.
pub fn full_outer<K: Clone, V: Clone>(
    rows: impl IntoIterator<Item = CoGrouped<K, V>>,
) -> Result<Vec<(K, (Option<V>, Option<V>))>> {
    let mut out = Vec::new();
    for (k, buckets) in rows {
        check_arity(2, &buckets)?;
        let (left, right) = (&buckets[0], &buckets[1]);
        match (left.is_empty(), right.is_empty()) {
            (true, true) => {}
            (false, true) => out.extend(left.iter().map(|v| (k.clone(), (Some(v.clone()), None)))),
            (true, false) => out.extend(right.iter().map(|w| (k.clone(), (None, Some(w.clone()))))),
            (false, false) => {
                for v in left {
                    for w in right {
                        out.push((k.clone(), (Some(v.clone()), Some(w.clone()))));
                    }
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_is_cartesian_over_three_inputs() -> Result<()> {
        let rows = vec![("k", vec![vec![1, 2], vec![3], vec![4, 5]])];
        let out = inner(rows)?;
        assert_eq!(
            out,
            vec![
                ("k", vec![1, 3, 4]),
                ("k", vec![1, 3, 5]),
                ("k", vec![2, 3, 4]),
                ("k", vec![2, 3, 5]),
            ]
        );
        Ok(())
    }

    #[test]
    fn outer_joins_need_two_buckets() {
        let rows = vec![("k", vec![vec![1], vec![2], vec![3]])];
        assert!(matches!(
            left_outer(rows.clone()),
            Err(CoGroupError::ArityMismatch { expected: 2, found: 3 })
        ));
        assert!(full_outer(rows).is_err());
    }

    #[test]
    fn inner_rejects_mixed_arity() {
        let rows = vec![("a", vec![vec![1], vec![2]]), ("b", vec![vec![1]])];
        assert!(inner(rows).is_err());
    }
}

//! Uniform row sampling.

use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

use crate::core::value::RowSet;

/// Seed for a table's sample within one run.
///
/// Derived from the execution id so reruns of the same execution draw the
/// same rows, while different runs draw different ones.
pub fn derive_seed(execution_id: &str, table: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(execution_id.as_bytes());
    hasher.update(table.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Rows kept for a given total and percentage: `round(total * pct / 100)`,
/// at least one row of a non-empty set.
pub fn sample_size(total: usize, pct: f64) -> usize {
    if total == 0 {
        return 0;
    }
    let n = (total as f64 * pct / 100.0).round() as usize;
    n.clamp(1, total)
}

/// Keep a uniform random subset of rows, preserving their order.
pub fn sample_rows(mut rows: RowSet, pct: f64, seed: u64) -> RowSet {
    let total = rows.len();
    let keep = sample_size(total, pct);
    if keep >= total {
        return rows;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut picked = index::sample(&mut rng, total, keep).into_vec();
    picked.sort_unstable();

    let mut selected = Vec::with_capacity(keep);
    let mut next = picked.into_iter().peekable();
    for (i, row) in rows.rows.drain(..).enumerate() {
        if next.peek() == Some(&i) {
            selected.push(row);
            next.next();
        }
    }
    RowSet::new(rows.columns, selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::SqlValue;

    fn numbered(n: i64) -> RowSet {
        RowSet::new(
            vec!["id".into()],
            (1..=n).map(|i| vec![SqlValue::I64(i)]).collect(),
        )
    }

    fn ids(rows: &RowSet) -> Vec<i64> {
        rows.rows.iter().filter_map(|r| r[0].as_i64()).collect()
    }

    #[test]
    fn test_sample_size() {
        assert_eq!(sample_size(0, 50.0), 0);
        assert_eq!(sample_size(10, 10.0), 1);
        assert_eq!(sample_size(10, 1.0), 1);
        assert_eq!(sample_size(10, 25.0), 3);
        assert_eq!(sample_size(10, 100.0), 10);
    }

    #[test]
    fn test_sample_preserves_order_and_size() {
        let sampled = sample_rows(numbered(100), 20.0, 9);
        let kept = ids(&sampled);
        assert_eq!(kept.len(), 20);
        assert!(kept.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_same_seed_same_sample() {
        let a = ids(&sample_rows(numbered(50), 30.0, 1234));
        let b = ids(&sample_rows(numbered(50), 30.0, 1234));
        assert_eq!(a, b);
    }

    #[test]
    fn test_full_percentage_keeps_everything() {
        let rows = numbered(5);
        assert_eq!(sample_rows(rows.clone(), 100.0, 1), rows);
    }

    #[test]
    fn test_derive_seed_depends_on_table() {
        assert_eq!(derive_seed("run", "a"), derive_seed("run", "a"));
        assert_ne!(derive_seed("run", "a"), derive_seed("run", "b"));
    }
}

//! Fractional ranking keys for draggable lists.
//!
//! Each task carries a floating-point `order` key scoped to its bucket
//! (owner, date, quadrant). Appending takes `max + GAP`, inserting at the
//! head takes `min - GAP`, and dropping between two neighbors takes their
//! arithmetic mean, so a drag never renumbers the rest of the bucket.
//! Keys are never compared across buckets.
//!
//! Midpoint insertion eventually runs out of float precision, and long
//! one-sided inserts grow without bound; [`needs_rebalance`] detects both
//! and the caller renumbers the bucket with [`rebalanced`].

/// Spacing between freshly assigned keys.
pub const ORDER_GAP: f64 = 1000.0;

/// Magnitude past which a bucket is renumbered.
pub const ORDER_BOUND: f64 = 1_000_000.0;

/// Neighbors closer than this are considered numerically
/// indistinguishable.
pub const MIN_SEPARATION: f64 = 1e-6;

/// Key for appending to a bucket. `keys` must be sorted ascending.
pub fn append_key(keys: &[f64]) -> f64 {
    match keys.last() {
        Some(max) => max + ORDER_GAP,
        None => ORDER_GAP,
    }
}

/// Key for inserting at the head of a bucket. `keys` must be sorted
/// ascending.
pub fn head_key(keys: &[f64]) -> f64 {
    match keys.first() {
        Some(min) => min - ORDER_GAP,
        None => ORDER_GAP,
    }
}

/// Key for inserting between two neighbors.
pub fn between_key(before: f64, after: f64) -> f64 {
    (before + after) / 2.0
}

/// Compute the key for dropping a record at `index` within a bucket.
///
/// `keys` are the bucket's current keys sorted ascending; `None` or an
/// out-of-range index means "append at the end", mirroring how a drag
/// target past the last row behaves.
pub fn place_key(keys: &[f64], index: Option<usize>) -> f64 {
    match index {
        _ if keys.is_empty() => ORDER_GAP,
        Some(0) => head_key(keys),
        Some(i) if i < keys.len() => between_key(keys[i - 1], keys[i]),
        _ => append_key(keys),
    }
}

/// Whether assigning `key` between the given neighbors degenerates the
/// bucket: the magnitude escaped the bound, or the key is no longer
/// distinguishable from a neighbor.
pub fn needs_rebalance(key: f64, before: Option<f64>, after: Option<f64>) -> bool {
    if key.abs() > ORDER_BOUND {
        return true;
    }
    let too_close = |neighbor: f64| (key - neighbor).abs() < MIN_SEPARATION;
    before.is_some_and(too_close) || after.is_some_and(too_close)
}

/// Fresh keys for a bucket of `len` records: `GAP, 2*GAP, ...` in
/// current sorted order. Idempotent and order-preserving by construction.
pub fn rebalanced(len: usize) -> impl Iterator<Item = f64> {
    (1..=len).map(|i| i as f64 * ORDER_GAP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bucket_starts_at_gap() {
        assert_eq!(append_key(&[]), ORDER_GAP);
        assert_eq!(head_key(&[]), ORDER_GAP);
        assert_eq!(place_key(&[], Some(0)), ORDER_GAP);
    }

    #[test]
    fn append_and_head() {
        let keys = [1000.0, 2000.0, 3000.0];
        assert_eq!(append_key(&keys), 4000.0);
        assert_eq!(head_key(&keys), 0.0);
    }

    #[test]
    fn between_is_midpoint() {
        assert_eq!(between_key(1000.0, 2000.0), 1500.0);
    }

    #[test]
    fn place_key_positions() {
        let keys = [1000.0, 2000.0, 3000.0];
        assert_eq!(place_key(&keys, Some(0)), 0.0);
        assert_eq!(place_key(&keys, Some(1)), 1500.0);
        assert_eq!(place_key(&keys, Some(3)), 4000.0);
        assert_eq!(place_key(&keys, None), 4000.0);
        assert_eq!(place_key(&keys, Some(99)), 4000.0);
    }

    #[test]
    fn head_inserts_strictly_decrease() {
        let mut keys: Vec<f64> = Vec::new();
        let mut produced = Vec::new();
        for _ in 0..20 {
            let key = place_key(&keys, Some(0));
            produced.push(key);
            keys.insert(0, key);
        }
        assert!(produced.windows(2).all(|w| w[1] < w[0]));
    }

    #[test]
    fn degeneracy_detection() {
        assert!(needs_rebalance(ORDER_BOUND + 1.0, None, None));
        assert!(needs_rebalance(-ORDER_BOUND - 1.0, None, None));
        assert!(!needs_rebalance(500.0, Some(0.0), Some(1000.0)));

        // Midpoint collapsed onto its neighbor.
        let a = 1000.0;
        let b = 1000.0 + 1e-9;
        assert!(needs_rebalance(between_key(a, b), Some(a), Some(b)));
    }

    #[test]
    fn rebalanced_sequence() {
        let keys: Vec<f64> = rebalanced(4).collect();
        assert_eq!(keys, vec![1000.0, 2000.0, 3000.0, 4000.0]);

        // Idempotent: renumbering an already renumbered bucket is a fixpoint.
        let again: Vec<f64> = rebalanced(keys.len()).collect();
        assert_eq!(again, keys);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn rebalance_preserves_relative_order(len in 1usize..200) {
                let keys: Vec<f64> = rebalanced(len).collect();
                prop_assert_eq!(keys.len(), len);
                prop_assert!(keys.windows(2).all(|w| w[0] < w[1]));
                prop_assert_eq!(keys[0], ORDER_GAP);
                prop_assert_eq!(keys[len - 1], len as f64 * ORDER_GAP);
            }

            #[test]
            fn between_stays_between(a in -1_000_000.0f64..1_000_000.0, delta in 1.0f64..10_000.0) {
                let b = a + delta;
                let mid = between_key(a, b);
                prop_assert!(mid > a && mid < b);
            }
        }
    }
}

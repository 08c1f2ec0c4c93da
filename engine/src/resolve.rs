//! Conflict resolution between a local record and its remote counterpart.
//!
//! Record-granularity last-writer-wins: the copy with the higher version
//! replaces the other wholesale, ties broken by `updatedAt`. No
//! field-level merge is attempted. The function is total, deterministic,
//! and side-effect free; the pull pipeline calls it for every remote
//! record that has a local counterpart.

use crate::record::Syncable;

/// Which copy of a record survives reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Keep the local copy; the remote update is discarded and will be
    /// reconciled by a future push from this device.
    LocalWins,
    /// Adopt the remote copy, marked synced.
    RemoteWins,
}

/// Decide which of two versions of a record wins.
///
/// With no local counterpart the remote record is adopted. Otherwise the
/// remote wins iff its version is strictly greater, or the versions are
/// equal and its `updatedAt` is strictly newer. Exact ties resolve to
/// [`Resolution::LocalWins`] so an identical copy never causes a write.
pub fn resolve<R: Syncable>(local: Option<&R>, remote: &R) -> Resolution {
    let Some(local) = local else {
        return Resolution::RemoteWins;
    };

    if remote.version() > local.version()
        || (remote.version() == local.version() && remote.updated_at() > local.updated_at())
    {
        Resolution::RemoteWins
    } else {
        Resolution::LocalWins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Quadrant, SyncState, Task};

    fn task(version: u64, updated_at: u64) -> Task {
        let mut t = Task::new("user-1", "Fix bug", Quadrant::Q1, "2024-03-01", 1000.0, 500);
        t.version = version;
        t.updated_at = updated_at;
        t
    }

    #[test]
    fn missing_local_adopts_remote() {
        let remote = task(1, 1000);
        assert_eq!(resolve::<Task>(None, &remote), Resolution::RemoteWins);
    }

    #[test]
    fn higher_version_dominates_timestamp() {
        // Remote has the higher version even though its clock reads older.
        let local = task(2, 2000);
        let remote = task(3, 1000);
        assert_eq!(resolve(Some(&local), &remote), Resolution::RemoteWins);

        let local = task(3, 1000);
        let remote = task(2, 2000);
        assert_eq!(resolve(Some(&local), &remote), Resolution::LocalWins);
    }

    #[test]
    fn equal_version_newer_timestamp_wins() {
        let local = task(2, 2000);
        let remote = task(2, 3000);
        assert_eq!(resolve(Some(&local), &remote), Resolution::RemoteWins);

        let remote = task(2, 1000);
        assert_eq!(resolve(Some(&local), &remote), Resolution::LocalWins);
    }

    #[test]
    fn exact_tie_keeps_local() {
        let local = task(2, 2000);
        let remote = task(2, 2000);
        assert_eq!(resolve(Some(&local), &remote), Resolution::LocalWins);
    }

    #[test]
    fn dirty_local_with_higher_version_survives() {
        let mut local = task(5, 2000);
        local.sync_state = SyncState::Updated;
        let remote = task(4, 9000);
        assert_eq!(resolve(Some(&local), &remote), Resolution::LocalWins);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn resolve_is_total_and_deterministic(
                lv in 1u64..50,
                lt in 0u64..10_000,
                rv in 1u64..50,
                rt in 0u64..10_000,
            ) {
                let local = task(lv, lt);
                let remote = task(rv, rt);

                let first = resolve(Some(&local), &remote);
                let second = resolve(Some(&local), &remote);
                prop_assert_eq!(first, second);
            }

            #[test]
            fn at_most_one_side_wins_both_directions(
                lv in 1u64..50,
                lt in 0u64..10_000,
                rv in 1u64..50,
                rt in 0u64..10_000,
            ) {
                // If the copies differ in (version, updatedAt), swapping the
                // sides must flip the outcome; only exact ties are sticky.
                let a = task(lv, lt);
                let b = task(rv, rt);

                let forward = resolve(Some(&a), &b);
                let backward = resolve(Some(&b), &a);

                if (lv, lt) == (rv, rt) {
                    prop_assert_eq!(forward, Resolution::LocalWins);
                    prop_assert_eq!(backward, Resolution::LocalWins);
                } else {
                    prop_assert_ne!(forward, backward);
                }
            }
        }
    }
}

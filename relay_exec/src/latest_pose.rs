//! # Latest-pose store
//!
//! Single-slot register holding the most recent pose received from the tracker. There is no
//! queue: every write overwrites the slot and stale values are discarded, reads take a snapshot
//! copy. All locking for the slot lives behind this interface, so the mutual-exclusion
//! discipline is enforced at one choke point. The store stays correct if the tracker pump is
//! ever moved onto its own thread.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{Arc, Mutex};

use crate::pose::Pose;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Concurrency-safe store for the most recent pose.
///
/// Clones share the same underlying slot: the tracker client holds one handle for writing and
/// the scheduler another for reading.
#[derive(Clone, Debug, Default)]
pub struct LatestPoseStore {
    slot: Arc<Mutex<Option<Pose>>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LatestPoseStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held pose with the given one.
    pub fn write(&self, pose: Pose) {
        let mut slot = self
            .slot
            .lock()
            .expect("LatestPoseStore: slot mutex poisoned");

        *slot = Some(pose);
    }

    /// Get a copy of the most recent pose, or `None` if no pose has ever been written.
    pub fn latest(&self) -> Option<Pose> {
        *self
            .slot
            .lock()
            .expect("LatestPoseStore: slot mutex poisoned")
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;

    /// A pose whose every field encodes the same marker value.
    fn marker_pose(v: f64) -> Pose {
        Pose {
            timestamp_s: v,
            position_m: [v; 3],
            attitude_rpy_rad: [v; 3],
        }
    }

    #[test]
    fn test_empty_store_reads_none() {
        let store = LatestPoseStore::new();
        assert_eq!(store.latest(), None);
    }

    #[test]
    fn test_write_then_read() {
        let store = LatestPoseStore::new();
        let pose = marker_pose(1.0);

        store.write(pose);
        assert_eq!(store.latest(), Some(pose));

        // Reading does not consume the value
        assert_eq!(store.latest(), Some(pose));
    }

    #[test]
    fn test_overwrite_discards_previous() {
        let store = LatestPoseStore::new();

        store.write(marker_pose(1.0));
        store.write(marker_pose(2.0));

        assert_eq!(store.latest(), Some(marker_pose(2.0)));
    }

    #[test]
    fn test_concurrent_reads_never_tear() {
        let store = LatestPoseStore::new();
        store.write(marker_pose(0.0));

        let writer_store = store.clone();
        let writer = thread::spawn(move || {
            for i in 1..=1000 {
                writer_store.write(marker_pose(i as f64));
            }
        });

        // Every snapshot must be internally consistent: all fields carry the same marker
        for _ in 0..1000 {
            let pose = store.latest().unwrap();
            let v = pose.timestamp_s;
            assert_eq!(pose.position_m, [v; 3]);
            assert_eq!(pose.attitude_rpy_rad, [v; 3]);
        }

        writer.join().unwrap();
        assert_eq!(store.latest(), Some(marker_pose(1000.0)));
    }
}

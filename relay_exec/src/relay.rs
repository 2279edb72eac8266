//! # Relay Scheduler
//!
//! Drives the relay loop at the configured publish rate. Each cycle pumps the tracker client,
//! reads the freshest pose from the store and, if one has ever arrived, hands it to the
//! publisher. The remainder of the cycle period is then slept off.
//!
//! The rate is best effort: the sleep is computed from the elapsed time of the current iteration
//! only, so a cycle that overruns is followed immediately by the next one and drift is not
//! corrected against a fixed schedule origin.
//!
//! Shutdown is cooperative. A [`CancelToken`] (set from the process signal handler) is checked
//! at iteration boundaries and inside the sleep, which is sliced so cancellation stays prompt
//! even at low publish rates.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use crate::latest_pose::LatestPoseStore;
use crate::publisher::{PosePublisher, PublisherError};
use crate::tracker_client::{EventPump, TrackerClientError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Longest single sleep while waiting out the cycle period, so cancellation stays prompt.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Cooperative cancellation flag.
///
/// Clones share the flag. Setting it is safe from any thread, including a signal handler.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

/// Fixed-rate scheduler for the pump -> read -> publish cycle.
pub struct RelayScheduler {
    /// Target period of one cycle
    period: Duration,

    /// Cancellation flag, checked at cycle boundaries and during the sleep
    cancel: CancelToken,

    /// Number of cycles already executed
    num_cycles: u64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which abort the relay loop.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Tracker client error: {0}")]
    Tracker(#[from] TrackerClientError),

    #[error("Publisher error: {0}")]
    Publisher(#[from] PublisherError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// True once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl RelayScheduler {
    /// Create a scheduler publishing at the given rate.
    ///
    /// The rate must be positive and finite; callers validate it before construction.
    pub fn new(publish_rate_hz: f64, cancel: CancelToken) -> Self {
        Self {
            period: Duration::from_secs_f64(1.0 / publish_rate_hz),
            cancel,
            num_cycles: 0,
        }
    }

    /// Run the relay loop until cancelled or until a fatal error occurs.
    ///
    /// Before the first sample arrives, cycles publish nothing - that is not an error. Once a
    /// pose is in the store it is published every cycle, so the same pose is re-published on
    /// consecutive cycles when no new sample arrives. Pump and publisher errors abort the loop;
    /// cancellation returns `Ok`.
    pub fn run<E, P>(
        &mut self,
        pump: &mut E,
        store: &LatestPoseStore,
        publisher: &mut P,
    ) -> Result<(), RelayError>
    where
        E: EventPump,
        P: PosePublisher,
    {
        while !self.cancel.is_cancelled() {
            let cycle_start = Instant::now();

            // Process whatever the tracker source has delivered since the last cycle
            pump.pump_once()?;

            // Forward the freshest pose, if any has ever arrived
            if let Some(pose) = store.latest() {
                publisher.send(&pose)?;
            }

            self.num_cycles += 1;

            // Cycle management: sleep off the rest of the period, or continue straight away if
            // the cycle overran
            let cycle_dur = cycle_start.elapsed();
            match self.period.checked_sub(cycle_dur) {
                Some(remaining) => self.sleep_cancellable(remaining),
                None => warn!(
                    "Cycle overran by {:.6} s",
                    (cycle_dur - self.period).as_secs_f64()
                ),
            }
        }

        info!("Relay stopped after {} cycles", self.num_cycles);

        Ok(())
    }

    /// Sleep for the given duration in short slices, returning early once cancelled.
    fn sleep_cancellable(&self, duration: Duration) {
        let deadline = Instant::now() + duration;

        while !self.cancel.is_cancelled() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }

            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::pose::Pose;
    use comms_if::mocap::TrackerSample;

    /// Event pump stub: on each call optionally writes the next scripted pose to the store.
    /// Cancellation is requested while the last entry is pumped, so a script of N entries runs
    /// exactly N cycles.
    struct ScriptedPump {
        store: LatestPoseStore,
        script: Vec<Option<Pose>>,
        calls: usize,
        cancel: CancelToken,
    }

    impl ScriptedPump {
        fn new(store: LatestPoseStore, script: Vec<Option<Pose>>, cancel: CancelToken) -> Self {
            Self {
                store,
                script,
                calls: 0,
                cancel,
            }
        }
    }

    impl EventPump for ScriptedPump {
        fn pump_once(&mut self) -> Result<(), TrackerClientError> {
            if let Some(Some(pose)) = self.script.get(self.calls) {
                self.store.write(*pose);
            }

            self.calls += 1;
            if self.calls >= self.script.len() {
                self.cancel.cancel();
            }

            Ok(())
        }
    }

    /// Publisher stub recording every pose it is handed.
    #[derive(Default)]
    struct RecordingPublisher {
        sent: Vec<Pose>,
    }

    impl PosePublisher for RecordingPublisher {
        fn send(&mut self, pose: &Pose) -> Result<(), PublisherError> {
            self.sent.push(*pose);
            Ok(())
        }
    }

    /// Publisher stub failing on every send.
    struct FailingPublisher;

    impl PosePublisher for FailingPublisher {
        fn send(&mut self, _pose: &Pose) -> Result<(), PublisherError> {
            Err(PublisherError::ConnectError(
                "udpout:127.0.0.1:14550".into(),
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, "link down"),
            ))
        }
    }

    fn pose_at(timestamp_s: f64) -> Pose {
        Pose {
            timestamp_s,
            position_m: [1.0, 2.0, 3.0],
            attitude_rpy_rad: [0.0, 0.0, 0.0],
        }
    }

    #[test]
    fn test_no_publish_before_first_sample() {
        let store = LatestPoseStore::new();
        let cancel = CancelToken::new();
        let mut pump =
            ScriptedPump::new(store.clone(), vec![None, None, None], cancel.clone());
        let mut publisher = RecordingPublisher::default();

        RelayScheduler::new(1000.0, cancel)
            .run(&mut pump, &store, &mut publisher)
            .unwrap();

        assert!(publisher.sent.is_empty());
    }

    #[test]
    fn test_republishes_stale_pose() {
        let store = LatestPoseStore::new();
        let cancel = CancelToken::new();

        // One sample on the first cycle, nothing after: the pose must go out every cycle
        let script = vec![Some(pose_at(10.0)), None, None];
        let mut pump = ScriptedPump::new(store.clone(), script, cancel.clone());
        let mut publisher = RecordingPublisher::default();

        RelayScheduler::new(1000.0, cancel)
            .run(&mut pump, &store, &mut publisher)
            .unwrap();

        assert_eq!(publisher.sent, vec![pose_at(10.0); 3]);
    }

    #[test]
    fn test_newest_sample_wins() {
        let store = LatestPoseStore::new();
        let cancel = CancelToken::new();

        let script = vec![Some(pose_at(1.0)), Some(pose_at(2.0))];
        let mut pump = ScriptedPump::new(store.clone(), script, cancel.clone());
        let mut publisher = RecordingPublisher::default();

        RelayScheduler::new(1000.0, cancel)
            .run(&mut pump, &store, &mut publisher)
            .unwrap();

        assert_eq!(publisher.sent, vec![pose_at(1.0), pose_at(2.0)]);
    }

    #[test]
    fn test_end_to_end_sample_to_publisher() {
        // Wire-level sample in, publisher-level pose out, one cycle later
        let sample = TrackerSample {
            timestamp_s: Some(10.0),
            position_m: Some([1.0, 2.0, 3.0]),
            attitude_q: Some([0.0, 0.0, 0.0, 1.0]),
        };
        let pose = Pose::from_sample(&sample, 0.0);

        let store = LatestPoseStore::new();
        let cancel = CancelToken::new();
        let mut pump = ScriptedPump::new(store.clone(), vec![Some(pose)], cancel.clone());
        let mut publisher = RecordingPublisher::default();

        RelayScheduler::new(1000.0, cancel)
            .run(&mut pump, &store, &mut publisher)
            .unwrap();

        assert_eq!(publisher.sent.len(), 1);
        let sent = publisher.sent[0];
        assert_eq!(sent, pose_at(10.0));

        let msg = crate::publisher::vision_position_estimate(&sent);
        assert_eq!(msg.usec, 10_000_000);
        assert_eq!(msg.covariance, [0.0; 21]);
    }

    #[test]
    fn test_publisher_failure_aborts() {
        let store = LatestPoseStore::new();
        let cancel = CancelToken::new();
        let mut pump =
            ScriptedPump::new(store.clone(), vec![Some(pose_at(1.0))], cancel.clone());

        let result = RelayScheduler::new(1000.0, cancel).run(
            &mut pump,
            &store,
            &mut FailingPublisher,
        );

        assert!(matches!(result, Err(RelayError::Publisher(_))));
    }

    #[test]
    fn test_cycle_rate_is_honoured() {
        let store = LatestPoseStore::new();
        let cancel = CancelToken::new();

        // 5 cycles at 100 Hz: four full sleeps before the script runs out, so the run must take
        // at least ~40 ms but nowhere near a second
        let script = vec![Some(pose_at(1.0)), None, None, None, None];
        let mut pump = ScriptedPump::new(store.clone(), script, cancel.clone());
        let mut publisher = RecordingPublisher::default();

        let start = Instant::now();
        RelayScheduler::new(100.0, cancel)
            .run(&mut pump, &store, &mut publisher)
            .unwrap();
        let elapsed = start.elapsed();

        assert_eq!(publisher.sent.len(), 5);
        assert!(elapsed >= Duration::from_millis(35), "ran in {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(1), "ran in {:?}", elapsed);
    }

    #[test]
    fn test_cancel_during_sleep_is_prompt() {
        let store = LatestPoseStore::new();
        let cancel = CancelToken::new();

        // 0.2 Hz period is 5 s, cancellation arrives 50 ms in and must not wait out the sleep
        let mut pump = ScriptedPump::new(store.clone(), vec![None; 100], cancel.clone());
        let mut publisher = RecordingPublisher::default();

        let canceller = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });

        let start = Instant::now();
        RelayScheduler::new(0.2, cancel)
            .run(&mut pump, &store, &mut publisher)
            .unwrap();
        let elapsed = start.elapsed();

        handle.join().unwrap();
        assert!(elapsed < Duration::from_secs(1), "took {:?} to stop", elapsed);
    }
}

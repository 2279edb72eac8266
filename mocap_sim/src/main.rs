//! Fake tracker server executable.
//!
//! Simulates a motion capture source so the relay can be exercised without tracking hardware:
//! binds a zmq PUB socket and publishes synthetic pose samples for a configurable number of
//! trackers (`uav0`, `uav1`, ...) at a fixed rate. Each tracker flies a horizontal orbit with
//! its yaw tangent to the circle; radius, angular rate, phase, and altitude vary with the
//! tracker index so the streams are distinguishable.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::Utc;
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{info, warn};
use nalgebra::UnitQuaternion;
use std::f64::consts::PI;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};
use structopt::StructOpt;

// Internal
use comms_if::{
    mocap::TrackerSample,
    net::{zmq, MonitoredSocket, SocketOptions},
};
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Simulate a motion capture source publishing synthetic tracker poses.
#[derive(Debug, StructOpt)]
#[structopt(name = "mocap_sim")]
struct CliArgs {
    /// zmq endpoint to bind the publisher on
    #[structopt(long, default_value = "tcp://*:3883")]
    bind: String,

    /// Number of trackers to simulate
    #[structopt(long, default_value = "32")]
    num_trackers: usize,

    /// Publish rate in Hz
    #[structopt(long, default_value = "50.0")]
    rate: f64,

    /// Suppress the periodic status line
    #[structopt(long)]
    quiet: bool,

    /// Seconds between status lines (0 disables them)
    #[structopt(long, default_value = "5.0")]
    status_interval: f64,

    /// Tracker index shown in the status line
    #[structopt(long, default_value = "0")]
    status_tracker: usize,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    let args = CliArgs::from_args();

    let session = Session::new("mocap_sim", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    info!("Mocap Simulation Server\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- VALIDATE ARGUMENTS ----

    if args.num_trackers == 0 {
        return Err(eyre!("Tracker count must be > 0"));
    }
    if !(args.rate > 0.0 && args.rate.is_finite()) {
        return Err(eyre!("Publish rate must be positive, got {}", args.rate));
    }

    let status_interval_s = args.status_interval.max(0.0);
    let status_tracker = args.status_tracker.min(args.num_trackers - 1);

    // ---- INITIALISE NETWORK ----

    let zmq_ctx = zmq::Context::new();

    let socket_options = SocketOptions {
        bind: true,
        block_on_first_connect: false,
        ..Default::default()
    };

    let socket = MonitoredSocket::new(&zmq_ctx, zmq::PUB, socket_options, &args.bind)
        .wrap_err("Failed to bind the tracker publisher")?;

    info!("Tracker source publishing on {}", args.bind);
    for i in 0..args.num_trackers {
        info!("  spawned tracker uav{}", i);
    }

    // ---- SHUTDOWN HANDLING ----

    let running = Arc::new(AtomicBool::new(true));

    let handler_flag = running.clone();
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::Relaxed))
        .wrap_err("Failed to register the shutdown handler")?;

    // ---- MAIN LOOP ----

    let period = Duration::from_secs_f64(1.0 / args.rate);
    let mut sim_time_s = 0.0;
    let mut last_status_time_s = -status_interval_s;

    info!("Beginning publish loop at {} Hz\n", args.rate);

    while running.load(Ordering::Relaxed) {
        let cycle_start = Instant::now();
        let now_s = Utc::now().timestamp_micros() as f64 / 1e6;

        let mut status_sample = None;

        for i in 0..args.num_trackers {
            let sample = orbit_sample(i, sim_time_s, now_s);

            let msg = sample
                .to_message(&format!("uav{}", i))
                .wrap_err("Could not serialise a tracker sample")?;

            if let Err(e) = socket.send(msg.as_str(), 0) {
                warn!("Failed to publish sample for uav{}: {}", i, e);
            }

            if i == status_tracker {
                status_sample = Some(sample);
            }
        }

        sim_time_s += period.as_secs_f64();

        // Periodic status line
        if !args.quiet
            && status_interval_s > 0.0
            && sim_time_s - last_status_time_s >= status_interval_s
        {
            if let Some(TrackerSample {
                position_m: Some(pos),
                attitude_q: Some(quat),
                ..
            }) = status_sample
            {
                info!(
                    "Sim time {:.2} s | trackers: {} | uav{} pos=({:.2}, {:.2}, {:.2}) \
                     quat=({:.3}, {:.3}, {:.3}, {:.3})",
                    sim_time_s,
                    args.num_trackers,
                    status_tracker,
                    pos[0],
                    pos[1],
                    pos[2],
                    quat[0],
                    quat[1],
                    quat[2],
                    quat[3]
                );
            }
            last_status_time_s = sim_time_s;
        }

        // Keep the publish rate
        if let Some(remaining) = period.checked_sub(cycle_start.elapsed()) {
            thread::sleep(remaining);
        }
    }

    // ---- SHUTDOWN ----

    info!("Shutting down tracker source");

    Ok(())
}

/// Synthetic pose sample for tracker `i` at simulation time `sim_time_s`.
fn orbit_sample(i: usize, sim_time_s: f64, timestamp_s: f64) -> TrackerSample {
    let radius = 2.0 + 0.1 * i as f64;
    let omega = 0.2 + 0.01 * i as f64;
    let phase = i as f64 * (PI / 16.0);
    let angle = omega * sim_time_s + phase;

    // Yaw tangent to the orbit, no roll or pitch
    let attitude = UnitQuaternion::from_euler_angles(0.0, 0.0, angle);
    let coords = attitude.quaternion().coords;

    TrackerSample {
        timestamp_s: Some(timestamp_s),
        position_m: Some([
            radius * angle.cos(),
            radius * angle.sin(),
            1.0 + 0.05 * i as f64,
        ]),
        attitude_q: Some([coords.x, coords.y, coords.z, coords.w]),
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_orbit_sample_start() {
        // Tracker 0 at sim time zero sits on the +X axis at its base radius and altitude, facing
        // along its orbit (identity yaw)
        let sample = orbit_sample(0, 0.0, 12.5);

        assert_eq!(sample.timestamp_s, Some(12.5));

        let pos = sample.position_m.unwrap();
        assert!((pos[0] - 2.0).abs() < EPS);
        assert!(pos[1].abs() < EPS);
        assert!((pos[2] - 1.0).abs() < EPS);

        let quat = sample.attitude_q.unwrap();
        assert!(quat[0].abs() < EPS);
        assert!(quat[1].abs() < EPS);
        assert!(quat[2].abs() < EPS);
        assert!((quat[3] - 1.0).abs() < EPS);
    }

    #[test]
    fn test_orbit_sample_yaw_tracks_angle() {
        // The attitude must be a pure yaw rotation of the orbit angle
        let i = 3;
        let t = 7.0;
        let sample = orbit_sample(i, t, 0.0);

        let omega = 0.2 + 0.01 * i as f64;
        let phase = i as f64 * (PI / 16.0);
        let angle = omega * t + phase;

        let quat = sample.attitude_q.unwrap();
        assert!(quat[0].abs() < EPS);
        assert!(quat[1].abs() < EPS);
        assert!((quat[2] - (angle / 2.0).sin()).abs() < EPS);
        assert!((quat[3] - (angle / 2.0).cos()).abs() < EPS);
    }
}

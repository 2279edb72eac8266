//! Main relay executable entry point.
//!
//! # Architecture
//!
//! The relay forwards poses from a motion capture source into the vehicle's navigation stack:
//!
//!     - Initialise the session, logging, and parameters
//!     - Connect the tracker client (zmq SUB) and the downstream publisher (MAVLink)
//!     - Main loop, once per publish period:
//!         - Pump the tracker client, updating the latest-pose store
//!         - Read the freshest pose and hand it to the publisher
//!         - Sleep off the rest of the period
//!
//! An interrupt (SIGINT/SIGTERM) requests cooperative cancellation and exits with code 0. A
//! downstream transmission failure aborts the loop and exits nonzero.

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

use relay_lib::{
    latest_pose::LatestPoseStore,
    params::TrackerClientParams,
    publisher::{LinkConfig, MavlinkPublisher, Publisher},
    relay::{CancelToken, RelayScheduler},
    tracker_client::TrackerClient,
};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::info;
use structopt::StructOpt;

// Internal
use comms_if::{mocap::TrackerAddr, net::zmq};
use util::{
    logger::{logger_init, LevelFilter},
    params,
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Relay motion capture poses to a vehicle as MAVLink vision position estimates.
#[derive(Debug, StructOpt)]
#[structopt(name = "relay_exec")]
struct CliArgs {
    /// Tracker to relay: a bare name (e.g. "uav0"), or a full "name@host:port" address which
    /// overrides --host and --port
    #[structopt(long)]
    tracker: String,

    /// Host of the motion capture source
    #[structopt(long, default_value = "127.0.0.1")]
    host: String,

    /// Port of the motion capture source
    #[structopt(long, default_value = "3883")]
    port: u16,

    /// Output link type
    #[structopt(long, default_value = "serial", possible_values = &["serial", "udp"])]
    link: String,

    /// Serial device the vehicle is connected on
    #[structopt(long, default_value = "/dev/ttyUSB0")]
    device: String,

    /// Serial baud rate
    #[structopt(long, default_value = "921600")]
    baud: u32,

    /// UDP target as host:port
    #[structopt(long, default_value = "127.0.0.1:14550")]
    udp_target: String,

    /// Publish rate in Hz
    #[structopt(long, default_value = "50.0")]
    rate: f64,

    /// MAVLink system id for outgoing messages
    #[structopt(long, default_value = "1")]
    sysid: u8,

    /// MAVLink component id for outgoing messages
    #[structopt(long, default_value = "1")]
    compid: u8,

    /// Do not wait for a MAVLink heartbeat before publishing (useful for SITL, which accepts
    /// messages immediately)
    #[structopt(long)]
    no_heartbeat: bool,

    /// Process tracker data but never open or transmit on the MAVLink link
    #[structopt(long)]
    dry_run: bool,

    /// Log every forwarded pose
    #[structopt(long)]
    log_poses: bool,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    let args = CliArgs::from_args();

    // Initialise session
    let session =
        Session::new("relay_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution
    info!("Mocap Relay Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- VALIDATE ARGUMENTS ----

    if !(args.rate > 0.0 && args.rate.is_finite()) {
        return Err(eyre!("Publish rate must be positive, got {}", args.rate));
    }

    let tracker_addr = if args.tracker.contains('@') {
        args.tracker
            .parse::<TrackerAddr>()
            .wrap_err("Invalid tracker address")?
    } else {
        TrackerAddr::new(&args.tracker, &args.host, args.port)
    };

    // ---- LOAD PARAMETERS ----

    let client_params: TrackerClientParams = params::load_or_default("relay_exec.toml")
        .wrap_err("Could not load the relay parameters")?;

    info!("Relay parameters loaded");

    // ---- INITIALISE NETWORK ----

    let zmq_ctx = zmq::Context::new();

    let store = LatestPoseStore::new();

    let mut tracker = TrackerClient::new(
        &zmq_ctx,
        tracker_addr.clone(),
        &client_params,
        store.clone(),
    )
    .wrap_err("Failed to initialise the TrackerClient")?;

    info!("TrackerClient initialised, subscribed to {}", tracker_addr);

    if !tracker.connected() {
        info!("Tracker source is not reachable yet, zmq will keep retrying in the background");
    }

    // ---- INITIALISE PUBLISHER ----

    let mut publisher = if args.dry_run {
        info!("Dry run mode: the MAVLink connection will not be opened");
        Publisher::Report
    } else {
        let link = match args.link.as_str() {
            "serial" => LinkConfig::Serial {
                device: args.device.clone(),
                baud: args.baud,
            },
            "udp" => LinkConfig::Udp {
                target: args.udp_target.clone(),
            },
            // structopt's possible_values rules anything else out
            other => return Err(eyre!("Unknown link type: {}", other)),
        };

        Publisher::Mavlink(
            MavlinkPublisher::new(
                &link,
                args.sysid,
                args.compid,
                !args.no_heartbeat,
                args.log_poses,
            )
            .wrap_err("Failed to open the MAVLink link")?,
        )
    };

    // ---- SHUTDOWN HANDLING ----

    let cancel = CancelToken::new();

    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .wrap_err("Failed to register the shutdown handler")?;

    // ---- MAIN LOOP ----

    info!("Beginning relay loop at {} Hz\n", args.rate);

    RelayScheduler::new(args.rate, cancel)
        .run(&mut tracker, &store, &mut publisher)
        .wrap_err("Relay loop failed")?;

    // ---- SHUTDOWN ----

    info!("End of execution");

    Ok(())
}

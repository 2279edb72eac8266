//! # Tracker Client
//!
//! The TrackerClient receives pose samples for a single tracker from the motion capture source
//! and keeps the latest-pose store up to date. Samples arrive over a zmq SUB socket as
//! `<tracker_name> <json>` messages (see [`comms_if::mocap`]).
//!
//! The client does not run its own thread: the relay scheduler calls [`EventPump::pump_once`]
//! once per cycle, which drains everything the socket has buffered and writes the newest sample
//! into the store. The source being down is not an error - zmq reconnects in the background and
//! the relay simply keeps publishing the last pose it has.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::Utc;
use comms_if::{
    mocap::{TrackerAddr, TrackerSample},
    net::{zmq, MonitoredSocket, MonitoredSocketError, SocketOptions},
};
use log::warn;

use crate::latest_pose::LatestPoseStore;
use crate::params::TrackerClientParams;
use crate::pose::Pose;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// The operation the relay scheduler needs from its event source: process all currently
/// buffered events in bounded time, updating the latest-pose store zero or more times.
pub trait EventPump {
    fn pump_once(&mut self) -> Result<(), TrackerClientError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Subscriber client for a single tracker stream.
pub struct TrackerClient {
    addr: TrackerAddr,
    socket: MonitoredSocket,
    store: LatestPoseStore,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TrackerClientError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not subscribe to tracker \"{0}\": {1}")]
    SubscribeError(String, zmq::Error),

    #[error("Could not receive a message from the tracker source: {0}")]
    RecvError(zmq::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TrackerClient {
    /// Create a new client subscribed to the given tracker stream.
    ///
    /// This does not wait for the source to be reachable: the socket connects (and reconnects)
    /// in the background and [`TrackerClient::connected`] reports liveness.
    pub fn new(
        ctx: &zmq::Context,
        addr: TrackerAddr,
        params: &TrackerClientParams,
        store: LatestPoseStore,
    ) -> Result<Self, TrackerClientError> {
        let socket_options = SocketOptions {
            block_on_first_connect: false,
            connect_timeout: params.connect_timeout_ms,
            heartbeat_ivl: params.heartbeat_ivl_ms,
            heartbeat_ttl: params.heartbeat_ttl_ms,
            heartbeat_timeout: params.heartbeat_timeout_ms,
            linger: params.linger_ms,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(ctx, zmq::SUB, socket_options, &addr.endpoint())
            .map_err(TrackerClientError::SocketError)?;

        socket
            .set_subscribe(addr.tracker_name.as_bytes())
            .map_err(|e| TrackerClientError::SubscribeError(addr.tracker_name.clone(), e))?;

        Ok(Self {
            addr,
            socket,
            store,
        })
    }

    /// True if the socket currently has a live connection to the source.
    pub fn connected(&self) -> bool {
        self.socket.connected()
    }
}

impl EventPump for TrackerClient {
    /// Drain all currently buffered messages from the source.
    ///
    /// Decodable samples for this tracker are converted and written to the store, last one wins.
    /// Undecodable messages are logged and skipped - a sample is never fatal. Only a transport
    /// failure (anything other than "no more messages") is returned as an error.
    fn pump_once(&mut self) -> Result<(), TrackerClientError> {
        loop {
            match self.socket.recv_string(zmq::DONTWAIT) {
                Ok(Ok(msg)) => {
                    let now_s = Utc::now().timestamp_micros() as f64 / 1e6;
                    if let Some(pose) = decode_message(&self.addr.tracker_name, &msg, now_s) {
                        self.store.write(pose);
                    }
                }
                Ok(Err(_)) => warn!("Non UTF-8 message from the tracker source"),
                Err(zmq::Error::EAGAIN) => break,
                Err(e) => return Err(TrackerClientError::RecvError(e)),
            }
        }

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Decode one wire message addressed to `tracker_name` into a pose.
///
/// Returns `None` for messages belonging to other trackers (zmq subscriptions are prefix
/// matches, so `uav1` also receives `uav10`) and for undecodable payloads, which are logged and
/// skipped. Missing sample fields are substituted per [`Pose::from_sample`] with
/// `default_timestamp_s` standing in for a missing timestamp.
fn decode_message(tracker_name: &str, msg: &str, default_timestamp_s: f64) -> Option<Pose> {
    let (topic, payload) = match TrackerSample::split_message(msg) {
        Some(parts) => parts,
        None => {
            warn!("Message from the tracker source has no topic separator");
            return None;
        }
    };

    if topic != tracker_name {
        return None;
    }

    let sample: TrackerSample = match serde_json::from_str(payload) {
        Ok(s) => s,
        Err(e) => {
            warn!("Undecodable sample from tracker \"{}\": {}", topic, e);
            return None;
        }
    };

    Some(Pose::from_sample(&sample, default_timestamp_s))
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_decode_message() {
        let msg = r#"uav0 {"timestamp_s": 10.0, "position_m": [1.0, 2.0, 3.0], "attitude_q": [0.0, 0.0, 0.0, 1.0]}"#;

        let pose = decode_message("uav0", msg, 99.0).unwrap();
        assert_eq!(pose.timestamp_s, 10.0);
        assert_eq!(pose.position_m, [1.0, 2.0, 3.0]);
        assert_eq!(pose.attitude_rpy_rad, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_decode_message_other_tracker() {
        // Prefix-matched topic for a different tracker must be ignored
        let msg = r#"uav10 {"timestamp_s": 10.0}"#;
        assert!(decode_message("uav1", msg, 0.0).is_none());
    }

    #[test]
    fn test_decode_message_defaults() {
        // An empty sample is not dropped, it gets the neutral defaults
        let pose = decode_message("uav0", "uav0 {}", 42.0).unwrap();
        assert_eq!(pose.timestamp_s, 42.0);
        assert_eq!(pose.position_m, [0.0, 0.0, 0.0]);
        assert_eq!(pose.attitude_rpy_rad, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_decode_message_garbage() {
        assert!(decode_message("uav0", "uav0 not-json", 0.0).is_none());
        assert!(decode_message("uav0", "no-separator", 0.0).is_none());
    }
}

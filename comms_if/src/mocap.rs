//! # Motion Capture Interface
//!
//! Defines the wire format for tracker pose samples and the addressing scheme for tracker
//! streams. A motion capture source publishes each sample as a single-frame message of the form
//! `<tracker_name> <json>`, and consumers subscribe to the tracker name. Note zmq subscriptions
//! are prefix matches, so consumers must still check the topic of each received message.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default TCP port a motion capture source publishes on.
pub const DEFAULT_TRACKER_PORT: u16 = 3883;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single pose sample published by the motion capture source.
///
/// Every field is optional on the wire. A source may omit any of them and consumers substitute
/// neutral defaults, so a sample is never rejected for being incomplete.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrackerSample {
    /// Sample acquisition time, unix seconds
    pub timestamp_s: Option<f64>,

    /// Position (x, y, z) in metres
    pub position_m: Option<[f64; 3]>,

    /// Attitude as a unit quaternion (qx, qy, qz, qw)
    pub attitude_q: Option<[f64; 4]>,
}

/// Address of a tracker stream: `<tracker_name>@<host>:<port>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerAddr {
    /// Name of the tracker within the source, e.g. `uav0`. Doubles as the message topic.
    pub tracker_name: String,

    /// Host the source publishes on
    pub host: String,

    /// Port the source publishes on
    pub port: u16,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors raised while parsing a tracker address string.
#[derive(Debug, thiserror::Error)]
pub enum TrackerAddrError {
    #[error("Expected an address of the form <tracker_name>@<host>[:<port>], got \"{0}\"")]
    MissingSeparator(String),

    #[error("The tracker name part of the address is empty")]
    EmptyTrackerName,

    #[error("The host part of the address is empty")]
    EmptyHost,

    #[error("Invalid port \"{0}\": {1}")]
    InvalidPort(String, std::num::ParseIntError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TrackerSample {
    /// Frame this sample as a publishable message for the given tracker: `<tracker_name> <json>`.
    pub fn to_message(&self, tracker_name: &str) -> Result<String, serde_json::Error> {
        Ok(format!("{} {}", tracker_name, serde_json::to_string(self)?))
    }

    /// Split a received message into its topic (tracker name) and JSON payload.
    ///
    /// Returns `None` if the message has no topic separator.
    pub fn split_message(msg: &str) -> Option<(&str, &str)> {
        msg.split_once(' ')
    }
}

impl TrackerAddr {
    /// Build an address from its parts.
    pub fn new(tracker_name: &str, host: &str, port: u16) -> Self {
        Self {
            tracker_name: tracker_name.into(),
            host: host.into(),
            port,
        }
    }

    /// The zmq endpoint of the source this tracker is published by.
    pub fn endpoint(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for TrackerAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}:{}", self.tracker_name, self.host, self.port)
    }
}

impl FromStr for TrackerAddr {
    type Err = TrackerAddrError;

    /// Parse an address of the form `<tracker_name>@<host>[:<port>]`, the port defaulting to
    /// [`DEFAULT_TRACKER_PORT`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tracker_name, host_port) = s
            .split_once('@')
            .ok_or_else(|| TrackerAddrError::MissingSeparator(s.into()))?;

        if tracker_name.is_empty() {
            return Err(TrackerAddrError::EmptyTrackerName);
        }

        let (host, port) = match host_port.split_once(':') {
            Some((host, port_str)) => {
                let port = port_str
                    .parse()
                    .map_err(|e| TrackerAddrError::InvalidPort(port_str.into(), e))?;
                (host, port)
            }
            None => (host_port, DEFAULT_TRACKER_PORT),
        };

        if host.is_empty() {
            return Err(TrackerAddrError::EmptyHost);
        }

        Ok(Self::new(tracker_name, host, port))
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tracker_addr_parse() {
        let addr: TrackerAddr = "uav5@192.168.1.50:4000".parse().unwrap();
        assert_eq!(addr, TrackerAddr::new("uav5", "192.168.1.50", 4000));
        assert_eq!(addr.endpoint(), "tcp://192.168.1.50:4000");
        assert_eq!(addr.to_string(), "uav5@192.168.1.50:4000");

        // Port is optional and defaults
        let addr: TrackerAddr = "uav0@localhost".parse().unwrap();
        assert_eq!(addr, TrackerAddr::new("uav0", "localhost", 3883));

        assert!("uav0".parse::<TrackerAddr>().is_err());
        assert!("@localhost:3883".parse::<TrackerAddr>().is_err());
        assert!("uav0@:3883".parse::<TrackerAddr>().is_err());
        assert!("uav0@localhost:notaport".parse::<TrackerAddr>().is_err());
    }

    #[test]
    fn test_sample_message_framing() {
        let sample = TrackerSample {
            timestamp_s: Some(10.0),
            position_m: Some([1.0, 2.0, 3.0]),
            attitude_q: Some([0.0, 0.0, 0.0, 1.0]),
        };

        let msg = sample.to_message("uav0").unwrap();
        let (topic, payload) = TrackerSample::split_message(&msg).unwrap();
        assert_eq!(topic, "uav0");

        let decoded: TrackerSample = serde_json::from_str(payload).unwrap();
        assert_eq!(decoded, sample);

        assert!(TrackerSample::split_message("no-separator").is_none());
    }

    #[test]
    fn test_sample_missing_fields() {
        // A source is free to omit any of the fields, the sample must still decode
        let decoded: TrackerSample =
            serde_json::from_str(r#"{"position_m": [1.0, 2.0, 3.0]}"#).unwrap();

        assert_eq!(decoded.timestamp_s, None);
        assert_eq!(decoded.position_m, Some([1.0, 2.0, 3.0]));
        assert_eq!(decoded.attitude_q, None);

        let decoded: TrackerSample = serde_json::from_str("{}").unwrap();
        assert_eq!(decoded.timestamp_s, None);
        assert_eq!(decoded.position_m, None);
        assert_eq!(decoded.attitude_q, None);
    }
}

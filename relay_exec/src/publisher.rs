//! # Publisher
//!
//! Sends poses downstream to the vehicle as MAVLink `VISION_POSITION_ESTIMATE` messages, or, in
//! dry-run mode, reports them to the log without touching any transport.
//!
//! Transmission failures are deliberately not handled here: a failed send propagates up and is
//! fatal to the relay loop. Reconnection or retry logic would go here if it is ever added.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::info;
use mavlink::{common, MavConnection, MavHeader};

use crate::pose::Pose;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// The capability the relay scheduler needs from its output side: accept a pose and attempt to
/// pass it on.
pub trait PosePublisher {
    fn send(&mut self, pose: &Pose) -> Result<(), PublisherError>;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Downstream link selection.
#[derive(Debug, Clone)]
pub enum LinkConfig {
    /// Serial device path and baud rate
    Serial { device: String, baud: u32 },

    /// UDP target as `host:port`
    Udp { target: String },
}

/// The publisher variants the relay can be configured with.
pub enum Publisher {
    /// Transmit over a MAVLink connection
    Mavlink(MavlinkPublisher),

    /// Dry run - report the pose to the log instead of transmitting it
    Report,
}

#[derive(Debug, thiserror::Error)]
pub enum PublisherError {
    #[error("Could not open the MAVLink connection \"{0}\": {1}")]
    ConnectError(String, std::io::Error),

    #[error("Error while waiting for a heartbeat: {0}")]
    HeartbeatError(mavlink::error::MessageReadError),

    #[error("Could not send the vision position estimate: {0}")]
    SendFailed(mavlink::error::MessageWriteError),
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Transmitting publisher, wrapping an outbound MAVLink connection.
pub struct MavlinkPublisher {
    conn: Box<dyn MavConnection<common::MavMessage> + Send + Sync>,
    header: MavHeader,
    log_poses: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LinkConfig {
    /// The mavlink connection string for this link.
    pub fn connection_string(&self) -> String {
        match self {
            LinkConfig::Serial { device, baud } => format!("serial:{}:{}", device, baud),
            LinkConfig::Udp { target } => format!("udpout:{}", target),
        }
    }
}

impl MavlinkPublisher {
    /// Open the downstream MAVLink connection.
    ///
    /// If `wait_heartbeat` is set this blocks until the first HEARTBEAT arrives from the remote,
    /// confirming it is alive before anything is sent to it. The wait is unbounded.
    pub fn new(
        link: &LinkConfig,
        system_id: u8,
        component_id: u8,
        wait_heartbeat: bool,
        log_poses: bool,
    ) -> Result<Self, PublisherError> {
        let conn_string = link.connection_string();

        let conn = mavlink::connect::<common::MavMessage>(&conn_string)
            .map_err(|e| PublisherError::ConnectError(conn_string.clone(), e))?;

        if wait_heartbeat {
            info!("Waiting for a MAVLink heartbeat on {}...", conn_string);
            let remote = wait_for_heartbeat(conn.as_ref())?;
            info!(
                "Heartbeat received from system {} component {}",
                remote.system_id, remote.component_id
            );
        }

        info!("MAVLink link open on {}", conn_string);

        Ok(Self {
            conn,
            header: MavHeader {
                system_id,
                component_id,
                sequence: 0,
            },
            log_poses,
        })
    }
}

impl PosePublisher for MavlinkPublisher {
    fn send(&mut self, pose: &Pose) -> Result<(), PublisherError> {
        let msg = common::MavMessage::VISION_POSITION_ESTIMATE(vision_position_estimate(pose));

        self.conn
            .send(&self.header, &msg)
            .map_err(PublisherError::SendFailed)?;

        self.header.sequence = self.header.sequence.wrapping_add(1);

        if self.log_poses {
            report_pose(pose);
        }

        Ok(())
    }
}

impl PosePublisher for Publisher {
    fn send(&mut self, pose: &Pose) -> Result<(), PublisherError> {
        match self {
            Publisher::Mavlink(publisher) => publisher.send(pose),
            Publisher::Report => {
                report_pose(pose);
                Ok(())
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Pack a pose into the downstream vision position estimate message.
///
/// The timestamp is converted from seconds to whole microseconds, truncating. The covariance is
/// always reported as all-zero: the bridge declares unknown covariance unconditionally, it never
/// estimates one.
pub fn vision_position_estimate(pose: &Pose) -> common::VISION_POSITION_ESTIMATE_DATA {
    common::VISION_POSITION_ESTIMATE_DATA {
        usec: (pose.timestamp_s * 1e6) as u64,
        x: pose.position_m[0] as f32,
        y: pose.position_m[1] as f32,
        z: pose.position_m[2] as f32,
        roll: pose.attitude_rpy_rad[0] as f32,
        pitch: pose.attitude_rpy_rad[1] as f32,
        yaw: pose.attitude_rpy_rad[2] as f32,
        covariance: [0.0; 21],
        reset_counter: 0,
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Block until the remote sends its first heartbeat, returning the remote's header.
fn wait_for_heartbeat(
    conn: &dyn MavConnection<common::MavMessage>,
) -> Result<MavHeader, PublisherError> {
    loop {
        match conn.recv() {
            Ok((header, common::MavMessage::HEARTBEAT(_))) => return Ok(header),
            // Other traffic before the first heartbeat is fine, keep waiting
            Ok(_) => continue,
            Err(mavlink::error::MessageReadError::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue
            }
            Err(e) => return Err(PublisherError::HeartbeatError(e)),
        }
    }
}

/// Report a pose to the log.
fn report_pose(pose: &Pose) {
    info!(
        "Pose @ {:.3} s: xyz = ({:.2}, {:.2}, {:.2}) m, rpy = ({:.2}, {:.2}, {:.2}) rad",
        pose.timestamp_s,
        pose.position_m[0],
        pose.position_m[1],
        pose.position_m[2],
        pose.attitude_rpy_rad[0],
        pose.attitude_rpy_rad[1],
        pose.attitude_rpy_rad[2],
    );
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_vision_position_estimate_packing() {
        let pose = Pose {
            timestamp_s: 10.0,
            position_m: [1.0, 2.0, 3.0],
            attitude_rpy_rad: [0.0, 0.0, 0.0],
        };

        let msg = vision_position_estimate(&pose);

        assert_eq!(msg.usec, 10_000_000);
        assert_eq!(msg.x, 1.0);
        assert_eq!(msg.y, 2.0);
        assert_eq!(msg.z, 3.0);
        assert_eq!(msg.roll, 0.0);
        assert_eq!(msg.pitch, 0.0);
        assert_eq!(msg.yaw, 0.0);
        assert_eq!(msg.covariance, [0.0; 21]);
        assert_eq!(msg.reset_counter, 0);
    }

    #[test]
    fn test_timestamp_truncates_to_microseconds() {
        let pose = Pose {
            timestamp_s: 1.234_567_89,
            position_m: [0.0; 3],
            attitude_rpy_rad: [0.0; 3],
        };

        assert_eq!(vision_position_estimate(&pose).usec, 1_234_567);
    }

    #[test]
    fn test_connection_strings() {
        let serial = LinkConfig::Serial {
            device: "/dev/ttyUSB0".into(),
            baud: 921_600,
        };
        assert_eq!(serial.connection_string(), "serial:/dev/ttyUSB0:921600");

        let udp = LinkConfig::Udp {
            target: "127.0.0.1:14550".into(),
        };
        assert_eq!(udp.connection_string(), "udpout:127.0.0.1:14550");
    }
}

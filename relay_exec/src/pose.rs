//! # Pose representation and orientation conversion
//!
//! The canonical unit exchanged between the components of the relay is the [`Pose`]: a timestamped
//! position with the attitude already converted from the tracker's quaternion into the
//! roll/pitch/yaw Euler angles the downstream vision position estimate carries.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::mocap::TrackerSample;
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// The pose (position and attitude) of the tracked vehicle at a point in time.
///
/// Attitude is expressed as aerospace ZYX (yaw-pitch-roll) Euler angles. Roll and yaw are in
/// `[-pi, pi]` and pitch in `[-pi/2, pi/2]`, the ranges of `atan2` and `asin`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Sample acquisition time, unix seconds
    pub timestamp_s: f64,

    /// Position (x, y, z) in metres
    pub position_m: [f64; 3],

    /// Attitude as (roll, pitch, yaw) in radians
    pub attitude_rpy_rad: [f64; 3],
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Pose {
    /// Build a pose from a wire sample, substituting neutral defaults for missing fields.
    ///
    /// A missing position becomes the origin, a missing attitude the identity quaternion, and a
    /// missing timestamp is replaced with `default_timestamp_s`, which callers should take from
    /// the wall clock at the receive site. A sample is therefore never rejected as malformed.
    pub fn from_sample(sample: &TrackerSample, default_timestamp_s: f64) -> Self {
        let attitude_q = sample.attitude_q.unwrap_or([0.0, 0.0, 0.0, 1.0]);

        Self {
            timestamp_s: sample.timestamp_s.unwrap_or(default_timestamp_s),
            position_m: sample.position_m.unwrap_or([0.0; 3]),
            attitude_rpy_rad: quat_to_euler(attitude_q),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert a unit quaternion `(qx, qy, qz, qw)` into `(roll, pitch, yaw)` radians.
///
/// Aerospace ZYX convention. At the gimbal lock singularity, where the pitch sine leaves the
/// `asin` domain, the pitch is clamped to the sign-preserving `+/-pi/2` instead.
///
/// The input is not normalised: a non-unit quaternion yields a mathematically valid but
/// physically meaningless result.
pub fn quat_to_euler(quat: [f64; 4]) -> [f64; 3] {
    let [qx, qy, qz, qw] = quat;

    let sinr_cosp = 2.0 * (qw * qx + qy * qz);
    let cosr_cosp = 1.0 - 2.0 * (qx * qx + qy * qy);
    let roll = sinr_cosp.atan2(cosr_cosp);

    let sinp = 2.0 * (qw * qy - qz * qx);
    let pitch = if sinp.abs() >= 1.0 {
        std::f64::consts::FRAC_PI_2.copysign(sinp)
    } else {
        sinp.asin()
    };

    let siny_cosp = 2.0 * (qw * qz + qx * qy);
    let cosy_cosp = 1.0 - 2.0 * (qy * qy + qz * qz);
    let yaw = siny_cosp.atan2(cosy_cosp);

    [roll, pitch, yaw]
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    const EPS: f64 = 1e-9;

    /// Quaternion for a rotation of `angle` radians about the given (unit) axis.
    fn quat_about(axis: [f64; 3], angle: f64) -> [f64; 4] {
        let half = 0.5 * angle;
        let s = half.sin();
        [axis[0] * s, axis[1] * s, axis[2] * s, half.cos()]
    }

    #[test]
    fn test_identity_quaternion() {
        assert_eq!(quat_to_euler([0.0, 0.0, 0.0, 1.0]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_single_axis_rotations() {
        let [roll, pitch, yaw] = quat_to_euler(quat_about([1.0, 0.0, 0.0], FRAC_PI_4));
        assert!((roll - FRAC_PI_4).abs() < EPS);
        assert!(pitch.abs() < EPS);
        assert!(yaw.abs() < EPS);

        let [roll, pitch, yaw] = quat_to_euler(quat_about([0.0, 1.0, 0.0], -FRAC_PI_4));
        assert!(roll.abs() < EPS);
        assert!((pitch + FRAC_PI_4).abs() < EPS);
        assert!(yaw.abs() < EPS);

        let [roll, pitch, yaw] = quat_to_euler(quat_about([0.0, 0.0, 1.0], FRAC_PI_2));
        assert!(roll.abs() < EPS);
        assert!(pitch.abs() < EPS);
        assert!((yaw - FRAC_PI_2).abs() < EPS);
    }

    #[test]
    fn test_gimbal_lock_is_clamped() {
        // Pitch of +/-90 deg makes the pitch sine hit +/-1, which must clamp rather than leave
        // the asin domain. sqrt(0.5) components guarantee the sine reaches 1 exactly.
        let h = (0.5f64).sqrt();

        let [_, pitch, _] = quat_to_euler([0.0, h, 0.0, h]);
        assert_eq!(pitch, FRAC_PI_2);

        let [_, pitch, _] = quat_to_euler([0.0, -h, 0.0, h]);
        assert_eq!(pitch, -FRAC_PI_2);

        // A slightly over-unit quaternion pushes the sine past 1, still no panic
        let [_, pitch, _] = quat_to_euler([0.0, 0.7072, 0.0, 0.7072]);
        assert_eq!(pitch, FRAC_PI_2);
    }

    #[test]
    fn test_angles_stay_in_range() {
        // Sweep a grid of unit quaternions and check the output ranges
        let axes = [
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.577350269, 0.577350269, 0.577350269],
            [-0.267261242, 0.534522484, -0.801783726],
        ];

        for axis in axes.iter() {
            for i in 0..64 {
                let angle = (i as f64 / 63.0 - 0.5) * 4.0 * PI;
                let [roll, pitch, yaw] = quat_to_euler(quat_about(*axis, angle));

                assert!((-PI..=PI).contains(&roll), "roll {} out of range", roll);
                assert!(
                    (-FRAC_PI_2..=FRAC_PI_2).contains(&pitch),
                    "pitch {} out of range",
                    pitch
                );
                assert!((-PI..=PI).contains(&yaw), "yaw {} out of range", yaw);
            }
        }
    }

    #[test]
    fn test_non_unit_quaternion_accepted() {
        // Not normalised, the result is meaningless but must still be finite
        let angles = quat_to_euler([0.3, -1.2, 4.0, 2.5]);
        assert!(angles.iter().all(|a| a.is_finite()));
    }

    #[test]
    fn test_from_sample_full() {
        let sample = TrackerSample {
            timestamp_s: Some(10.0),
            position_m: Some([1.0, 2.0, 3.0]),
            attitude_q: Some([0.0, 0.0, 0.0, 1.0]),
        };

        let pose = Pose::from_sample(&sample, 99.0);
        assert_eq!(pose.timestamp_s, 10.0);
        assert_eq!(pose.position_m, [1.0, 2.0, 3.0]);
        assert_eq!(pose.attitude_rpy_rad, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_from_sample_defaults() {
        let sample = TrackerSample {
            timestamp_s: None,
            position_m: None,
            attitude_q: None,
        };

        // Missing fields become the origin, the identity attitude, and the substitute timestamp
        let pose = Pose::from_sample(&sample, 1234.5);
        assert_eq!(pose.timestamp_s, 1234.5);
        assert_eq!(pose.position_m, [0.0, 0.0, 0.0]);
        assert_eq!(pose.attitude_rpy_rad, [0.0, 0.0, 0.0]);
    }
}

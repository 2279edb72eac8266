//! # Relay library.
//!
//! This library allows other crates in the workspace, and the test suite, to access items
//! defined inside the relay crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Latest-pose store - single-slot register shared by the tracker pump and the scheduler
pub mod latest_pose;

/// Executable parameters
pub mod params;

/// Pose representation and orientation conversion
pub mod pose;

/// Publisher - sends poses downstream as MAVLink vision position estimates
pub mod publisher;

/// Relay scheduler - drives the pump/read/publish cycle at a fixed rate
pub mod relay;

/// Tracker client - receives pose samples from the motion capture source
pub mod tracker_client;

//! # Relay Executable Parameters
//!
//! This module provides tunable parameters for the relay executable. The operational settings
//! (tracker, link, rate, ...) come from the command line; the socket tuning below rarely needs
//! changing and is loaded from `params/relay_exec.toml` when that file exists, falling back to
//! the defaults here otherwise.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Tuning for the tracker client's subscriber socket.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerClientParams {
    /// `ZMQ_CONNECT_TIMEOUT` for the subscriber socket, in milliseconds
    pub connect_timeout_ms: i32,

    /// ZMTP heartbeat interval, in milliseconds
    pub heartbeat_ivl_ms: i32,

    /// ZMTP heartbeat TTL, in milliseconds
    pub heartbeat_ttl_ms: i32,

    /// ZMTP heartbeat timeout, in milliseconds
    pub heartbeat_timeout_ms: i32,

    /// `ZMQ_LINGER` period for socket shutdown, in milliseconds
    pub linger_ms: i32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for TrackerClientParams {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 1000,
            heartbeat_ivl_ms: 500,
            heartbeat_ttl_ms: 1000,
            heartbeat_timeout_ms: 1000,
            linger_ms: 1,
        }
    }
}

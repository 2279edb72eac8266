//! Host platform utility functions

use std::path::PathBuf;

/// Name of the environment variable giving the software root directory.
pub const SW_ROOT_ENV_VAR: &str = "MOCAP_SW_ROOT";

/// Get the software root directory.
///
/// The root is taken from the `MOCAP_SW_ROOT` environment variable. If the variable is not set
/// the current working directory is used instead, so that the executables can be run without any
/// environment setup.
pub fn get_sw_root() -> PathBuf {
    match std::env::var(SW_ROOT_ENV_VAR) {
        Ok(root) => PathBuf::from(root),
        Err(_) => PathBuf::from("."),
    }
}

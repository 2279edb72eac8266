//! Generic parameters functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::fs::read_to_string;
use thiserror::Error;
use toml;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Cannot load the parameter file: {0}")]
    FileLoadError(std::io::Error),

    #[error("Cannot read the parameter file: {0}")]
    DeserialiseError(toml::de::Error),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file.
///
/// The file path is relative to the `params` directory under the software root (see
/// [`crate::host::get_sw_root`]).
pub fn load<P>(param_file_path: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    // Get the params dir
    let mut path = crate::host::get_sw_root();
    path.push("params");
    path.push(param_file_path);

    // Load the file into a string
    let params_str = match read_to_string(path) {
        Ok(s) => s,
        Err(e) => return Err(LoadError::FileLoadError(e)),
    };

    // Parse the string into the parameter struct
    match toml::from_str(params_str.as_str()) {
        Ok(p) => Ok(p),
        Err(e) => Err(LoadError::DeserialiseError(e)),
    }
}

/// Load a parameter file, falling back to the type's defaults if the file does not exist.
///
/// A file that exists but cannot be parsed is still an error.
pub fn load_or_default<P>(param_file_path: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned + Default,
{
    match load(param_file_path) {
        Ok(p) => Ok(p),
        Err(LoadError::FileLoadError(ref e)) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!(
                "Parameter file \"{}\" not found, using default values",
                param_file_path
            );
            Ok(P::default())
        }
        Err(e) => Err(e),
    }
}

//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the software.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Motion capture interface - the tracker sample wire format and tracker addressing
pub mod mocap;

/// Network module
pub mod net;

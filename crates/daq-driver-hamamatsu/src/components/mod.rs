//! ImagEM X2 driver components.
//!
//! - [`sdk`]: device-control seam ([`sdk::DcamCamera`], [`sdk::DcamBackend`])
//! - [`dll_path`]: process-wide vendor library location registry
//! - [`connection`]: session plus library registration for one activation
//! - [`acquisition`]: single-frame and live acquisition sequences
//! - [`features`]: argument checks and value conversions
//! - `mock` / `dcamapi`: backends, selected by cargo feature

pub mod acquisition;
pub mod connection;
pub mod dll_path;
pub mod features;
pub mod sdk;

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "dcam_sdk")]
pub mod dcamapi;

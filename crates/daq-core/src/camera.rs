//! Camera hardware-module contract.
//!
//! [`CameraInterface`] is the fixed set of calls the framework makes on any camera
//! module: identification, acquisition control, exposure and gain, and readiness.
//! The value types here ([`TriggerMode`], [`AcquisitionMode`], [`CameraStatus`],
//! [`Roi`]) are shared by drivers so that their configuration and their SDK seams
//! speak the same vocabulary.
//!
//! All calls are synchronous. A driver may block the calling thread (for example
//! while waiting for a single frame); the framework serializes calls on one module.

use crate::data::Frame;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Trigger / Acquisition Modes
// =============================================================================

/// Source of the signal that starts a frame exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TriggerMode {
    /// Camera's internal clock
    #[default]
    #[serde(rename = "int")]
    Internal,
    /// External trigger line
    #[serde(rename = "ext")]
    External,
    /// Software trigger command
    #[serde(rename = "software")]
    Software,
    /// Master pulse generator
    #[serde(rename = "master_pulse")]
    MasterPulse,
}

impl TriggerMode {
    /// Wire name used in configuration files and by the device-control layer.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "int",
            Self::External => "ext",
            Self::Software => "software",
            Self::MasterPulse => "master_pulse",
        }
    }

    /// All accepted wire names.
    pub fn all_choices() -> &'static [&'static str] {
        &["int", "ext", "software", "master_pulse"]
    }
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "int" => Ok(Self::Internal),
            "ext" => Ok(Self::External),
            "software" => Ok(Self::Software),
            "master_pulse" => Ok(Self::MasterPulse),
            other => bail!(
                "unknown trigger mode '{}' (expected one of: {})",
                other,
                Self::all_choices().join(", ")
            ),
        }
    }
}

/// How an acquisition fills the frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMode {
    /// Fill the buffer once and stop
    Snap,
    /// Cycle through the buffer until stopped
    #[default]
    Sequence,
}

impl AcquisitionMode {
    /// Wire name used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snap => "snap",
            Self::Sequence => "sequence",
        }
    }
}

impl fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capture status as reported by the device-control layer.
///
/// Drivers mirror this value; they never transition it themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraStatus {
    /// The SDK reports a capture error
    Error,
    /// Capturing
    Busy,
    /// Buffer allocated, ready to start capturing
    Ready,
    /// Idle, no buffer allocated
    Stable,
    /// Settings changed, camera settling
    Unstable,
}

impl CameraStatus {
    /// Status name as used by the device-control layer.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Busy => "busy",
            Self::Ready => "ready",
            Self::Stable => "stable",
            Self::Unstable => "unstable",
        }
    }
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Region of Interest
// =============================================================================

/// Sensor sub-rectangle read out by the camera.
///
/// Start and end indices are inclusive; `hend = 511` with `hstart = 0` selects 512
/// columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Roi {
    /// First column
    pub hstart: u32,
    /// Last column
    pub hend: u32,
    /// First row
    pub vstart: u32,
    /// Last row
    pub vend: u32,
    /// Horizontal binning factor
    pub hbin: u32,
    /// Vertical binning factor
    pub vbin: u32,
}

impl Roi {
    /// ROI with square binning.
    pub fn new(hstart: u32, hend: u32, vstart: u32, vend: u32, bin: u32) -> Self {
        Self {
            hstart,
            hend,
            vstart,
            vend,
            hbin: bin,
            vbin: bin,
        }
    }

    /// Unbinned width in sensor pixels.
    pub fn width(&self) -> u32 {
        self.hend.saturating_sub(self.hstart) + 1
    }

    /// Unbinned height in sensor pixels.
    pub fn height(&self) -> u32 {
        self.vend.saturating_sub(self.vstart) + 1
    }

    /// Reject empty ranges and zero binning.
    pub fn validate(&self) -> Result<()> {
        if self.hend < self.hstart {
            bail!("ROI column end {} precedes start {}", self.hend, self.hstart);
        }
        if self.vend < self.vstart {
            bail!("ROI row end {} precedes start {}", self.vend, self.vstart);
        }
        if self.hbin == 0 || self.vbin == 0 {
            bail!("ROI binning must be at least 1");
        }
        Ok(())
    }
}

// =============================================================================
// Camera Interface
// =============================================================================

/// Hardware-module contract for cameras.
///
/// # Contract
/// - Exposure is in seconds
/// - `start_single_acquisition` returns once the frame is available
/// - `start_*_acquisition` and `stop_acquisition` report success as `bool`;
///   SDK failures are returned as `Err`
/// - `get_acquired_data` returns the most recent frame only
pub trait CameraInterface {
    /// Identifier string of the connected device.
    fn get_name(&self) -> Result<String>;

    /// Frame size as `(width, height)` in pixels.
    fn get_size(&self) -> Result<(u32, u32)>;

    /// Whether continuous acquisition is supported.
    fn support_live_acquisition(&self) -> bool;

    /// Start continuous acquisition.
    fn start_live_acquisition(&mut self) -> Result<bool>;

    /// Acquire one frame, blocking until it is available.
    fn start_single_acquisition(&mut self) -> Result<bool>;

    /// Stop any running acquisition. `true` once the camera reports it has stopped.
    fn stop_acquisition(&mut self) -> Result<bool>;

    /// Most recent frame, or `None` if nothing has been acquired.
    fn get_acquired_data(&mut self) -> Result<Option<Frame>>;

    /// Set exposure time in seconds.
    fn set_exposure(&mut self, seconds: f64) -> Result<()>;

    /// Current exposure time in seconds.
    fn get_exposure(&self) -> Result<f64>;

    /// Set gain.
    fn set_gain(&mut self, gain: f64) -> Result<()>;

    /// Current gain.
    fn get_gain(&self) -> Result<f64>;

    /// `true` when the camera can start an acquisition.
    fn get_ready_state(&self) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_mode_parses_wire_names() {
        for name in TriggerMode::all_choices() {
            let mode: TriggerMode = name.parse().unwrap();
            assert_eq!(mode.as_str(), *name);
        }
    }

    #[test]
    fn trigger_mode_rejects_unknown() {
        let err = "edge".parse::<TriggerMode>().unwrap_err();
        assert!(err.to_string().contains("master_pulse"));
    }

    #[test]
    fn roi_dimensions_are_inclusive() {
        let roi = Roi::new(0, 511, 10, 19, 1);
        assert_eq!(roi.width(), 512);
        assert_eq!(roi.height(), 10);
        roi.validate().unwrap();
    }

    #[test]
    fn roi_validate_rejects_reversed_and_zero_bin() {
        assert!(Roi::new(5, 4, 0, 1, 1).validate().is_err());
        assert!(Roi::new(0, 1, 3, 2, 1).validate().is_err());
        assert!(Roi::new(0, 1, 0, 1, 0).validate().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        assert_eq!(
            serde_json::to_value(TriggerMode::MasterPulse).unwrap(),
            serde_json::json!("master_pulse")
        );
        let mode: TriggerMode = serde_json::from_value(serde_json::json!("ext")).unwrap();
        assert_eq!(mode, TriggerMode::External);
        assert!(serde_json::from_value::<TriggerMode>(serde_json::json!("edge")).is_err());
        assert_eq!(
            serde_json::to_value(CameraStatus::Ready).unwrap(),
            serde_json::json!("ready")
        );
    }

    #[test]
    fn acquisition_mode_defaults_to_sequence() {
        assert_eq!(AcquisitionMode::default(), AcquisitionMode::Sequence);
        assert_eq!(AcquisitionMode::Snap.to_string(), "snap");
    }
}

//! Driver options.
//!
//! Example station file:
//!
//! ```toml
//! [hamamatsu_imagem_x2.options]
//! dll_location = 'C:\dcam\dlls'   # directory holding dcamapi.dll
//! default_exposure = 1.0           # seconds
//! default_gain = 1.0
//! default_acquisition_mode = "sequence"
//! default_trigger_mode = "int"
//! default_roi = [0, 1, 0, 1]       # hstart, hend, vstart, vend
//! default_hbin = 1
//! ```

use daq_core::camera::{AcquisitionMode, Roi, TriggerMode};
use daq_core::config::{load_options, ValidateOptions};
use daq_core::error::{AppResult, DaqError};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// Section name of the driver in a station file.
pub const CONFIG_SECTION: &str = "hamamatsu_imagem_x2";

/// Environment prefix for option overrides, e.g. `DAQ_IMAGEM_DEFAULT_GAIN`.
pub const ENV_PREFIX: &str = "DAQ_IMAGEM_";

/// Options for [`crate::ImagEmX2Driver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagEmConfig {
    /// Directory containing the DCAM-API runtime
    pub dll_location: PathBuf,

    /// Exposure applied on activation, in seconds
    #[serde(default = "default_exposure")]
    pub default_exposure: f64,

    /// Gain cached on activation
    #[serde(default = "default_gain")]
    pub default_gain: f64,

    /// Preferred acquisition mode
    #[serde(default)]
    pub default_acquisition_mode: AcquisitionMode,

    /// Preferred trigger source
    #[serde(default)]
    pub default_trigger_mode: TriggerMode,

    /// Preferred readout region as `[hstart, hend, vstart, vend]`, inclusive
    #[serde(default = "default_roi", alias = "default_ROI")]
    pub default_roi: [u32; 4],

    /// Binning value cached on activation. Whole-number floats (`1.0`) are accepted.
    #[serde(default = "default_hbin", deserialize_with = "whole_number")]
    pub default_hbin: u32,
}

fn default_exposure() -> f64 {
    1.0
}
fn default_gain() -> f64 {
    1.0
}
fn default_roi() -> [u32; 4] {
    [0, 1, 0, 1]
}
fn default_hbin() -> u32 {
    1
}

fn whole_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Int(u32),
        Float(f64),
    }

    match Number::deserialize(deserializer)? {
        Number::Int(value) => Ok(value),
        Number::Float(value)
            if value.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&value) =>
        {
            Ok(value as u32)
        }
        Number::Float(value) => Err(D::Error::custom(format!(
            "expected a whole number, got {}",
            value
        ))),
    }
}

impl ImagEmConfig {
    /// Options with defaults for everything but the library directory.
    pub fn new(dll_location: impl Into<PathBuf>) -> Self {
        Self {
            dll_location: dll_location.into(),
            default_exposure: default_exposure(),
            default_gain: default_gain(),
            default_acquisition_mode: AcquisitionMode::default(),
            default_trigger_mode: TriggerMode::default(),
            default_roi: default_roi(),
            default_hbin: default_hbin(),
        }
    }

    /// Load from a station file, with `DAQ_IMAGEM_*` environment overrides.
    pub fn load(path: &Path) -> AppResult<Self> {
        load_options(path, CONFIG_SECTION, ENV_PREFIX)
    }

    /// `default_roi` with `default_hbin` applied to both axes.
    pub fn default_region(&self) -> Roi {
        let [hstart, hend, vstart, vend] = self.default_roi;
        Roi::new(hstart, hend, vstart, vend, self.default_hbin)
    }
}

impl ValidateOptions for ImagEmConfig {
    fn validate(&self) -> AppResult<()> {
        if self.dll_location.as_os_str().is_empty() {
            return Err(DaqError::Configuration("dll_location must be set".into()));
        }
        if !self.default_exposure.is_finite() || self.default_exposure <= 0.0 {
            return Err(DaqError::Configuration(format!(
                "default_exposure must be a positive number of seconds, got {}",
                self.default_exposure
            )));
        }
        if !self.default_gain.is_finite() {
            return Err(DaqError::Configuration("default_gain must be finite".into()));
        }
        if self.default_hbin == 0 {
            return Err(DaqError::Configuration("default_hbin must be at least 1".into()));
        }
        self.default_region()
            .validate()
            .map_err(|e| DaqError::Configuration(format!("default_roi: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_fill_missing_options() {
        let file = write_config(
            "[hamamatsu_imagem_x2.options]\ndll_location = 'C:\\dcam\\dlls'\n",
        );
        let cfg = ImagEmConfig::load(file.path()).unwrap();
        assert_eq!(cfg, ImagEmConfig::new(r"C:\dcam\dlls"));
        assert_eq!(cfg.default_region(), Roi::new(0, 1, 0, 1, 1));
    }

    #[test]
    fn parses_all_options() {
        let file = write_config(
            r#"
dll_location = "/opt/dcam"
default_exposure = 0.25
default_gain = 3.0
default_acquisition_mode = "snap"
default_trigger_mode = "master_pulse"
default_roi = [10, 109, 20, 219]
default_hbin = 2
"#,
        );
        let cfg = ImagEmConfig::load(file.path()).unwrap();
        assert_eq!(cfg.default_acquisition_mode, AcquisitionMode::Snap);
        assert_eq!(cfg.default_trigger_mode, TriggerMode::MasterPulse);
        assert_eq!(cfg.default_region(), Roi::new(10, 109, 20, 219, 2));
        assert!((cfg.default_exposure - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn accepts_station_file_key_spelling() {
        let file = write_config(
            r#"
[hamamatsu_imagem_x2.options]
dll_location = 'C:\dcam\dlls'
default_exposure = 1.0
default_gain = 1.0
default_ROI = [10, 109, 20, 219]
default_hbin = 2.0
"#,
        );
        let cfg = ImagEmConfig::load(file.path()).unwrap();
        assert_eq!(cfg.default_roi, [10, 109, 20, 219]);
        assert_eq!(cfg.default_hbin, 2);
        assert_eq!(cfg.default_region(), Roi::new(10, 109, 20, 219, 2));
    }

    #[test]
    fn fractional_binning_is_rejected() {
        let file = write_config("dll_location = \"/opt/dcam\"\ndefault_hbin = 1.5\n");
        assert!(matches!(
            ImagEmConfig::load(file.path()),
            Err(DaqError::Config(_))
        ));
    }

    #[test]
    fn missing_dll_location_is_an_error() {
        let file = write_config("default_exposure = 1.0\n");
        assert!(matches!(
            ImagEmConfig::load(file.path()),
            Err(DaqError::Config(_))
        ));
    }

    #[test]
    fn unknown_trigger_mode_is_rejected() {
        let file = write_config("dll_location = \"/opt/dcam\"\ndefault_trigger_mode = \"edge\"\n");
        assert!(ImagEmConfig::load(file.path()).is_err());
    }

    #[test]
    fn non_positive_exposure_fails_validation() {
        let mut cfg = ImagEmConfig::new("/opt/dcam");
        cfg.default_exposure = 0.0;
        assert!(matches!(cfg.validate(), Err(DaqError::Configuration(_))));
    }

    #[test]
    fn reversed_default_roi_fails_validation() {
        let mut cfg = ImagEmConfig::new("/opt/dcam");
        cfg.default_roi = [5, 1, 0, 1];
        assert!(cfg.validate().is_err());
    }
}

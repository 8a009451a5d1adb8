//! Hamamatsu ImagEM X2 EMCCD Camera Driver
//!
//! Adapts a DCAM-API camera session to the framework's [`Module`] lifecycle and
//! [`CameraInterface`] contract. Components:
//! - Connection: DLL registration and the device session
//! - Acquisition: single-frame and live capture
//! - Features: argument checks and conversions
//!
//! The backend is chosen at compile time: [`MockDcam`] (feature `mock`, default)
//! simulates the camera; `DcamApiBackend` (feature `dcam_sdk`) talks to the
//! vendor runtime.
//!
//! ```no_run
//! # #[cfg(feature = "mock")]
//! # fn main() -> anyhow::Result<()> {
//! use daq_core::camera::CameraInterface;
//! use daq_core::modules::Module;
//! use daq_driver_hamamatsu::{ImagEmConfig, ImagEmX2Driver, MockDcam};
//!
//! let mut camera = ImagEmX2Driver::new(ImagEmConfig::new("/opt/dcam"), MockDcam::new());
//! camera.on_activate()?;
//! camera.start_single_acquisition()?;
//! let frame = camera.get_acquired_data()?;
//! camera.on_deactivate()?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "mock"))]
//! # fn main() {}
//! ```

pub mod capabilities;
pub mod components;
pub mod config;

use anyhow::{Context, Result};
use daq_core::camera::{CameraInterface, CameraStatus, Roi, TriggerMode};
use daq_core::data::Frame;
use daq_core::modules::{Module, ModuleState};
use std::path::Path;

use crate::components::acquisition;
use crate::components::connection::DcamConnection;
use crate::components::features;
use crate::components::sdk::{DcamBackend, DcamCamera};

pub use crate::capabilities::SharedImagEmX2;
pub use crate::config::ImagEmConfig;

#[cfg(feature = "mock")]
pub use crate::components::mock::MockDcam;

#[cfg(feature = "dcam_sdk")]
pub use crate::components::dcamapi::DcamApiBackend;

/// Driver identifier used in errors and station files.
pub const DRIVER_TYPE: &str = "hamamatsu_imagem_x2";

/// Driver backed by the vendor DCAM-API runtime.
#[cfg(feature = "dcam_sdk")]
pub type NativeImagEmX2Driver = ImagEmX2Driver<DcamApiBackend>;

/// Driver for the Hamamatsu ImagEM X2 EMCCD camera.
///
/// Gain and binning value are bookkeeping only: they are remembered for callers but
/// never sent to the device. Every other call forwards to the open session and fails
/// with [`daq_core::error::DaqError::ModuleNotActive`] while deactivated.
pub struct ImagEmX2Driver<B: DcamBackend> {
    config: ImagEmConfig,
    backend: B,
    connection: DcamConnection<B>,
    gain: f64,
    binning: u32,
}

impl<B: DcamBackend> ImagEmX2Driver<B> {
    /// Create a deactivated driver.
    pub fn new(config: ImagEmConfig, backend: B) -> Self {
        let gain = config.default_gain;
        let binning = config.default_hbin;
        Self {
            config,
            backend,
            connection: DcamConnection::new(),
            gain,
            binning,
        }
    }

    /// Load options from a station file and create a deactivated driver.
    pub fn from_config_file(path: &Path, backend: B) -> Result<Self> {
        let config = ImagEmConfig::load(path)
            .with_context(|| format!("Failed to load {} options", DRIVER_TYPE))?;
        Ok(Self::new(config, backend))
    }

    /// Loaded options.
    pub fn config(&self) -> &ImagEmConfig {
        &self.config
    }

    /// Backend handle.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn camera(&self) -> Result<&B::Camera> {
        self.connection.camera(DRIVER_TYPE)
    }

    fn camera_mut(&mut self) -> Result<&mut B::Camera> {
        self.connection.camera_mut(DRIVER_TYPE)
    }

    /// All frames captured since the last read.
    pub fn get_acquired_frames(&mut self) -> Result<Vec<Frame>> {
        acquisition::unread_frames(self.camera_mut()?)
    }

    /// Raw capture status.
    pub fn status(&self) -> Result<CameraStatus> {
        self.camera()?.status()
    }

    /// Set EM contrast gain on the device.
    pub fn set_contrast_gain(&mut self, value: f64) -> Result<()> {
        tracing::debug!("Setting contrast gain to {}", value);
        self.camera_mut()?.set_contrast_gain(value)
    }

    /// EM contrast gain reported by the device.
    pub fn get_contrast_gain(&self) -> Result<f64> {
        self.camera()?.get_contrast_gain()
    }

    /// Set sensitivity on the device.
    pub fn set_sensitivity(&mut self, value: f64) -> Result<()> {
        tracing::debug!("Setting sensitivity to {}", value);
        self.camera_mut()?.set_sensitivity(value)
    }

    /// Sensitivity reported by the device.
    pub fn get_sensitivity(&self) -> Result<f64> {
        self.camera()?.get_sensitivity()
    }

    /// Set the readout region. Indices are inclusive; `hbin` applies to both axes.
    pub fn set_region_of_interest(
        &mut self,
        hstart: u32,
        hend: u32,
        vstart: u32,
        vend: u32,
        hbin: u32,
    ) -> Result<()> {
        let roi = features::region(DRIVER_TYPE, hstart, hend, vstart, vend, hbin)?;
        tracing::debug!("Setting ROI to {:?}", roi);
        self.camera_mut()?.set_roi(roi)
    }

    /// Current readout region.
    pub fn get_roi(&self) -> Result<Roi> {
        self.camera()?.get_roi()
    }

    /// Select the trigger source.
    pub fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<()> {
        tracing::debug!("Setting trigger mode to '{}'", mode);
        self.camera_mut()?.set_trigger_mode(mode)
    }

    /// Select the trigger source by name (`int`, `ext`, `software`, `master_pulse`).
    pub fn set_trigger_mode_str(&mut self, mode: &str) -> Result<()> {
        let mode: TriggerMode = mode.parse()?;
        self.set_trigger_mode(mode)
    }

    /// Current trigger source.
    pub fn get_trigger_mode(&self) -> Result<TriggerMode> {
        self.camera()?.get_trigger_mode()
    }

    /// Remember a binning value.
    pub fn set_binning_value(&mut self, value: u32) -> Result<()> {
        features::validate_binning(DRIVER_TYPE, value)?;
        self.binning = value;
        Ok(())
    }

    /// Last binning value set.
    pub fn get_binning_value(&self) -> u32 {
        self.binning
    }
}

impl<B: DcamBackend> Module for ImagEmX2Driver<B> {
    fn module_name(&self) -> &str {
        DRIVER_TYPE
    }

    fn on_activate(&mut self) -> Result<()> {
        if self.connection.is_open() {
            tracing::warn!("{} already active", DRIVER_TYPE);
            return Ok(());
        }

        tracing::info!(
            "Activating {} (DCAM-API at {})",
            DRIVER_TYPE,
            self.config.dll_location.display()
        );
        self.connection
            .open(&self.backend, &self.config.dll_location)?;

        let exposure = self.config.default_exposure;
        if let Err(e) = self.set_exposure(exposure) {
            if let Err(close_err) = self.connection.close() {
                tracing::warn!("Error closing camera after failed activation: {:#}", close_err);
            }
            return Err(e.context("Failed to apply default exposure"));
        }
        self.set_gain(self.config.default_gain)?;
        self.binning = self.config.default_hbin;

        tracing::info!("{} active", DRIVER_TYPE);
        Ok(())
    }

    fn on_deactivate(&mut self) -> Result<()> {
        if !self.connection.is_open() {
            tracing::warn!("{} already inactive", DRIVER_TYPE);
            return Ok(());
        }
        tracing::info!("Deactivating {}", DRIVER_TYPE);
        self.connection.close()
    }

    fn module_state(&self) -> ModuleState {
        if self.connection.is_open() {
            ModuleState::Idle
        } else {
            ModuleState::Deactivated
        }
    }
}

impl<B: DcamBackend> CameraInterface for ImagEmX2Driver<B> {
    fn get_name(&self) -> Result<String> {
        Ok(features::camera_name(&self.camera()?.device_info()?))
    }

    fn get_size(&self) -> Result<(u32, u32)> {
        features::frame_size(self.camera()?)
    }

    fn support_live_acquisition(&self) -> bool {
        true
    }

    fn start_live_acquisition(&mut self) -> Result<bool> {
        acquisition::live(self.camera_mut()?)
    }

    fn start_single_acquisition(&mut self) -> Result<bool> {
        acquisition::single(self.camera_mut()?)
    }

    fn stop_acquisition(&mut self) -> Result<bool> {
        acquisition::stop(self.camera_mut()?)
    }

    fn get_acquired_data(&mut self) -> Result<Option<Frame>> {
        acquisition::newest_frame(self.camera_mut()?)
    }

    fn set_exposure(&mut self, seconds: f64) -> Result<()> {
        features::validate_exposure(DRIVER_TYPE, seconds)?;
        tracing::debug!("Setting exposure to {} s", seconds);
        self.camera_mut()?.set_exposure(seconds)
    }

    fn get_exposure(&self) -> Result<f64> {
        self.camera()?.get_exposure()
    }

    fn set_gain(&mut self, gain: f64) -> Result<()> {
        tracing::debug!("Caching gain {}", gain);
        self.gain = gain;
        Ok(())
    }

    fn get_gain(&self) -> Result<f64> {
        Ok(self.gain)
    }

    fn get_ready_state(&self) -> Result<bool> {
        Ok(self.status()? == CameraStatus::Ready)
    }
}

//! Device-control seam.
//!
//! [`DcamCamera`] is the camera object of the device-control layer that sits in
//! front of the vendor DCAM-API: attribute get/set, acquisition setup/start/stop,
//! frame waits and buffer reads. [`DcamBackend`] opens a session.
//!
//! The driver only ever forwards to these calls; it keeps no acquisition state of
//! its own beyond what the SDK reports.

use anyhow::Result;
use daq_core::camera::{AcquisitionMode, CameraStatus, Roi, TriggerMode};
use daq_core::data::Frame;

/// Identification strings reported by the device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    /// Manufacturer
    pub vendor: String,
    /// Model name, e.g. `C9100-23B`
    pub model: String,
    /// Serial number
    pub serial_number: String,
    /// Firmware/camera version
    pub camera_version: String,
}

impl DeviceInfo {
    /// Non-empty fields in display order.
    pub fn name_parts(&self) -> Vec<&str> {
        [
            self.vendor.as_str(),
            self.model.as_str(),
            self.serial_number.as_str(),
            self.camera_version.as_str(),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect()
    }
}

/// An open camera session.
///
/// Implementations are used from a single thread at a time; blocking calls
/// (`wait_for_frame`) block that thread.
pub trait DcamCamera: Send {
    /// Device identification.
    fn device_info(&self) -> Result<DeviceInfo>;

    /// Dimensions of the frames the current settings produce, as `(rows, cols)`.
    fn data_dimensions(&self) -> Result<(u32, u32)>;

    /// Set exposure in seconds.
    fn set_exposure(&mut self, seconds: f64) -> Result<()>;
    /// Exposure in seconds.
    fn get_exposure(&self) -> Result<f64>;

    /// Set EM contrast gain.
    fn set_contrast_gain(&mut self, value: f64) -> Result<()>;
    /// EM contrast gain.
    fn get_contrast_gain(&self) -> Result<f64>;

    /// Set sensitivity.
    fn set_sensitivity(&mut self, value: f64) -> Result<()>;
    /// Sensitivity.
    fn get_sensitivity(&self) -> Result<f64>;

    /// Select the trigger source.
    fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<()>;
    /// Current trigger source.
    fn get_trigger_mode(&self) -> Result<TriggerMode>;

    /// Set the readout region.
    fn set_roi(&mut self, roi: Roi) -> Result<()>;
    /// Current readout region.
    fn get_roi(&self) -> Result<Roi>;

    /// Allocate buffers for an acquisition of `nframes` frames.
    fn setup_acquisition(&mut self, mode: AcquisitionMode, nframes: u32) -> Result<()>;
    /// Start capturing into the buffers.
    fn start_acquisition(&mut self, mode: AcquisitionMode, nframes: u32) -> Result<()>;
    /// Block until a new frame is ready.
    fn wait_for_frame(&mut self) -> Result<()>;
    /// Stop capturing.
    fn stop_acquisition(&mut self) -> Result<()>;
    /// Whether capture is still running.
    fn acquisition_in_progress(&self) -> Result<bool>;

    /// Capture status.
    fn status(&self) -> Result<CameraStatus>;

    /// Newest frame in the buffer, `None` if no frame was captured yet.
    fn read_newest_image(&mut self) -> Result<Option<Frame>>;
    /// All frames captured since the last read.
    fn read_multiple_images(&mut self) -> Result<Vec<Frame>>;

    /// Close the session. Called exactly once by the driver.
    fn close(&mut self) -> Result<()>;
}

/// Opens camera sessions.
pub trait DcamBackend {
    /// Session type.
    type Camera: DcamCamera;

    /// Open the camera. The vendor library directory is registered before this is
    /// called (see [`crate::components::dll_path`]).
    fn open(&self) -> Result<Self::Camera>;
}

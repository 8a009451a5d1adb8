//! Simulated DCAM camera.
//!
//! [`MockDcam`] stands in for the device-control layer when no camera is attached.
//! It keeps an ordered log of every call ([`SdkCall`]) so tests can assert exactly
//! what the driver forwarded, and lets tests steer the reported status, the trigger
//! source, and failures on open/close/stop.
//!
//! The backend handle is cheap to clone; all clones and every session it opens share
//! the same state.

use crate::components::dll_path;
use crate::components::sdk::{DcamBackend, DcamCamera, DeviceInfo};
use anyhow::{bail, Result};
use daq_core::camera::{AcquisitionMode, CameraStatus, Roi, TriggerMode};
use daq_core::data::Frame;
use daq_core::error::{DriverError, DriverErrorKind};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

const DRIVER_TYPE: &str = "mock_dcam";

/// ImagEM X2 sensor size
pub const MOCK_SENSOR_WIDTH: u32 = 512;
/// ImagEM X2 sensor size
pub const MOCK_SENSOR_HEIGHT: u32 = 512;

/// One call received by the simulated camera.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum SdkCall {
    /// Session opened; records the DCAM-API directory registered at that moment.
    Open { dll_dir: Option<PathBuf> },
    DeviceInfo,
    DataDimensions,
    SetExposure(f64),
    GetExposure,
    SetContrastGain(f64),
    GetContrastGain,
    SetSensitivity(f64),
    GetSensitivity,
    SetTriggerMode(TriggerMode),
    GetTriggerMode,
    SetRoi(Roi),
    GetRoi,
    SetupAcquisition {
        mode: AcquisitionMode,
        nframes: u32,
    },
    StartAcquisition {
        mode: AcquisitionMode,
        nframes: u32,
    },
    WaitForFrame,
    StopAcquisition,
    AcquisitionInProgress,
    Status,
    ReadNewestImage,
    ReadMultipleImages,
    Close,
}

#[derive(Debug)]
struct MockState {
    info: DeviceInfo,
    exposure_s: f64,
    contrast_gain: f64,
    sensitivity: f64,
    trigger_mode: TriggerMode,
    roi: Roi,
    status: CameraStatus,
    mode: Option<AcquisitionMode>,
    in_progress: bool,
    frame_counter: u64,
    newest: Option<Frame>,
    unread: Vec<Frame>,
    calls: Vec<SdkCall>,

    // Fault injection
    fail_open: Option<String>,
    fail_close: Option<String>,
    forced_status: Option<CameraStatus>,
    ignore_stop: bool,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            info: DeviceInfo {
                vendor: "Hamamatsu".to_string(),
                model: "C9100-23B".to_string(),
                serial_number: "S/N: 000123".to_string(),
                camera_version: String::new(),
            },
            exposure_s: 0.1,
            contrast_gain: 0.0,
            sensitivity: 1.0,
            trigger_mode: TriggerMode::Internal,
            roi: Roi::new(0, MOCK_SENSOR_WIDTH - 1, 0, MOCK_SENSOR_HEIGHT - 1, 1),
            status: CameraStatus::Stable,
            mode: None,
            in_progress: false,
            frame_counter: 0,
            newest: None,
            unread: Vec::new(),
            calls: Vec::new(),
            fail_open: None,
            fail_close: None,
            forced_status: None,
            ignore_stop: false,
        }
    }
}

impl MockState {
    fn frame_dims(&self) -> (u32, u32) {
        (
            self.roi.width() / self.roi.hbin.max(1),
            self.roi.height() / self.roi.vbin.max(1),
        )
    }

    fn capture(&mut self) -> Result<()> {
        let (width, height) = self.frame_dims();
        let pixels = test_pattern(width, height, self.frame_counter);
        let frame = Frame::from_u16(width, height, &pixels)?;
        self.frame_counter += 1;
        self.unread.push(frame.clone());
        self.newest = Some(frame);
        Ok(())
    }

    fn settle_status(&mut self, status: CameraStatus) {
        self.status = self.forced_status.unwrap_or(status);
    }
}

/// Diagonal gradient offset by the frame number.
fn test_pattern(width: u32, height: u32, frame_num: u64) -> Vec<u16> {
    let mut buffer = Vec::with_capacity((width * height) as usize);
    for y in 0..height as u64 {
        for x in 0..width as u64 {
            buffer.push(((x + y + frame_num) % 4096) as u16);
        }
    }
    buffer
}

/// Simulated backend and test handle.
#[derive(Debug, Clone, Default)]
pub struct MockDcam {
    state: Arc<Mutex<MockState>>,
}

impl MockDcam {
    /// Create a simulated camera in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls received so far, oldest first.
    pub fn calls(&self) -> Vec<SdkCall> {
        self.state.lock().calls.clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Number of recorded calls matching `pred`.
    pub fn count_calls(&self, pred: impl Fn(&SdkCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// Override the reported capture status.
    pub fn set_status(&self, status: CameraStatus) {
        self.state.lock().status = status;
    }

    /// Pin the status reported after every acquisition step (e.g. a capture error).
    pub fn force_status(&self, status: Option<CameraStatus>) {
        let mut state = self.state.lock();
        state.forced_status = status;
        if let Some(status) = status {
            state.status = status;
        }
    }

    /// Change the trigger source behind the driver's back.
    pub fn set_trigger_mode(&self, mode: TriggerMode) {
        self.state.lock().trigger_mode = mode;
    }

    /// Device-side exposure value.
    pub fn exposure(&self) -> f64 {
        self.state.lock().exposure_s
    }

    /// Make the next `open` fail.
    pub fn fail_open(&self, message: impl Into<String>) {
        self.state.lock().fail_open = Some(message.into());
    }

    /// Make `close` fail (the session is still considered closed).
    pub fn fail_close(&self, message: impl Into<String>) {
        self.state.lock().fail_close = Some(message.into());
    }

    /// Keep reporting acquisition in progress after a stop request.
    pub fn ignore_stop(&self, ignore: bool) {
        self.state.lock().ignore_stop = ignore;
    }

    /// Whether capture is running.
    pub fn in_progress(&self) -> bool {
        self.state.lock().in_progress
    }
}

impl DcamBackend for MockDcam {
    type Camera = MockDcamCamera;

    fn open(&self) -> Result<MockDcamCamera> {
        let mut state = self.state.lock();
        state.calls.push(SdkCall::Open {
            dll_dir: dll_path::lookup(dll_path::DCAMAPI),
        });
        if let Some(message) = state.fail_open.take() {
            return Err(
                DriverError::new(DRIVER_TYPE, DriverErrorKind::Initialization, message).into(),
            );
        }
        state.status = CameraStatus::Stable;
        tracing::debug!("Mock DCAM session opened");
        Ok(MockDcamCamera {
            state: Arc::clone(&self.state),
            closed: false,
        })
    }
}

/// Session on the simulated camera.
#[derive(Debug)]
pub struct MockDcamCamera {
    state: Arc<Mutex<MockState>>,
    closed: bool,
}

impl MockDcamCamera {
    /// Record `call` and hand back the state, failing if the session is closed.
    fn record(&self, call: SdkCall) -> Result<parking_lot::MutexGuard<'_, MockState>> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if self.closed {
            return Err(DriverError::new(
                DRIVER_TYPE,
                DriverErrorKind::Communication,
                "session is closed",
            )
            .into());
        }
        Ok(state)
    }
}

impl DcamCamera for MockDcamCamera {
    fn device_info(&self) -> Result<DeviceInfo> {
        Ok(self.record(SdkCall::DeviceInfo)?.info.clone())
    }

    fn data_dimensions(&self) -> Result<(u32, u32)> {
        let (width, height) = self.record(SdkCall::DataDimensions)?.frame_dims();
        Ok((height, width))
    }

    fn set_exposure(&mut self, seconds: f64) -> Result<()> {
        self.record(SdkCall::SetExposure(seconds))?.exposure_s = seconds;
        Ok(())
    }

    fn get_exposure(&self) -> Result<f64> {
        Ok(self.record(SdkCall::GetExposure)?.exposure_s)
    }

    fn set_contrast_gain(&mut self, value: f64) -> Result<()> {
        self.record(SdkCall::SetContrastGain(value))?.contrast_gain = value;
        Ok(())
    }

    fn get_contrast_gain(&self) -> Result<f64> {
        Ok(self.record(SdkCall::GetContrastGain)?.contrast_gain)
    }

    fn set_sensitivity(&mut self, value: f64) -> Result<()> {
        self.record(SdkCall::SetSensitivity(value))?.sensitivity = value;
        Ok(())
    }

    fn get_sensitivity(&self) -> Result<f64> {
        Ok(self.record(SdkCall::GetSensitivity)?.sensitivity)
    }

    fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<()> {
        self.record(SdkCall::SetTriggerMode(mode))?.trigger_mode = mode;
        Ok(())
    }

    fn get_trigger_mode(&self) -> Result<TriggerMode> {
        Ok(self.record(SdkCall::GetTriggerMode)?.trigger_mode)
    }

    fn set_roi(&mut self, roi: Roi) -> Result<()> {
        let mut state = self.record(SdkCall::SetRoi(roi))?;
        if roi.hend >= MOCK_SENSOR_WIDTH || roi.vend >= MOCK_SENSOR_HEIGHT {
            bail!(DriverError::new(
                DRIVER_TYPE,
                DriverErrorKind::Configuration,
                format!(
                    "ROI {:?} exceeds sensor {}x{}",
                    roi, MOCK_SENSOR_WIDTH, MOCK_SENSOR_HEIGHT
                ),
            ));
        }
        state.roi = roi;
        state.settle_status(CameraStatus::Stable);
        Ok(())
    }

    fn get_roi(&self) -> Result<Roi> {
        Ok(self.record(SdkCall::GetRoi)?.roi)
    }

    fn setup_acquisition(&mut self, mode: AcquisitionMode, nframes: u32) -> Result<()> {
        let mut state = self.record(SdkCall::SetupAcquisition { mode, nframes })?;
        if nframes == 0 {
            bail!("frame buffer must hold at least one frame");
        }
        state.mode = Some(mode);
        state.unread.clear();
        state.settle_status(CameraStatus::Ready);
        Ok(())
    }

    fn start_acquisition(&mut self, mode: AcquisitionMode, nframes: u32) -> Result<()> {
        let mut state = self.record(SdkCall::StartAcquisition { mode, nframes })?;
        state.mode = Some(mode);
        state.in_progress = true;
        state.settle_status(CameraStatus::Busy);
        if mode == AcquisitionMode::Sequence {
            state.capture()?;
        }
        Ok(())
    }

    fn wait_for_frame(&mut self) -> Result<()> {
        let mut state = self.record(SdkCall::WaitForFrame)?;
        if !state.in_progress {
            bail!("no acquisition running");
        }
        state.capture()?;
        if state.mode == Some(AcquisitionMode::Snap) {
            state.in_progress = false;
            state.settle_status(CameraStatus::Ready);
        }
        Ok(())
    }

    fn stop_acquisition(&mut self) -> Result<()> {
        let mut state = self.record(SdkCall::StopAcquisition)?;
        if !state.ignore_stop {
            state.in_progress = false;
            state.settle_status(CameraStatus::Ready);
        }
        Ok(())
    }

    fn acquisition_in_progress(&self) -> Result<bool> {
        Ok(self.record(SdkCall::AcquisitionInProgress)?.in_progress)
    }

    fn status(&self) -> Result<CameraStatus> {
        Ok(self.record(SdkCall::Status)?.status)
    }

    fn read_newest_image(&mut self) -> Result<Option<Frame>> {
        let mut state = self.record(SdkCall::ReadNewestImage)?;
        if state.in_progress && state.mode == Some(AcquisitionMode::Sequence) {
            state.capture()?;
        }
        state.unread.clear();
        Ok(state.newest.clone())
    }

    fn read_multiple_images(&mut self) -> Result<Vec<Frame>> {
        let mut state = self.record(SdkCall::ReadMultipleImages)?;
        Ok(std::mem::take(&mut state.unread))
    }

    fn close(&mut self) -> Result<()> {
        let failure = {
            let mut state = self.record(SdkCall::Close)?;
            state.in_progress = false;
            state.status = CameraStatus::Stable;
            state.fail_close.take()
        };
        self.closed = true;
        if let Some(message) = failure {
            return Err(DriverError::new(DRIVER_TYPE, DriverErrorKind::Shutdown, message).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snap_captures_one_frame_and_returns_to_ready() {
        let backend = MockDcam::new();
        let mut cam = backend.open().unwrap();
        cam.setup_acquisition(AcquisitionMode::Snap, 1).unwrap();
        cam.start_acquisition(AcquisitionMode::Snap, 1).unwrap();
        assert_eq!(cam.status().unwrap(), CameraStatus::Busy);
        cam.wait_for_frame().unwrap();
        assert_eq!(cam.status().unwrap(), CameraStatus::Ready);
        assert!(!cam.acquisition_in_progress().unwrap());
        let frame = cam.read_newest_image().unwrap().unwrap();
        assert_eq!(frame.width(), MOCK_SENSOR_WIDTH);
        assert_eq!(frame.height(), MOCK_SENSOR_HEIGHT);
    }

    #[test]
    fn data_dimensions_follow_binned_roi() {
        let backend = MockDcam::new();
        let mut cam = backend.open().unwrap();
        cam.set_roi(Roi::new(0, 99, 0, 49, 2)).unwrap();
        assert_eq!(cam.data_dimensions().unwrap(), (25, 50));
    }

    #[test]
    fn calls_after_close_fail() {
        let backend = MockDcam::new();
        let mut cam = backend.open().unwrap();
        cam.close().unwrap();
        assert!(cam.get_exposure().is_err());
        assert_eq!(backend.count_calls(|c| *c == SdkCall::Close), 1);
    }

    #[test]
    fn injected_open_failure_is_one_shot() {
        let backend = MockDcam::new();
        backend.fail_open("no camera found");
        assert!(backend.open().is_err());
        assert!(backend.open().is_ok());
    }

    #[test]
    fn read_multiple_drains_unread_frames() {
        let backend = MockDcam::new();
        let mut cam = backend.open().unwrap();
        cam.setup_acquisition(AcquisitionMode::Sequence, 100).unwrap();
        cam.start_acquisition(AcquisitionMode::Sequence, 100).unwrap();
        cam.wait_for_frame().unwrap();
        assert_eq!(cam.read_multiple_images().unwrap().len(), 2);
        assert!(cam.read_multiple_images().unwrap().is_empty());
    }

    #[test]
    fn test_pattern_shifts_with_frame_number() {
        let a = test_pattern(4, 2, 0);
        let b = test_pattern(4, 2, 1);
        assert_eq!(a[0], 0);
        assert_eq!(b[0], 1);
        assert_eq!(a.len(), 8);
    }
}

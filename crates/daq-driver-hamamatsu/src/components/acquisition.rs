//! DCAM Acquisition Logic
//!
//! Single-frame and live acquisition on an open session. Success of a start is read
//! back from the SDK status afterwards; success of a stop from whether capture is
//! still running.

use crate::components::sdk::DcamCamera;
use anyhow::Result;
use daq_core::camera::{AcquisitionMode, CameraStatus, TriggerMode};
use daq_core::data::Frame;

/// Frame buffer length used for live acquisition.
pub const LIVE_BUFFER_FRAMES: u32 = 100;

/// Switch to the internal trigger unless it is already selected.
pub fn ensure_internal_trigger<C: DcamCamera>(camera: &mut C) -> Result<()> {
    let current = camera.get_trigger_mode()?;
    if current != TriggerMode::Internal {
        tracing::warn!(
            "Trigger mode is '{}', switching to '{}' for acquisition",
            current,
            TriggerMode::Internal
        );
        camera.set_trigger_mode(TriggerMode::Internal)?;
    }
    Ok(())
}

/// Acquire one frame, blocking until the SDK reports it ready.
///
/// No timeout is applied here; the wait relies on the SDK's own semantics.
pub fn single<C: DcamCamera>(camera: &mut C) -> Result<bool> {
    ensure_internal_trigger(camera)?;
    tracing::debug!("Starting single-frame acquisition");
    camera.setup_acquisition(AcquisitionMode::Snap, 1)?;
    camera.start_acquisition(AcquisitionMode::Snap, 1)?;
    camera.wait_for_frame()?;
    started_without_error(camera)
}

/// Start continuous acquisition into a fixed-size ring of frames.
pub fn live<C: DcamCamera>(camera: &mut C) -> Result<bool> {
    ensure_internal_trigger(camera)?;
    tracing::debug!(
        "Starting live acquisition ({} frame buffer)",
        LIVE_BUFFER_FRAMES
    );
    camera.setup_acquisition(AcquisitionMode::Sequence, LIVE_BUFFER_FRAMES)?;
    camera.start_acquisition(AcquisitionMode::Sequence, LIVE_BUFFER_FRAMES)?;
    started_without_error(camera)
}

/// Request a stop; `true` once the SDK no longer reports capture in progress.
pub fn stop<C: DcamCamera>(camera: &mut C) -> Result<bool> {
    camera.stop_acquisition()?;
    let in_progress = camera.acquisition_in_progress()?;
    if in_progress {
        tracing::warn!("Acquisition still in progress after stop request");
    }
    Ok(!in_progress)
}

/// Newest frame only.
pub fn newest_frame<C: DcamCamera>(camera: &mut C) -> Result<Option<Frame>> {
    camera.read_newest_image()
}

/// Every frame captured since the last read.
pub fn unread_frames<C: DcamCamera>(camera: &mut C) -> Result<Vec<Frame>> {
    camera.read_multiple_images()
}

fn started_without_error<C: DcamCamera>(camera: &C) -> Result<bool> {
    let status = camera.status()?;
    if status == CameraStatus::Error {
        tracing::warn!("Camera reported error status after starting acquisition");
    }
    Ok(status != CameraStatus::Error)
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::components::mock::{MockDcam, SdkCall};
    use crate::components::sdk::DcamBackend;

    fn open() -> (MockDcam, crate::components::mock::MockDcamCamera) {
        let backend = MockDcam::new();
        let camera = backend.open().unwrap();
        backend.clear_calls();
        (backend, camera)
    }

    #[test]
    fn internal_trigger_is_not_reset() {
        let (backend, mut camera) = open();
        ensure_internal_trigger(&mut camera).unwrap();
        assert_eq!(backend.calls(), vec![SdkCall::GetTriggerMode]);
    }

    #[test]
    fn live_uses_sequence_buffer() {
        let (backend, mut camera) = open();
        assert!(live(&mut camera).unwrap());
        assert!(backend.calls().contains(&SdkCall::StartAcquisition {
            mode: AcquisitionMode::Sequence,
            nframes: LIVE_BUFFER_FRAMES,
        }));
        assert!(backend.in_progress());
    }

    #[test]
    fn stop_reports_when_capture_keeps_running() {
        let (backend, mut camera) = open();
        live(&mut camera).unwrap();
        backend.ignore_stop(true);
        assert!(!stop(&mut camera).unwrap());
        backend.ignore_stop(false);
        assert!(stop(&mut camera).unwrap());
    }

    #[test]
    fn error_status_maps_to_false() {
        let (backend, mut camera) = open();
        backend.force_status(Some(CameraStatus::Error));
        assert!(!single(&mut camera).unwrap());
    }
}

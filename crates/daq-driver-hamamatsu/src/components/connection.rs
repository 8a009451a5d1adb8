//! DCAM Connection Management
//!
//! Owns the camera session and the DLL path registration for the lifetime of an
//! activation. The registration is made before the device is opened and released
//! after it is closed.

use crate::components::dll_path::{self, DllRegistration};
use crate::components::sdk::{DcamBackend, DcamCamera};
use anyhow::{Context, Result};
use daq_core::error::DaqError;
use std::path::Path;

/// Open session plus the library registration it depends on.
///
/// Field order matters: `camera` drops before `registration`.
pub struct DcamConnection<B: DcamBackend> {
    camera: Option<B::Camera>,
    registration: Option<DllRegistration>,
}

impl<B: DcamBackend> Default for DcamConnection<B> {
    fn default() -> Self {
        Self {
            camera: None,
            registration: None,
        }
    }
}

impl<B: DcamBackend> DcamConnection<B> {
    /// Create a new, unconnected connection manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `dll_location` and open the camera.
    ///
    /// On failure the registration is released again and no session is held.
    pub fn open(&mut self, backend: &B, dll_location: &Path) -> Result<()> {
        if self.camera.is_some() {
            return Ok(()); // Already open
        }

        let registration = dll_path::register(dll_path::DCAMAPI, dll_location);
        let camera = backend.open().with_context(|| {
            format!(
                "Failed to open camera (DCAM-API at {})",
                dll_location.display()
            )
        })?;

        self.camera = Some(camera);
        self.registration = Some(registration);
        Ok(())
    }

    /// Close the camera if open and release the registration.
    ///
    /// The session is dropped exactly once, even when the device reports an error
    /// while closing; that error is returned afterwards.
    pub fn close(&mut self) -> Result<()> {
        let result = match self.camera.take() {
            Some(mut camera) => camera.close(),
            None => Ok(()),
        };
        self.registration = None;
        result.context("Failed to close camera")
    }

    /// Whether a session is held.
    pub fn is_open(&self) -> bool {
        self.camera.is_some()
    }

    /// Shared access to the session.
    pub fn camera(&self, module: &str) -> Result<&B::Camera> {
        self.camera
            .as_ref()
            .ok_or_else(|| DaqError::ModuleNotActive(module.to_string()).into())
    }

    /// Exclusive access to the session.
    pub fn camera_mut(&mut self, module: &str) -> Result<&mut B::Camera> {
        self.camera
            .as_mut()
            .ok_or_else(|| DaqError::ModuleNotActive(module.to_string()).into())
    }
}

impl<B: DcamBackend> Drop for DcamConnection<B> {
    fn drop(&mut self) {
        if self.camera.is_some() {
            tracing::warn!("Camera session dropped while open, closing");
            if let Err(e) = self.close() {
                tracing::warn!("Error closing camera on drop: {:#}", e);
            }
        }
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::components::mock::{MockDcam, SdkCall};
    use serial_test::serial;

    #[test]
    #[serial(dcamapi)]
    fn open_registers_path_before_opening() {
        let backend = MockDcam::new();
        let mut conn = DcamConnection::<MockDcam>::new();
        conn.open(&backend, Path::new("/opt/dcam")).unwrap();
        assert!(conn.is_open());
        assert_eq!(
            backend.calls()[0],
            SdkCall::Open {
                dll_dir: Some("/opt/dcam".into())
            }
        );
        conn.close().unwrap();
        assert_eq!(dll_path::lookup(dll_path::DCAMAPI), None);
    }

    #[test]
    #[serial(dcamapi)]
    fn failed_open_releases_registration() {
        let backend = MockDcam::new();
        backend.fail_open("camera not found");
        let mut conn = DcamConnection::<MockDcam>::new();
        let err = conn.open(&backend, Path::new("/opt/dcam")).unwrap_err();
        assert!(format!("{:#}", err).contains("camera not found"));
        assert!(!conn.is_open());
        assert_eq!(dll_path::lookup(dll_path::DCAMAPI), None);
    }

    #[test]
    #[serial(dcamapi)]
    fn close_is_idempotent() {
        let backend = MockDcam::new();
        let mut conn = DcamConnection::<MockDcam>::new();
        conn.open(&backend, Path::new("/opt/dcam")).unwrap();
        conn.close().unwrap();
        conn.close().unwrap();
        assert_eq!(backend.count_calls(|c| *c == SdkCall::Close), 1);
    }

    #[test]
    #[serial(dcamapi)]
    fn drop_closes_open_session() {
        let backend = MockDcam::new();
        {
            let mut conn = DcamConnection::<MockDcam>::new();
            conn.open(&backend, Path::new("/opt/dcam")).unwrap();
        }
        assert_eq!(backend.count_calls(|c| *c == SdkCall::Close), 1);
        assert_eq!(dll_path::lookup(dll_path::DCAMAPI), None);
    }

    #[test]
    fn camera_access_requires_open_session() {
        let conn = DcamConnection::<MockDcam>::new();
        let err = conn.camera("imagem").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DaqError>(),
            Some(DaqError::ModuleNotActive(_))
        ));
    }
}

//! Async capability facade.
//!
//! [`SharedImagEmX2`] lets the synchronous driver take part in the async acquisition
//! pipeline. Each call locks the driver and runs on tokio's blocking pool, so a
//! single-frame wait never stalls the runtime.

use crate::components::sdk::{DcamBackend, DcamCamera};
use crate::ImagEmX2Driver;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use daq_core::camera::CameraInterface;
use daq_core::capabilities::{ExposureControl, Frame, FrameProducer};
use daq_core::modules::Module;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Cloneable, thread-safe handle to an [`ImagEmX2Driver`].
pub struct SharedImagEmX2<B: DcamBackend> {
    inner: Arc<Mutex<ImagEmX2Driver<B>>>,
}

impl<B: DcamBackend> Clone for SharedImagEmX2<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B> SharedImagEmX2<B>
where
    B: DcamBackend + Send + 'static,
{
    /// Wrap a driver.
    pub fn new(driver: ImagEmX2Driver<B>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(driver)),
        }
    }

    /// Synchronous access, for calls without an async counterpart.
    pub fn lock(&self) -> MutexGuard<'_, ImagEmX2Driver<B>> {
        self.inner.lock()
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImagEmX2Driver<B>) -> Result<T> + Send + 'static,
    {
        let driver = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&mut *driver.lock()))
            .await
            .context("camera task panicked")?
    }

    /// Activate the driver off the runtime.
    pub async fn activate(&self) -> Result<()> {
        self.run(|d| d.on_activate()).await
    }

    /// Deactivate the driver off the runtime.
    pub async fn deactivate(&self) -> Result<()> {
        self.run(|d| d.on_deactivate()).await
    }
}

#[async_trait]
impl<B> ExposureControl for SharedImagEmX2<B>
where
    B: DcamBackend + Send + 'static,
{
    async fn set_exposure(&self, seconds: f64) -> Result<()> {
        self.run(move |d| d.set_exposure(seconds)).await
    }

    async fn get_exposure(&self) -> Result<f64> {
        self.run(|d| d.get_exposure()).await
    }
}

#[async_trait]
impl<B> FrameProducer for SharedImagEmX2<B>
where
    B: DcamBackend + Send + 'static,
{
    async fn start_stream(&self) -> Result<()> {
        self.run(|d| {
            if !d.start_live_acquisition()? {
                bail!("camera reported an error while starting live acquisition");
            }
            Ok(())
        })
        .await
    }

    async fn stop_stream(&self) -> Result<()> {
        self.run(|d| {
            if !d.stop_acquisition()? {
                bail!("acquisition still in progress after stop");
            }
            Ok(())
        })
        .await
    }

    async fn snap(&self) -> Result<Frame> {
        self.run(|d| {
            if !d.start_single_acquisition()? {
                bail!("camera reported an error during single acquisition");
            }
            d.get_acquired_data()?
                .ok_or_else(|| anyhow!("no frame available after single acquisition"))
        })
        .await
    }

    async fn latest_frame(&self) -> Result<Option<Frame>> {
        self.run(|d| d.get_acquired_data()).await
    }

    async fn resolution(&self) -> Result<(u32, u32)> {
        self.run(|d| d.get_size()).await
    }

    async fn is_streaming(&self) -> Result<bool> {
        self.run(|d| d.camera()?.acquisition_in_progress()).await
    }
}

//! Async Hardware Capabilities
//!
//! Fine-grained capability traits used by the asynchronous acquisition pipeline.
//! Synchronous hardware modules (see [`crate::camera::CameraInterface`]) expose
//! these through a thin facade that moves blocking calls off the async runtime.
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//! - Focuses on ONE thing

use anyhow::Result;
use async_trait::async_trait;

pub use crate::data::Frame;

/// Capability: Exposure Control
///
/// # Contract
/// - Exposure is in seconds (not milliseconds)
/// - Setting exposure does not start acquisition
/// - Exposure applies to next acquisition
#[async_trait]
pub trait ExposureControl: Send + Sync {
    /// Set exposure/integration time
    ///
    /// # Returns
    /// - Ok(()) if exposure set successfully
    /// - Err if value is out of hardware range
    async fn set_exposure(&self, seconds: f64) -> Result<()>;

    /// Get current exposure setting in seconds
    async fn get_exposure(&self) -> Result<f64>;
}

/// Capability: Frame Production
///
/// Devices that produce 2-D image frames.
#[async_trait]
pub trait FrameProducer: Send + Sync {
    /// Start continuous frame acquisition
    ///
    /// # Returns
    /// - Ok(()) if streaming started
    /// - Err if the device reported an error while starting
    async fn start_stream(&self) -> Result<()>;

    /// Stop frame acquisition
    async fn stop_stream(&self) -> Result<()>;

    /// Acquire exactly one frame and return it.
    async fn snap(&self) -> Result<Frame>;

    /// Most recent frame, if any.
    async fn latest_frame(&self) -> Result<Option<Frame>>;

    /// Frame resolution (width, height)
    async fn resolution(&self) -> Result<(u32, u32)>;

    /// Check if currently streaming
    async fn is_streaming(&self) -> Result<bool> {
        Ok(false)
    }
}

/// Marker for devices implementing the full async camera surface.
pub trait Camera: ExposureControl + FrameProducer {}

impl<T: ExposureControl + FrameProducer> Camera for T {}

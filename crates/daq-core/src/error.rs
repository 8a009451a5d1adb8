//! Custom error types for the hardware-module framework.
//!
//! This module defines the primary error type, `DaqError`, shared by the framework
//! and every driver crate. Using the `thiserror` crate, it provides a consistent way
//! to report configuration problems, lifecycle misuse and driver failures.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment` while extracting a module's options
//!   (missing keys, type mismatches, unreadable TOML).
//! - **`Configuration`**: Semantic errors in values that parsed correctly
//!   (e.g. a negative default exposure).
//! - **`Driver`**: A structured [`DriverError`] raised by a hardware driver.
//! - **`ModuleNotActive`**: A hardware call was made before `on_activate` or after
//!   `on_deactivate`.
//! - **`FeatureNotEnabled`**: The requested backend was not compiled in.
//!
//! Drivers return `anyhow::Result` at their public surface and convert into
//! `DaqError` with `?`, so callers can `downcast_ref::<DaqError>()` when they need to
//! branch on the category.

use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

/// Category of a driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Opening the device or loading the vendor library failed.
    Initialization,
    /// The driver was configured with values the hardware cannot accept.
    Configuration,
    /// A call into the vendor SDK returned a failure code.
    Communication,
    /// Closing the device failed.
    Shutdown,
    /// The device itself reported a fault.
    Hardware,
    /// A blocking wait expired.
    Timeout,
    /// An argument was rejected before reaching the SDK.
    InvalidParameter,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Configuration => "configuration",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Shutdown => "shutdown",
            DriverErrorKind::Hardware => "hardware",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::InvalidParameter => "invalid_parameter",
        };
        write!(f, "{}", label)
    }
}

/// Structured error raised by a hardware driver.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    /// Driver identifier, e.g. `hamamatsu_imagem_x2`.
    pub driver_type: String,
    /// Failure category.
    pub kind: DriverErrorKind,
    /// Human-readable detail, usually including the SDK call and code.
    pub message: String,
}

impl DriverError {
    /// Create a new driver error.
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Convenience alias for results using the framework error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Primary error type for the hardware-module framework.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Extracting module options failed.
    ///
    /// **Error Type**: Permanent - requires fixing the configuration file.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration values parsed but failed validation.
    ///
    /// # Example
    ///
    /// ```rust
    /// use daq_core::error::DaqError;
    ///
    /// fn validate_exposure(exposure_seconds: f64) -> Result<(), DaqError> {
    ///     if exposure_seconds <= 0.0 {
    ///         return Err(DaqError::Configuration(
    ///             "default_exposure must be positive".into()
    ///         ));
    ///     }
    ///     Ok(())
    /// }
    /// ```
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Standard I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A driver reported a structured failure.
    #[error("{0}")]
    Driver(#[from] DriverError),

    /// A hardware call was made while the module holds no device session.
    #[error("Module '{0}' is not active")]
    ModuleNotActive(String),

    /// Functionality was requested that this build does not include.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        DaqError::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_display_includes_kind_and_driver() {
        let err = DriverError::new(
            "hamamatsu_imagem_x2",
            DriverErrorKind::InvalidParameter,
            "exposure must be positive",
        );
        assert_eq!(
            err.to_string(),
            "Driver 'hamamatsu_imagem_x2' invalid_parameter error: exposure must be positive"
        );
    }

    #[test]
    fn driver_error_converts_into_daq_error() {
        let err: DaqError =
            DriverError::new("mock", DriverErrorKind::Shutdown, "close failed").into();
        assert!(matches!(
            err,
            DaqError::Driver(DriverError {
                kind: DriverErrorKind::Shutdown,
                ..
            })
        ));
    }

    #[test]
    fn module_not_active_names_module() {
        let err = DaqError::ModuleNotActive("camera".into());
        assert_eq!(err.to_string(), "Module 'camera' is not active");
    }
}

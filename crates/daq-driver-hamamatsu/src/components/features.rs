//! Argument checks and value conversions between the camera contract and the SDK.

use crate::components::sdk::{DcamCamera, DeviceInfo};
use anyhow::Result;
use daq_core::camera::Roi;
use daq_core::error::{DriverError, DriverErrorKind};

fn invalid(driver_type: &str, message: String) -> anyhow::Error {
    DriverError::new(driver_type, DriverErrorKind::InvalidParameter, message).into()
}

/// Exposure must be a finite, positive number of seconds.
pub fn validate_exposure(driver_type: &str, seconds: f64) -> Result<()> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(invalid(
            driver_type,
            format!("exposure must be a positive number of seconds, got {}", seconds),
        ));
    }
    Ok(())
}

/// Build a square-binned region, rejecting empty ranges and zero binning.
pub fn region(
    driver_type: &str,
    hstart: u32,
    hend: u32,
    vstart: u32,
    vend: u32,
    hbin: u32,
) -> Result<Roi> {
    let roi = Roi::new(hstart, hend, vstart, vend, hbin);
    roi.validate()
        .map_err(|e| invalid(driver_type, e.to_string()))?;
    Ok(roi)
}

/// Binning cache value; zero is rejected.
pub fn validate_binning(driver_type: &str, value: u32) -> Result<()> {
    if value == 0 {
        return Err(invalid(driver_type, "binning must be at least 1".to_string()));
    }
    Ok(())
}

/// Space-joined identification string, e.g. `Hamamatsu C9100-23B S/N: 000123`.
pub fn camera_name(info: &DeviceInfo) -> String {
    info.name_parts().join(" ")
}

/// Frame size as `(width, height)`; the SDK reports `(rows, cols)`.
pub fn frame_size<C: DcamCamera>(camera: &C) -> Result<(u32, u32)> {
    let (rows, cols) = camera.data_dimensions()?;
    Ok((cols, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposure_rejects_non_positive_and_nan() {
        assert!(validate_exposure("t", 0.5).is_ok());
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = validate_exposure("t", bad).unwrap_err();
            let driver = err.downcast_ref::<DriverError>().unwrap();
            assert_eq!(driver.kind, DriverErrorKind::InvalidParameter);
        }
    }

    #[test]
    fn region_applies_bin_to_both_axes() {
        let roi = region("t", 0, 99, 10, 59, 4).unwrap();
        assert_eq!((roi.hbin, roi.vbin), (4, 4));
        assert!(region("t", 10, 9, 0, 1, 1).is_err());
    }

    #[test]
    fn camera_name_skips_empty_fields() {
        let info = DeviceInfo {
            vendor: "Hamamatsu".into(),
            model: "C9100-23B".into(),
            serial_number: String::new(),
            camera_version: "1.0".into(),
        };
        assert_eq!(camera_name(&info), "Hamamatsu C9100-23B 1.0");
    }
}

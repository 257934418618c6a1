//! Seams to the sensor driver and image decoder.
//!
//! The crate never talks to camera hardware itself. A driver binding
//! implements [`SensorDriver`] and [`SensorDevice`]; decoded frames reach the
//! crate as [`DriverFrame`] handles on the driver's own callback threads.

use crate::types::{DeviceInfo, OutputMode, StreamKind};
use crate::{CaptureError, Result};
use std::sync::Arc;

/// A driver-owned frame handed to a frame-arrival callback.
///
/// `fill` is the image decoder: it writes the frame into a preallocated
/// buffer in the pixel format of the frame's stream kind, converting layout
/// (packed to planar, Bayer to RGB, ...) as needed.
pub trait DriverFrame {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Sensor clock timestamp in microseconds.
    fn timestamp_us(&self) -> u64;
    fn fill(&self, width: u32, height: u32, stride: usize, dst: &mut [u8]) -> Result<()>;
}

/// Frame-arrival callback: the decoded frame plus the cookie given at
/// registration, which identifies the originating device.
pub type FrameCallback = Arc<dyn Fn(&dyn DriverFrame, &str) + Send + Sync>;

/// One attached depth camera as exposed by the driver.
///
/// Implementations must be callable from any thread. Frame callbacks may be
/// invoked concurrently with each other and with every method here.
pub trait SensorDevice: Send + Sync {
    fn info(&self) -> DeviceInfo;

    fn has_stream(&self, kind: StreamKind) -> bool;
    fn is_mode_supported(&self, kind: StreamKind, mode: OutputMode) -> bool;
    fn set_output_mode(&self, kind: StreamKind, mode: OutputMode) -> Result<()>;
    fn output_mode(&self, kind: StreamKind) -> Option<OutputMode>;

    fn register_callback(&self, kind: StreamKind, callback: FrameCallback, cookie: String) -> Result<()>;
    fn start_stream(&self, kind: StreamKind) -> Result<()>;
    fn stop_stream(&self, kind: StreamKind) -> Result<()>;

    fn supports_registration(&self) -> bool;
    fn set_registration(&self, enabled: bool) -> Result<()>;
    fn supports_hw_sync(&self) -> bool;
    fn set_hw_sync(&self, enabled: bool) -> Result<()>;

    /// Focal length in pixels for an output of the given width.
    fn focal_length(&self, output_width: u32) -> f32;
    /// Distance between the projector and the depth sensor, in centimeters.
    fn baseline(&self) -> f32;
}

/// Entry point of a driver binding: enumerates attached devices.
pub trait SensorDriver: Send + Sync {
    fn device_count(&self) -> usize;
    fn device(&self, index: usize) -> Result<Arc<dyn SensorDevice>>;
}

/// Explicitly owned view of the devices a driver can reach.
///
/// Sessions are opened through a registry handed to them, so several
/// registries (a real driver and a mock, say) can coexist in one process.
#[derive(Clone)]
pub struct DeviceRegistry {
    driver: Arc<dyn SensorDriver>,
}

impl DeviceRegistry {
    pub fn new(driver: Arc<dyn SensorDriver>) -> Self {
        Self { driver }
    }

    pub fn device_count(&self) -> usize {
        self.driver.device_count()
    }

    /// Resolve the device at `index`.
    pub fn device(&self, index: usize) -> Result<Arc<dyn SensorDevice>> {
        let count = self.driver.device_count();
        if index >= count {
            return Err(CaptureError::DeviceIndexOutOfRange { index, count });
        }
        self.driver.device(index)
    }

    /// List all attached devices with their info.
    ///
    /// Devices the driver fails to open are skipped with a warning.
    pub fn list_devices(&self) -> Vec<DeviceInfo> {
        let mut devices = Vec::new();
        for index in 0..self.driver.device_count() {
            match self.driver.device(index) {
                Ok(device) => {
                    let mut info = device.info();
                    info.index = index;
                    devices.push(info);
                }
                Err(e) => {
                    log::warn!("Failed to query device {}: {}", index, e);
                }
            }
        }
        devices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDevice, MockDriver};

    #[test]
    fn test_device_index_out_of_range() {
        let driver = MockDriver::new(vec![MockDevice::new("dev-a")]);
        let registry = DeviceRegistry::new(Arc::new(driver));

        assert!(registry.device(0).is_ok());
        match registry.device(1) {
            Err(CaptureError::DeviceIndexOutOfRange { index, count }) => {
                assert_eq!(index, 1);
                assert_eq!(count, 1);
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_list_devices_assigns_indices() {
        let driver = MockDriver::new(vec![MockDevice::new("dev-a"), MockDevice::new("dev-b")]);
        let registry = DeviceRegistry::new(Arc::new(driver));

        let devices = registry.list_devices();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].index, 0);
        assert_eq!(devices[1].index, 1);
        assert_eq!(devices[1].connection, "dev-b");
    }
}

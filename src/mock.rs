//! In-memory sensor driver for tests and demos.
//!
//! [`MockDevice`] records every hardware call it receives and lets the caller
//! push frames from any thread, standing in for the driver's callback
//! threads.

use crate::driver::{DriverFrame, FrameCallback, SensorDevice, SensorDriver};
use crate::types::{DeviceInfo, OutputMode, StreamKind, StreamMask};
use crate::{CaptureError, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// A hardware call observed by a [`MockDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCall {
    SetOutputMode(StreamKind, OutputMode),
    RegisterCallback(StreamKind),
    StartStream(StreamKind),
    StopStream(StreamKind),
    SetRegistration(bool),
    SetHwSync(bool),
}

/// A frame whose every byte is `pixel`.
#[derive(Debug, Clone, Copy)]
pub struct MockFrame {
    pub kind: StreamKind,
    pub width: u32,
    pub height: u32,
    pub timestamp_us: u64,
    pub pixel: u8,
}

impl DriverFrame for MockFrame {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    fn fill(&self, width: u32, height: u32, stride: usize, dst: &mut [u8]) -> Result<()> {
        if dst.len() < stride * height as usize {
            return Err(CaptureError::Driver(format!(
                "destination too small: {} bytes for {} rows of {}",
                dst.len(),
                height,
                stride
            )));
        }
        let row_bytes = width as usize * self.kind.pixel_format().bytes_per_pixel();
        if row_bytes > stride {
            return Err(CaptureError::Driver(format!("stride {} shorter than a row of {} bytes", stride, row_bytes)));
        }
        for row in dst.chunks_mut(stride).take(height as usize) {
            row[..row_bytes].fill(self.pixel);
        }
        Ok(())
    }
}

#[derive(Default)]
struct MockState {
    calls: Vec<DeviceCall>,
    running: StreamMask,
    output_modes: [Option<OutputMode>; 3],
    callbacks: [Option<(FrameCallback, String)>; 3],
}

/// Simulated depth camera.
pub struct MockDevice {
    info: DeviceInfo,
    streams: StreamMask,
    registration_supported: bool,
    hw_sync_supported: bool,
    unsupported_modes: Vec<(StreamKind, OutputMode)>,
    state: Mutex<MockState>,
}

impl MockDevice {
    /// A device with every stream and toggle available.
    pub fn new(connection: &str) -> Arc<MockDevice> {
        Self::builder(connection).build()
    }

    pub fn builder(connection: &str) -> MockDeviceBuilder {
        MockDeviceBuilder {
            connection: connection.to_string(),
            streams: StreamMask::all(),
            registration_supported: true,
            hw_sync_supported: true,
            unsupported_modes: Vec::new(),
        }
    }

    /// Drain the recorded hardware calls.
    pub fn take_calls(&self) -> Vec<DeviceCall> {
        std::mem::take(&mut self.state.lock().calls)
    }

    pub fn running(&self) -> StreamMask {
        self.state.lock().running
    }

    /// Deliver a frame for `kind` through the registered callback, on the
    /// calling thread. Frames for streams that are not running are dropped,
    /// as a real driver would; the return value says whether it was delivered.
    pub fn emit(&self, kind: StreamKind, timestamp_us: u64, pixel: u8) -> bool {
        let (callback, cookie, mode) = {
            let state = self.state.lock();
            if !state.running.has(kind) {
                return false;
            }
            let Some((callback, cookie)) = state.callbacks[kind.index()].clone() else {
                return false;
            };
            (callback, cookie, state.output_modes[kind.index()])
        };

        let (width, height) = mode.map(|m| (m.width, m.height)).unwrap_or((0, 0));
        let frame = MockFrame {
            kind,
            width,
            height,
            timestamp_us,
            pixel,
        };
        callback(&frame, &cookie);
        true
    }

    fn record(&self, call: DeviceCall) {
        self.state.lock().calls.push(call);
    }
}

impl SensorDevice for MockDevice {
    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn has_stream(&self, kind: StreamKind) -> bool {
        self.streams.has(kind)
    }

    fn is_mode_supported(&self, kind: StreamKind, mode: OutputMode) -> bool {
        !self.unsupported_modes.contains(&(kind, mode))
    }

    fn set_output_mode(&self, kind: StreamKind, mode: OutputMode) -> Result<()> {
        let mut state = self.state.lock();
        state.output_modes[kind.index()] = Some(mode);
        state.calls.push(DeviceCall::SetOutputMode(kind, mode));
        Ok(())
    }

    fn output_mode(&self, kind: StreamKind) -> Option<OutputMode> {
        self.state.lock().output_modes[kind.index()]
    }

    fn register_callback(&self, kind: StreamKind, callback: FrameCallback, cookie: String) -> Result<()> {
        let mut state = self.state.lock();
        state.callbacks[kind.index()] = Some((callback, cookie));
        state.calls.push(DeviceCall::RegisterCallback(kind));
        Ok(())
    }

    fn start_stream(&self, kind: StreamKind) -> Result<()> {
        let mut state = self.state.lock();
        state.running |= kind.mask();
        state.calls.push(DeviceCall::StartStream(kind));
        Ok(())
    }

    fn stop_stream(&self, kind: StreamKind) -> Result<()> {
        let mut state = self.state.lock();
        state.running.remove(kind.mask());
        state.calls.push(DeviceCall::StopStream(kind));
        Ok(())
    }

    fn supports_registration(&self) -> bool {
        self.registration_supported
    }

    fn set_registration(&self, enabled: bool) -> Result<()> {
        self.record(DeviceCall::SetRegistration(enabled));
        Ok(())
    }

    fn supports_hw_sync(&self) -> bool {
        self.hw_sync_supported
    }

    fn set_hw_sync(&self, enabled: bool) -> Result<()> {
        self.record(DeviceCall::SetHwSync(enabled));
        Ok(())
    }

    fn focal_length(&self, output_width: u32) -> f32 {
        525.0 * output_width as f32 / 640.0
    }

    fn baseline(&self) -> f32 {
        7.5
    }
}

/// Builder for devices that lack streams, toggles or modes.
pub struct MockDeviceBuilder {
    connection: String,
    streams: StreamMask,
    registration_supported: bool,
    hw_sync_supported: bool,
    unsupported_modes: Vec<(StreamKind, OutputMode)>,
}

impl MockDeviceBuilder {
    pub fn without_stream(mut self, kind: StreamKind) -> Self {
        self.streams.remove(kind.mask());
        self
    }

    pub fn registration_supported(mut self, supported: bool) -> Self {
        self.registration_supported = supported;
        self
    }

    pub fn hw_sync_supported(mut self, supported: bool) -> Self {
        self.hw_sync_supported = supported;
        self
    }

    pub fn unsupported_mode(mut self, kind: StreamKind, mode: OutputMode) -> Self {
        self.unsupported_modes.push((kind, mode));
        self
    }

    pub fn build(self) -> Arc<MockDevice> {
        Arc::new(MockDevice {
            info: DeviceInfo {
                index: 0,
                serial_number: format!("MOCK-{}", self.connection),
                vendor_name: "Mock".to_string(),
                vendor_id: 0x1d27,
                product_name: "Mock Depth Sensor".to_string(),
                connection: self.connection,
                bus: 1,
                address: 0,
            },
            streams: self.streams,
            registration_supported: self.registration_supported,
            hw_sync_supported: self.hw_sync_supported,
            unsupported_modes: self.unsupported_modes,
            state: Mutex::new(MockState::default()),
        })
    }
}

/// Driver over a fixed list of mock devices.
pub struct MockDriver {
    devices: Vec<Arc<MockDevice>>,
}

impl MockDriver {
    pub fn new(devices: Vec<Arc<MockDevice>>) -> Self {
        Self { devices }
    }
}

impl SensorDriver for MockDriver {
    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn device(&self, index: usize) -> Result<Arc<dyn SensorDevice>> {
        match self.devices.get(index) {
            Some(device) => Ok(device.clone()),
            None => Err(CaptureError::Driver(format!("no mock device at index {}", index))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_respects_stride_padding() {
        let frame = MockFrame {
            kind: StreamKind::Depth,
            width: 2,
            height: 2,
            timestamp_us: 0,
            pixel: 0xab,
        };
        // 2 px of Gray16 per row plus 2 bytes of padding.
        let mut dst = vec![0u8; 12];
        frame.fill(2, 2, 6, &mut dst).unwrap();
        assert_eq!(dst, vec![0xab, 0xab, 0xab, 0xab, 0, 0, 0xab, 0xab, 0xab, 0xab, 0, 0]);
    }

    #[test]
    fn test_emit_requires_running_stream() {
        let device = MockDevice::new("dev");
        let hits = Arc::new(Mutex::new(Vec::new()));
        let sink = hits.clone();
        let callback: FrameCallback = Arc::new(move |frame: &dyn DriverFrame, cookie: &str| {
            sink.lock().push((frame.timestamp_us(), cookie.to_string()));
        });
        device
            .register_callback(StreamKind::Depth, callback, "dev".to_string())
            .unwrap();

        assert!(!device.emit(StreamKind::Depth, 1, 0));
        device.start_stream(StreamKind::Depth).unwrap();
        assert!(device.emit(StreamKind::Depth, 2, 0));
        assert_eq!(*hits.lock(), vec![(2, "dev".to_string())]);
    }
}

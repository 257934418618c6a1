use crate::buffers::FrameBufferStore;
use crate::controller::{check_streams, StreamController};
use crate::driver::{DeviceRegistry, SensorDevice};
use crate::producer::FrameProducer;
use crate::readiness::ReadinessTracker;
use crate::synchronizer::{FrameSet, StreamSynchronizer, SyncTolerance};
use crate::types::{DeviceInfo, Frame, FrameRate, Intrinsics, OutputMode, Resolution, StreamKind, StreamMask};
use crate::{CaptureError, Result};
use std::sync::Arc;

/// Settings fixed for the lifetime of a [`DeviceSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub device_index: usize,
    pub color_resolution: Resolution,
    pub depth_resolution: Resolution,
    pub color_fps: FrameRate,
    pub depth_fps: FrameRate,
    /// Reject frame pairs whose timestamps are further apart than the
    /// session's tolerance window.
    pub cross_check: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            color_resolution: Resolution::Vga,
            depth_resolution: Resolution::Vga,
            color_fps: FrameRate::Fps30,
            depth_fps: FrameRate::Fps30,
            cross_check: true,
        }
    }
}

impl SessionConfig {
    /// Defaults overlaid with `RGBD_*` environment variables.
    ///
    /// - `RGBD_DEVICE_INDEX`
    /// - `RGBD_COLOR_RESOLUTION`, `RGBD_DEPTH_RESOLUTION` (`qqvga|qvga|vga|sxga`)
    /// - `RGBD_COLOR_FPS`, `RGBD_DEPTH_FPS` (`15|30|60`)
    /// - `RGBD_CROSS_CHECK` (`1|true|yes|on` or `0|false|no|off`)
    ///
    /// Unparseable values keep the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            device_index: get("RGBD_DEVICE_INDEX")
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(defaults.device_index),
            color_resolution: get("RGBD_COLOR_RESOLUTION")
                .and_then(|v| Resolution::from_name(&v))
                .unwrap_or(defaults.color_resolution),
            depth_resolution: get("RGBD_DEPTH_RESOLUTION")
                .and_then(|v| Resolution::from_name(&v))
                .unwrap_or(defaults.depth_resolution),
            color_fps: get("RGBD_COLOR_FPS")
                .and_then(|v| v.trim().parse::<u32>().ok())
                .and_then(FrameRate::from_hz)
                .unwrap_or(defaults.color_fps),
            depth_fps: get("RGBD_DEPTH_FPS")
                .and_then(|v| v.trim().parse::<u32>().ok())
                .and_then(FrameRate::from_hz)
                .unwrap_or(defaults.depth_fps),
            cross_check: get("RGBD_CROSS_CHECK")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.cross_check),
        }
    }

    pub fn color_mode(&self) -> OutputMode {
        OutputMode::new(self.color_resolution, self.color_fps)
    }

    /// Output mode shared by the depth and infrared streams.
    pub fn depth_mode(&self) -> OutputMode {
        OutputMode::new(self.depth_resolution, self.depth_fps)
    }

    /// Tolerance window derived from the slower of the two configured rates.
    pub fn tolerance(&self) -> SyncTolerance {
        SyncTolerance::from_fps(self.color_fps.hz().min(self.depth_fps.hz()))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Which streams to capture, and the hardware toggles to capture them with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub streams: StreamMask,
    /// Register depth to the color viewpoint on the device.
    pub registration: bool,
    /// Ask the device to synchronize depth and image capture in hardware.
    pub hw_sync: bool,
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self {
            streams: StreamMask::DEPTH_COLOR,
            registration: true,
            hw_sync: false,
        }
    }
}

impl CaptureRequest {
    pub fn new(streams: StreamMask) -> Self {
        Self {
            streams,
            ..Self::default()
        }
    }

    /// Fails with [`CaptureError::ExclusiveStreams`] for a request that names
    /// both color and infrared.
    pub fn validate(&self) -> Result<()> {
        check_streams(self.streams)
    }
}

/// Result of one [`DeviceSession::capture`].
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub frames: FrameSet,
    pub intrinsics: Intrinsics,
}

impl Capture {
    pub fn depth(&self) -> Option<&Frame> {
        self.frames.depth.as_ref()
    }

    pub fn color(&self) -> Option<&Frame> {
        self.frames.color.as_ref()
    }

    pub fn infrared(&self) -> Option<&Frame> {
        self.frames.infrared.as_ref()
    }
}

/// Wakes a consumer blocked in [`DeviceSession::capture`] from another thread.
#[derive(Clone)]
pub struct SessionCloser {
    tracker: Arc<ReadinessTracker>,
}

impl SessionCloser {
    /// Close the session's readiness state. A blocked capture returns
    /// [`CaptureError::SessionClosed`], as does every later one.
    pub fn close(&self) {
        self.tracker.close();
    }
}

/// One configured depth camera with its buffers, readiness state and
/// stream controller.
///
/// Producers (the driver's callback threads) write into the session's
/// buffers; exactly one consumer calls [`capture`](Self::capture).
pub struct DeviceSession {
    info: DeviceInfo,
    device: Arc<dyn SensorDevice>,
    config: SessionConfig,
    tracker: Arc<ReadinessTracker>,
    controller: StreamController,
    synchronizer: StreamSynchronizer,
    closed: bool,
}

impl DeviceSession {
    /// Open the device at `config.device_index` and prepare its streams.
    ///
    /// Every stream the device has gets a buffer, an output mode and a frame
    /// callback. A mode the device rejects for a stream it has is an error;
    /// a stream it lacks is skipped. No stream is started until the first
    /// capture.
    pub fn open(registry: &DeviceRegistry, config: SessionConfig) -> Result<DeviceSession> {
        let device = registry.device(config.device_index)?;
        let mut info = device.info();
        info.index = config.device_index;
        let connection = info.connection.clone();

        log::info!(
            "Opening device {} on bus {} @ {} with serial number {} ({} : {})",
            config.device_index,
            info.bus,
            info.address,
            info.serial_number,
            info.vendor_name,
            info.product_name
        );

        let plan = [
            (StreamKind::Color, config.color_mode()),
            (StreamKind::Infrared, config.depth_mode()),
            (StreamKind::Depth, config.depth_mode()),
        ];

        let mut store = FrameBufferStore::new();
        let mut enabled = Vec::with_capacity(plan.len());
        for (kind, mode) in plan {
            if !device.has_stream(kind) {
                log::info!("Device has no {} stream", kind);
                continue;
            }
            if !device.is_mode_supported(kind, mode) {
                return Err(CaptureError::UnsupportedMode {
                    kind,
                    width: mode.width,
                    height: mode.height,
                    fps: mode.fps,
                });
            }
            store.allocate(kind, &connection, mode.width, mode.height);
            enabled.push((kind, mode));
        }

        let buffers = Arc::new(store);
        let tracker = Arc::new(ReadinessTracker::new());
        for (kind, mode) in enabled {
            device.set_output_mode(kind, mode)?;
            let producer = FrameProducer::new(kind, buffers.clone(), tracker.clone());
            device.register_callback(kind, producer.into_callback(), connection.clone())?;
        }

        let synchronizer = StreamSynchronizer::new(connection, tracker.clone(), buffers, config.tolerance())
            .with_cross_check(config.cross_check);
        log::info!(
            "Sync tolerance {:.2} ms (cross check {})",
            synchronizer.tolerance().millis(),
            if synchronizer.cross_check() { "on" } else { "off" }
        );
        let controller = StreamController::new(device.clone(), tracker.clone());

        Ok(DeviceSession {
            info,
            device,
            config,
            tracker,
            controller,
            synchronizer,
            closed: false,
        })
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn tolerance(&self) -> SyncTolerance {
        self.synchronizer.tolerance()
    }

    /// Streams currently running on the hardware.
    pub fn running(&self) -> StreamMask {
        self.controller.running()
    }

    /// Focal lengths at the configured output widths, and the baseline.
    pub fn intrinsics(&self) -> Intrinsics {
        let color_width = self
            .device
            .output_mode(StreamKind::Color)
            .map_or(self.config.color_resolution.width(), |m| m.width);
        let depth_width = self
            .device
            .output_mode(StreamKind::Depth)
            .map_or(self.config.depth_resolution.width(), |m| m.width);

        Intrinsics {
            focal_length_color: self.device.focal_length(color_width),
            focal_length_depth: self.device.focal_length(depth_width),
            baseline: self.device.baseline(),
        }
    }

    /// Capture one time-aligned set of the requested streams.
    ///
    /// Reconfigures the hardware first when the request differs from the
    /// running configuration, then blocks until the requested streams are
    /// jointly fresh.
    pub fn capture(&mut self, request: &CaptureRequest) -> Result<Capture> {
        if self.closed || self.tracker.is_closed() {
            return Err(CaptureError::SessionClosed);
        }
        request.validate()?;
        if self
            .controller
            .needs_configure(request.streams, request.registration, request.hw_sync)
        {
            self.controller
                .configure(request.streams, request.registration, request.hw_sync)?;
        }

        let frames = self.synchronizer.acquire(request.streams)?;
        Ok(Capture {
            frames,
            intrinsics: self.intrinsics(),
        })
    }

    pub fn closer(&self) -> SessionCloser {
        SessionCloser {
            tracker: self.tracker.clone(),
        }
    }

    /// Stop all streams and close the readiness state.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.tracker.close();
        self.controller.stop_all()?;
        log::info!("Closed device {}", self.info.connection);
        Ok(())
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("Failed to stop streams on {}: {}", self.info.connection, e);
        }
    }
}

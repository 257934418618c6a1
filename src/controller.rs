use crate::driver::SensorDevice;
use crate::readiness::ReadinessTracker;
use crate::types::{StreamKind, StreamMask};
use crate::{CaptureError, Result};
use std::sync::Arc;

/// Drives stream start/stop and the registration/sync toggles of one device.
///
/// Depth may run alongside either color or infrared, but color and infrared
/// come from the same physical sensor and are never running together.
pub struct StreamController {
    device: Arc<dyn SensorDevice>,
    tracker: Arc<ReadinessTracker>,
    running: StreamMask,
    streams: StreamMask,
    registration: bool,
    hw_sync: bool,
    configured: bool,
}

impl StreamController {
    pub fn new(device: Arc<dyn SensorDevice>, tracker: Arc<ReadinessTracker>) -> Self {
        Self {
            device,
            tracker,
            running: StreamMask::empty(),
            streams: StreamMask::empty(),
            registration: true,
            hw_sync: false,
            configured: false,
        }
    }

    /// Streams currently running on the hardware.
    pub fn running(&self) -> StreamMask {
        self.running
    }

    /// Streams named by the last successful `configure`.
    pub fn streams(&self) -> StreamMask {
        self.streams
    }

    pub fn registration(&self) -> bool {
        self.registration
    }

    pub fn hw_sync(&self) -> bool {
        self.hw_sync
    }

    /// Whether `configure` with these arguments would change anything.
    pub fn needs_configure(&self, streams: StreamMask, registration: bool, hw_sync: bool) -> bool {
        !self.configured
            || self.streams != streams
            || self.registration != registration
            || self.hw_sync != hw_sync
    }

    /// Bring the hardware in line with the requested streams and toggles.
    ///
    /// Toggles the device does not support are skipped, as are streams the
    /// device does not have. Readiness is cleared afterwards so no frame
    /// produced under the previous configuration can satisfy a later request.
    pub fn configure(&mut self, streams: StreamMask, registration: bool, hw_sync: bool) -> Result<()> {
        check_streams(streams)?;

        let first = !self.configured;
        if first || registration != self.registration {
            if self.device.supports_registration() {
                log::info!("Setting depth registration {}", on_off(registration));
                self.device.set_registration(registration)?;
            } else {
                log::debug!("Depth registration not supported, ignoring");
            }
        }
        if first || hw_sync != self.hw_sync {
            if self.device.supports_hw_sync() {
                log::info!("Setting hardware sync {}", on_off(hw_sync));
                self.device.set_hw_sync(hw_sync)?;
            } else {
                log::debug!("Hardware sync not supported, ignoring");
            }
        }

        if streams.has(StreamKind::Depth) {
            self.start(StreamKind::Depth)?;
        } else {
            self.stop(StreamKind::Depth)?;
        }
        if streams.has(StreamKind::Infrared) {
            self.stop(StreamKind::Color)?;
            self.start(StreamKind::Infrared)?;
        }
        if streams.has(StreamKind::Color) {
            self.stop(StreamKind::Infrared)?;
            self.start(StreamKind::Color)?;
        }

        self.streams = streams;
        self.registration = registration;
        self.hw_sync = hw_sync;
        self.configured = true;
        self.tracker.reset();

        log::info!(
            "Streams configured: requested={:?} running={:?} registration={} sync={}",
            streams,
            self.running,
            on_off(registration),
            on_off(hw_sync)
        );
        Ok(())
    }

    /// Stop every running stream.
    pub fn stop_all(&mut self) -> Result<()> {
        for kind in self.running.kinds() {
            self.stop(kind)?;
        }
        self.configured = false;
        self.tracker.reset();
        Ok(())
    }

    fn start(&mut self, kind: StreamKind) -> Result<()> {
        if self.running.has(kind) {
            return Ok(());
        }
        if !self.device.has_stream(kind) {
            log::debug!("Device has no {} stream, skipping start", kind);
            return Ok(());
        }
        self.device.start_stream(kind)?;
        self.running |= kind.mask();
        log::info!("Started {} stream", kind);
        Ok(())
    }

    fn stop(&mut self, kind: StreamKind) -> Result<()> {
        if !self.running.has(kind) {
            return Ok(());
        }
        self.device.stop_stream(kind)?;
        self.running.remove(kind.mask());
        log::info!("Stopped {} stream", kind);
        Ok(())
    }
}

/// Reject stream combinations the hardware can never run together.
pub fn check_streams(streams: StreamMask) -> Result<()> {
    if streams.contains(StreamMask::COLOR | StreamMask::INFRARED) {
        return Err(CaptureError::ExclusiveStreams);
    }
    Ok(())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

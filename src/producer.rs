use crate::buffers::FrameBufferStore;
use crate::driver::{DriverFrame, FrameCallback};
use crate::readiness::ReadinessTracker;
use crate::types::StreamKind;
use std::sync::Arc;

/// Frame-arrival handler for one stream kind.
///
/// Runs on whatever thread the driver delivers frames on. It decodes the
/// frame into the buffer registered for the originating device, then marks
/// the kind ready with the frame's timestamp converted to milliseconds.
pub struct FrameProducer {
    kind: StreamKind,
    buffers: Arc<FrameBufferStore>,
    tracker: Arc<ReadinessTracker>,
}

impl FrameProducer {
    pub fn new(kind: StreamKind, buffers: Arc<FrameBufferStore>, tracker: Arc<ReadinessTracker>) -> Self {
        Self {
            kind,
            buffers,
            tracker,
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Handle one frame from the device identified by `device`.
    ///
    /// The buffer lock is released before readiness is published, so a
    /// producer never holds both locks.
    pub fn on_frame(&self, frame: &dyn DriverFrame, device: &str) {
        let timestamp_ms = frame.timestamp_us() as f64 * 1.0e-3;
        let written = self.buffers.write(self.kind, device, timestamp_ms, |image| {
            frame.fill(image.width, image.height, image.stride, &mut image.data)
        });
        match written {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                log::warn!("Failed to decode {} frame from {}: {}", self.kind, device, e);
                return;
            }
            None => {
                log::warn!("Dropping {} frame from unknown device {}", self.kind, device);
                return;
            }
        }

        log::trace!("{} frame from {} at {:.3} ms", self.kind, device, timestamp_ms);
        self.tracker.mark_ready(self.kind, timestamp_ms);
    }

    /// Wrap this producer as a driver callback.
    pub fn into_callback(self) -> FrameCallback {
        Arc::new(move |frame: &dyn DriverFrame, device: &str| self.on_frame(frame, device))
    }
}

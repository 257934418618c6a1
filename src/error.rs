use crate::types::StreamKind;

/// Errors that can occur while configuring or capturing from a depth camera.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Device index {index} out of range: {count} device(s) found")]
    DeviceIndexOutOfRange { index: usize, count: usize },

    #[error("{kind} stream mode {width} x {height} @ {fps} not supported")]
    UnsupportedMode {
        kind: StreamKind,
        width: u32,
        height: u32,
        fps: u32,
    },

    #[error("Color and infrared share one sensor and cannot be captured together")]
    ExclusiveStreams,

    #[error("Sensor driver error: {0}")]
    Driver(String),

    #[error("Device session closed")]
    SessionClosed,

    #[error("Capture stream stopped")]
    StreamStopped,

    #[error("Timeout waiting for data")]
    Timeout,

    #[error("Failed to spawn capture thread: {0}")]
    ThreadSpawn(String),
}

//! # rgbd_capture - time-aligned capture from multi-sensor depth cameras
//!
//! A depth camera delivers color, depth and infrared frames on independent
//! driver callback threads, each at its own rate. This crate turns those
//! streams into single snapshots whose frames were taken close enough
//! together in time to be used as a set:
//! - Device enumeration through an explicitly owned [`DeviceRegistry`]
//! - Stream start/stop, registration and hardware-sync control
//! - Blocking, timestamp-validated acquisition of any stream combination
//! - A background [`CaptureStream`] with channel delivery and timeouts
//!
//! The sensor driver itself is abstracted behind the traits in [`driver`].
//! The `mock` feature adds an in-memory implementation in `mock`.
//!
//! ## Quick Start
//! ```no_run
//! # #[cfg(feature = "mock")]
//! # {
//! use rgbd_capture::mock::{MockDevice, MockDriver};
//! use rgbd_capture::{CaptureRequest, DeviceRegistry, DeviceSession, SessionConfig, StreamMask};
//! use std::sync::Arc;
//!
//! let registry = DeviceRegistry::new(Arc::new(MockDriver::new(vec![MockDevice::new("mock-0")])));
//! let mut session = DeviceSession::open(&registry, SessionConfig::from_env()).unwrap();
//!
//! let capture = session.capture(&CaptureRequest::new(StreamMask::DEPTH_COLOR)).unwrap();
//! if let Some(depth) = capture.depth() {
//!     println!("depth {}x{} @ {:.1} ms", depth.image.width, depth.image.height, depth.timestamp_ms);
//! }
//! # }
//! ```

pub mod error;
pub mod types;
pub mod driver;
pub mod buffers;
pub mod readiness;
pub mod synchronizer;
pub mod controller;
pub mod producer;
pub mod session;
pub mod latch;
pub mod stream;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::CaptureError;
pub use types::*;
pub use driver::{DeviceRegistry, DriverFrame, SensorDevice, SensorDriver};
pub use synchronizer::{FrameSet, StreamSynchronizer, SyncTolerance};
pub use session::{Capture, CaptureRequest, DeviceSession, SessionCloser, SessionConfig};
pub use latch::LatchedCapture;
pub use stream::CaptureStream;

/// Result type alias for capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;

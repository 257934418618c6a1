use crate::types::{Frame, Image, StreamKind};
use crate::Result;
use parking_lot::Mutex;
use std::collections::HashMap;

/// An image buffer and the timestamp of the frame it currently holds.
///
/// `timestamp_ms` is `None` until a frame has been decoded successfully, and
/// again after a decode failure left the image partially written.
struct Slot {
    image: Image,
    timestamp_ms: Option<f64>,
}

/// Per-device set of buffers, one slot per stream kind.
#[derive(Default)]
struct DeviceBuffers {
    slots: [Option<Mutex<Slot>>; 3],
}

/// Holds one image buffer per (stream kind, device) pair.
///
/// The set of buffers is fixed once the session is constructed; afterwards
/// producers overwrite buffers in place and the consumer copies them out.
/// Image and timestamp share one lock, so a copy always carries the
/// timestamp of the pixels it holds.
#[derive(Default)]
pub struct FrameBufferStore {
    devices: HashMap<String, DeviceBuffers>,
}

impl FrameBufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate (or replace) a zeroed buffer for `kind` on `device`.
    pub fn allocate(&mut self, kind: StreamKind, device: &str, width: u32, height: u32) {
        let entry = self.devices.entry(device.to_string()).or_default();
        entry.slots[kind.index()] = Some(Mutex::new(Slot {
            image: Image::zeroed(kind, width, height),
            timestamp_ms: None,
        }));
    }

    pub fn contains(&self, kind: StreamKind, device: &str) -> bool {
        self.slot(kind, device).is_some()
    }

    /// Overwrite the buffer for `kind` on `device` in place with the frame
    /// taken at `timestamp_ms`.
    ///
    /// Returns `None` when no buffer was allocated for that pair. When `fill`
    /// fails the buffer holds no valid frame until the next successful write.
    pub fn write<F>(&self, kind: StreamKind, device: &str, timestamp_ms: f64, fill: F) -> Option<Result<()>>
    where
        F: FnOnce(&mut Image) -> Result<()>,
    {
        let slot = self.slot(kind, device)?;
        let mut slot = slot.lock();
        let result = fill(&mut slot.image);
        slot.timestamp_ms = result.as_ref().ok().map(|_| timestamp_ms);
        Some(result)
    }

    /// Copy of the frame currently held for `kind` on `device`.
    ///
    /// `None` when no buffer was allocated or it holds no valid frame.
    pub fn snapshot(&self, kind: StreamKind, device: &str) -> Option<Frame> {
        let slot = self.slot(kind, device)?.lock();
        let timestamp_ms = slot.timestamp_ms?;
        Some(Frame {
            image: slot.image.clone(),
            timestamp_ms,
        })
    }

    fn slot(&self, kind: StreamKind, device: &str) -> Option<&Mutex<Slot>> {
        self.devices.get(device)?.slots[kind.index()].as_ref()
    }
}

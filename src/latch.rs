use crate::session::Capture;
use crate::synchronizer::FrameSet;

/// Keeps the last frame of each stream across captures.
///
/// A capture that did not include a stream, or delivered an empty image for
/// it, leaves that stream's previous frame in place instead of clearing it.
#[derive(Debug, Clone, Default)]
pub struct LatchedCapture {
    latest: Option<Capture>,
}

impl LatchedCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `capture` into the latched view and return it.
    pub fn update(&mut self, capture: Capture) -> &Capture {
        let Capture { frames, intrinsics } = capture;
        let latched = self.latest.get_or_insert_with(|| Capture {
            frames: FrameSet::default(),
            intrinsics,
        });

        latched.intrinsics = intrinsics;
        let FrameSet { color, depth, infrared } = frames;
        for frame in [color, depth, infrared].into_iter().flatten() {
            if !frame.image.is_empty() {
                latched.frames.insert(frame);
            }
        }
        latched
    }

    pub fn latest(&self) -> Option<&Capture> {
        self.latest.as_ref()
    }

    pub fn clear(&mut self) {
        self.latest = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Frame, Image, Intrinsics, StreamKind, StreamMask};

    fn frame(kind: StreamKind, timestamp_ms: f64) -> Frame {
        Frame {
            image: Image::zeroed(kind, 1, 1),
            timestamp_ms,
        }
    }

    fn capture(frames: Vec<Frame>) -> Capture {
        let mut set = FrameSet::default();
        for f in frames {
            set.insert(f);
        }
        Capture {
            frames: set,
            intrinsics: Intrinsics {
                focal_length_color: 525.0,
                focal_length_depth: 525.0,
                baseline: 7.5,
            },
        }
    }

    #[test]
    fn test_missing_stream_keeps_previous_frame() {
        let mut latch = LatchedCapture::new();
        latch.update(capture(vec![frame(StreamKind::Depth, 1.0), frame(StreamKind::Color, 1.0)]));

        let merged = latch.update(capture(vec![frame(StreamKind::Depth, 2.0)]));
        assert_eq!(merged.frames.mask(), StreamMask::DEPTH_COLOR);
        assert_eq!(merged.depth().unwrap().timestamp_ms, 2.0);
        assert_eq!(merged.color().unwrap().timestamp_ms, 1.0);
    }

    #[test]
    fn test_empty_image_keeps_previous_frame() {
        let mut latch = LatchedCapture::new();
        latch.update(capture(vec![frame(StreamKind::Depth, 1.0)]));

        let empty = Frame {
            image: Image::zeroed(StreamKind::Depth, 0, 0),
            timestamp_ms: 2.0,
        };
        let merged = latch.update(capture(vec![empty]));
        assert_eq!(merged.depth().unwrap().timestamp_ms, 1.0);
    }

    #[test]
    fn test_clear() {
        let mut latch = LatchedCapture::new();
        latch.update(capture(vec![frame(StreamKind::Infrared, 1.0)]));
        assert!(latch.latest().is_some());

        latch.clear();
        assert!(latch.latest().is_none());
        let merged = latch.update(capture(vec![frame(StreamKind::Depth, 3.0)]));
        assert_eq!(merged.frames.mask(), StreamMask::DEPTH);
    }
}

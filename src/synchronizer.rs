use crate::buffers::FrameBufferStore;
use crate::readiness::{ReadinessTracker, TimestampTable};
use crate::types::{Frame, StreamKind, StreamMask};
use crate::Result;
use std::sync::Arc;

/// Maximum timestamp skew, in milliseconds, for two frames to be returned
/// together.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncTolerance {
    millis: f64,
}

impl SyncTolerance {
    pub const fn from_millis(millis: f64) -> Self {
        Self { millis }
    }

    /// Half a frame period at `fps`, plus 0.2 ms of slack.
    pub fn from_fps(fps: u32) -> Self {
        Self::from_millis(500.0 / fps.max(1) as f64 + 0.2)
    }

    pub fn millis(&self) -> f64 {
        self.millis
    }

    pub fn accepts(&self, a_ms: f64, b_ms: f64) -> bool {
        (a_ms - b_ms).abs() <= self.millis
    }

    /// Pick the stream that is too old to pair with depth, if any.
    ///
    /// Depth is checked against infrared, then color. Of an out-of-window
    /// pair the older frame is reported; the newer one is never discarded.
    pub fn stale_kind(&self, requested: StreamMask, timestamps: &TimestampTable) -> Option<StreamKind> {
        if !requested.has(StreamKind::Depth) {
            return None;
        }
        let depth = timestamps.get(StreamKind::Depth)?;

        for other in [StreamKind::Infrared, StreamKind::Color] {
            if !requested.has(other) {
                continue;
            }
            let Some(stamp) = timestamps.get(other) else {
                continue;
            };
            if depth - stamp > self.millis {
                return Some(other);
            }
            if stamp - depth > self.millis {
                return Some(StreamKind::Depth);
            }
        }
        None
    }
}

/// The frames returned by one acquisition, one slot per stream kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSet {
    pub color: Option<Frame>,
    pub depth: Option<Frame>,
    pub infrared: Option<Frame>,
}

impl FrameSet {
    pub fn get(&self, kind: StreamKind) -> Option<&Frame> {
        match kind {
            StreamKind::Color => self.color.as_ref(),
            StreamKind::Depth => self.depth.as_ref(),
            StreamKind::Infrared => self.infrared.as_ref(),
        }
    }

    pub fn insert(&mut self, frame: Frame) {
        let slot = match frame.image.kind {
            StreamKind::Color => &mut self.color,
            StreamKind::Depth => &mut self.depth,
            StreamKind::Infrared => &mut self.infrared,
        };
        *slot = Some(frame);
    }

    /// Kinds that have a frame in this set.
    pub fn mask(&self) -> StreamMask {
        StreamKind::ALL
            .into_iter()
            .filter(|k| self.get(*k).is_some())
            .fold(StreamMask::empty(), |mask, k| mask | k.mask())
    }
}

/// Blocking acquisition of time-aligned frames for one device.
pub struct StreamSynchronizer {
    device: String,
    tracker: Arc<ReadinessTracker>,
    buffers: Arc<FrameBufferStore>,
    tolerance: SyncTolerance,
    cross_check: bool,
}

impl StreamSynchronizer {
    pub fn new(
        device: impl Into<String>,
        tracker: Arc<ReadinessTracker>,
        buffers: Arc<FrameBufferStore>,
        tolerance: SyncTolerance,
    ) -> Self {
        Self {
            device: device.into(),
            tracker,
            buffers,
            tolerance,
            cross_check: true,
        }
    }

    /// Enable or disable the cross-stream timestamp check.
    pub fn with_cross_check(mut self, enabled: bool) -> Self {
        self.cross_check = enabled;
        self
    }

    pub fn tolerance(&self) -> SyncTolerance {
        self.tolerance
    }

    pub fn cross_check(&self) -> bool {
        self.cross_check
    }

    /// Wait until every stream in `requested` has a fresh frame within
    /// tolerance of the others, then return copies of those frames.
    ///
    /// Blocks without a deadline. When the check finds a pair too far apart
    /// the older frame's readiness is cleared and the wait resumes. A buffer
    /// overwritten after the check is not returned under the checked
    /// timestamp: the wait resumes until its producer publishes the new one.
    /// On success the readiness mask is cleared for the next call.
    pub fn acquire(&self, requested: StreamMask) -> Result<FrameSet> {
        let mut guard = self.tracker.lock();

        loop {
            guard.wait_for(requested)?;
            let timestamps = guard.timestamps();
            if self.cross_check {
                if let Some(stale) = self.tolerance.stale_kind(requested, &timestamps) {
                    log::debug!(
                        "{} frame outside {:.1} ms window (depth={:?} color={:?} ir={:?}), waiting for a newer one",
                        stale,
                        self.tolerance.millis(),
                        timestamps.get(StreamKind::Depth),
                        timestamps.get(StreamKind::Color),
                        timestamps.get(StreamKind::Infrared),
                    );
                    guard.invalidate(stale);
                    continue;
                }
            }

            let mut frames = FrameSet::default();
            for kind in requested.kinds() {
                if let Some(frame) = self.buffers.snapshot(kind, &self.device) {
                    frames.insert(frame);
                }
            }

            let settled = requested
                .kinds()
                .all(|kind| frames.get(kind).map(|f| f.timestamp_ms) == timestamps.get(kind));
            if !settled {
                log::trace!("Buffer overwritten during copy, waiting for its timestamp");
                guard.wait_update()?;
                continue;
            }

            guard.reset();
            return Ok(frames);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CaptureError;
    use std::time::Duration;

    const DEVICE: &str = "dev";

    fn setup(tolerance_ms: f64) -> (Arc<ReadinessTracker>, Arc<FrameBufferStore>, StreamSynchronizer) {
        let tracker = Arc::new(ReadinessTracker::new());
        let mut store = FrameBufferStore::new();
        for kind in StreamKind::ALL {
            store.allocate(kind, DEVICE, 2, 2);
        }
        let buffers = Arc::new(store);
        let sync = StreamSynchronizer::new(
            DEVICE,
            tracker.clone(),
            buffers.clone(),
            SyncTolerance::from_millis(tolerance_ms),
        );
        (tracker, buffers, sync)
    }

    fn produce(tracker: &ReadinessTracker, buffers: &FrameBufferStore, kind: StreamKind, ts: f64, value: u8) {
        buffers
            .write(kind, DEVICE, ts, |image| {
                image.data.fill(value);
                Ok(())
            })
            .unwrap()
            .unwrap();
        tracker.mark_ready(kind, ts);
    }

    #[test]
    fn test_tolerance_from_fps() {
        assert!((SyncTolerance::from_fps(30).millis() - 16.866_666).abs() < 1e-3);
        assert!((SyncTolerance::from_fps(15).millis() - 33.533_333).abs() < 1e-3);
        assert!(SyncTolerance::from_millis(40.0).accepts(100.0, 140.0));
        assert!(!SyncTolerance::from_millis(40.0).accepts(100.0, 140.5));
    }

    #[test]
    fn test_stale_kind_picks_older_frame() {
        let tolerance = SyncTolerance::from_millis(40.0);
        assert_eq!(tolerance.stale_kind(StreamMask::DEPTH_COLOR, &TimestampTable::default()), None);

        // Depth 100 ms, color 160 ms: depth is the older one.
        let tracker = ReadinessTracker::new();
        tracker.mark_ready(StreamKind::Depth, 100.0);
        tracker.mark_ready(StreamKind::Color, 160.0);
        let table = tracker.lock().timestamps();
        assert_eq!(tolerance.stale_kind(StreamMask::DEPTH_COLOR, &table), Some(StreamKind::Depth));

        tracker.mark_ready(StreamKind::Depth, 250.0);
        let table = tracker.lock().timestamps();
        assert_eq!(tolerance.stale_kind(StreamMask::DEPTH_COLOR, &table), Some(StreamKind::Color));

        tracker.mark_ready(StreamKind::Color, 240.0);
        let table = tracker.lock().timestamps();
        assert_eq!(tolerance.stale_kind(StreamMask::DEPTH_COLOR, &table), None);

        // Infrared is compared with depth before color.
        tracker.mark_ready(StreamKind::Infrared, 100.0);
        let table = tracker.lock().timestamps();
        assert_eq!(tolerance.stale_kind(StreamMask::DEPTH_INFRARED, &table), Some(StreamKind::Infrared));
        assert_eq!(tolerance.stale_kind(StreamMask::DEPTH_COLOR, &table), None);

        // Without depth in the request nothing is compared.
        assert_eq!(tolerance.stale_kind(StreamMask::COLOR, &table), None);
    }

    #[test]
    fn test_acquire_copies_requested_and_resets() {
        let (tracker, buffers, sync) = setup(40.0);
        produce(&tracker, &buffers, StreamKind::Depth, 10.0, 1);
        produce(&tracker, &buffers, StreamKind::Color, 12.0, 2);
        produce(&tracker, &buffers, StreamKind::Infrared, 11.0, 3);

        let frames = sync.acquire(StreamMask::DEPTH_COLOR).unwrap();
        assert_eq!(frames.mask(), StreamMask::DEPTH_COLOR);
        assert_eq!(frames.depth.as_ref().unwrap().timestamp_ms, 10.0);
        assert_eq!(frames.color.as_ref().unwrap().image.data[0], 2);
        assert!(frames.infrared.is_none());
        assert!(tracker.ready().is_empty());
    }

    #[test]
    fn test_acquire_returns_latest_overwrite() {
        let (tracker, buffers, sync) = setup(40.0);
        produce(&tracker, &buffers, StreamKind::Infrared, 1.0, 7);
        produce(&tracker, &buffers, StreamKind::Infrared, 2.0, 8);

        let frames = sync.acquire(StreamMask::INFRARED).unwrap();
        let ir = frames.infrared.unwrap();
        assert_eq!(ir.timestamp_ms, 2.0);
        assert!(ir.image.data.iter().all(|b| *b == 8));
    }

    #[test]
    fn test_acquire_rewaits_for_fresh_depth() {
        let (tracker, buffers, sync) = setup(40.0);
        produce(&tracker, &buffers, StreamKind::Depth, 100.0, 1);
        produce(&tracker, &buffers, StreamKind::Color, 160.0, 2);

        let (tx, rx) = crossbeam_channel::bounded(1);
        let consumer = std::thread::spawn(move || {
            tx.send(sync.acquire(StreamMask::DEPTH_COLOR)).unwrap();
        });

        // Skew of 60 ms: the consumer must keep waiting.
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(tracker.ready(), StreamMask::COLOR);

        produce(&tracker, &buffers, StreamKind::Depth, 165.0, 9);
        let frames = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        consumer.join().unwrap();

        let depth = frames.depth.unwrap();
        let color = frames.color.unwrap();
        assert_eq!(depth.timestamp_ms, 165.0);
        assert_eq!(depth.image.data[0], 9);
        assert_eq!(color.timestamp_ms, 160.0);
    }

    #[test]
    fn test_cross_check_disabled_accepts_any_skew() {
        let (tracker, buffers, sync) = setup(40.0);
        assert!(sync.cross_check());
        let sync = sync.with_cross_check(false);
        assert!(!sync.cross_check());
        produce(&tracker, &buffers, StreamKind::Depth, 0.0, 1);
        produce(&tracker, &buffers, StreamKind::Infrared, 500.0, 2);

        let frames = sync.acquire(StreamMask::DEPTH_INFRARED).unwrap();
        assert_eq!(frames.mask(), StreamMask::DEPTH_INFRARED);
    }

    #[test]
    fn test_second_acquire_blocks_without_new_frames() {
        let (tracker, buffers, sync) = setup(40.0);
        produce(&tracker, &buffers, StreamKind::Depth, 1.0, 1);
        sync.acquire(StreamMask::DEPTH).unwrap();

        let (tx, rx) = crossbeam_channel::bounded(1);
        let consumer = std::thread::spawn(move || {
            tx.send(sync.acquire(StreamMask::DEPTH)).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        tracker.close();
        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(result, Err(CaptureError::SessionClosed)));
        consumer.join().unwrap();
    }

    #[test]
    fn test_acquire_rewaits_for_fresh_infrared() {
        let (tracker, buffers, sync) = setup(40.0);
        produce(&tracker, &buffers, StreamKind::Depth, 200.0, 1);
        produce(&tracker, &buffers, StreamKind::Infrared, 100.0, 2);

        let (tx, rx) = crossbeam_channel::bounded(1);
        let consumer = std::thread::spawn(move || {
            tx.send(sync.acquire(StreamMask::DEPTH_INFRARED)).unwrap();
        });

        // Infrared is 100 ms behind depth: it is dropped and depth kept.
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(tracker.ready(), StreamMask::DEPTH);

        produce(&tracker, &buffers, StreamKind::Infrared, 210.0, 3);
        let frames = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        consumer.join().unwrap();

        assert_eq!(frames.depth.unwrap().timestamp_ms, 200.0);
        let ir = frames.infrared.unwrap();
        assert_eq!(ir.timestamp_ms, 210.0);
        assert_eq!(ir.image.data[0], 3);
    }

    #[test]
    fn test_acquire_rewaits_for_depth_behind_infrared() {
        let (tracker, buffers, sync) = setup(40.0);
        produce(&tracker, &buffers, StreamKind::Depth, 100.0, 1);
        produce(&tracker, &buffers, StreamKind::Infrared, 200.0, 2);

        let (tx, rx) = crossbeam_channel::bounded(1);
        let consumer = std::thread::spawn(move || {
            tx.send(sync.acquire(StreamMask::DEPTH_INFRARED)).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(tracker.ready(), StreamMask::INFRARED);

        produce(&tracker, &buffers, StreamKind::Depth, 205.0, 4);
        let frames = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        consumer.join().unwrap();

        let depth = frames.depth.unwrap();
        assert_eq!(depth.timestamp_ms, 205.0);
        assert_eq!(depth.image.data[0], 4);
        assert_eq!(frames.infrared.unwrap().timestamp_ms, 200.0);
    }

    #[test]
    fn test_image_matches_timestamp_under_concurrent_producers() {
        use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

        let (tracker, buffers, sync) = setup(1.0e12);
        let counter = Arc::new(AtomicU64::new(1));
        let stop = Arc::new(AtomicBool::new(false));

        let producers: Vec<_> = [StreamKind::Depth, StreamKind::Color]
            .into_iter()
            .map(|kind| {
                let (tracker, buffers) = (tracker.clone(), buffers.clone());
                let (counter, stop) = (counter.clone(), stop.clone());
                std::thread::spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        let i = counter.fetch_add(1, Ordering::Relaxed);
                        produce(&tracker, &buffers, kind, i as f64, (i % 256) as u8);
                    }
                })
            })
            .collect();

        for _ in 0..500 {
            let frames = sync.acquire(StreamMask::DEPTH_COLOR).unwrap();
            for kind in [StreamKind::Depth, StreamKind::Color] {
                let frame = frames.get(kind).unwrap();
                assert_eq!(
                    frame.image.data[0] as u64,
                    frame.timestamp_ms as u64 % 256,
                    "{} image does not belong to its timestamp {}",
                    kind,
                    frame.timestamp_ms
                );
            }
        }

        stop.store(true, Ordering::Relaxed);
        for p in producers {
            p.join().unwrap();
        }
    }
}

use crate::session::{Capture, CaptureRequest, DeviceSession, SessionCloser};
use crate::{CaptureError, Result};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Handle to a background capture loop.
///
/// A dedicated thread owns the session and calls
/// [`DeviceSession::capture`] back to back, delivering each result through a
/// bounded channel. This gives callers the deadlines `capture` itself does
/// not have.
pub struct CaptureStream {
    receiver: Receiver<Capture>,
    stop_flag: Arc<AtomicBool>,
    closer: SessionCloser,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl CaptureStream {
    /// Start capturing `request` with a small delivery queue.
    pub fn start(session: DeviceSession, request: CaptureRequest) -> Result<CaptureStream> {
        Self::with_capacity(session, request, 4)
    }

    /// Start capturing with a queue of `capacity` captures. When the queue is
    /// full, new captures are dropped.
    ///
    /// An invalid request is rejected here, before the session is handed to
    /// the capture thread; the session is closed on that path.
    pub fn with_capacity(session: DeviceSession, request: CaptureRequest, capacity: usize) -> Result<CaptureStream> {
        request.validate()?;
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();
        let closer = session.closer();

        let thread = std::thread::Builder::new()
            .name("rgbd-capture".into())
            .spawn(move || {
                capture_loop(session, request, sender, stop_clone);
            })
            .map_err(|e| CaptureError::ThreadSpawn(e.to_string()))?;

        Ok(CaptureStream {
            receiver,
            stop_flag,
            closer,
            thread: Some(thread),
        })
    }

    /// Receive the next capture (blocks until available).
    pub fn recv(&self) -> Result<Capture> {
        self.receiver.recv().map_err(|_| CaptureError::StreamStopped)
    }

    /// Try to receive a capture without blocking.
    pub fn try_recv(&self) -> Option<Capture> {
        self.receiver.try_recv().ok()
    }

    /// Receive a capture with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Capture> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => CaptureError::Timeout,
            crossbeam_channel::RecvTimeoutError::Disconnected => CaptureError::StreamStopped,
        })
    }

    /// Check if the capture loop is still running.
    pub fn is_active(&self) -> bool {
        !self.stop_flag.load(Ordering::Relaxed)
    }

    /// Stop the loop, close the session and wait for the thread to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        // Wakes the loop if it is blocked waiting for frames.
        self.closer.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn capture_loop(
    mut session: DeviceSession,
    request: CaptureRequest,
    sender: Sender<Capture>,
    stop_flag: Arc<AtomicBool>,
) {
    log::info!("Capture loop started for {:?}", request.streams);

    loop {
        if stop_flag.load(Ordering::Relaxed) {
            log::info!("Capture loop stopping (stop flag set)");
            break;
        }

        let capture = match session.capture(&request) {
            Ok(capture) => capture,
            Err(CaptureError::SessionClosed) => {
                log::info!("Capture loop stopping (session closed)");
                break;
            }
            Err(e) => {
                log::warn!("Capture failed: {}", e);
                break;
            }
        };

        if let Err(e) = sender.try_send(capture) {
            match e {
                crossbeam_channel::TrySendError::Full(_) => {
                    log::trace!("Capture channel full, dropping capture");
                }
                crossbeam_channel::TrySendError::Disconnected(_) => {
                    log::info!("Capture channel disconnected, stopping loop");
                    break;
                }
            }
        }
    }

    stop_flag.store(true, Ordering::Relaxed);
    if let Err(e) = session.close() {
        log::warn!("Failed to close session: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DeviceRegistry;
    use crate::mock::{MockDevice, MockDriver};
    use crate::session::SessionConfig;
    use crate::types::{StreamKind, StreamMask};

    fn open(device: &Arc<MockDevice>) -> DeviceSession {
        let registry = DeviceRegistry::new(Arc::new(MockDriver::new(vec![device.clone()])));
        DeviceSession::open(&registry, SessionConfig::default()).unwrap()
    }

    #[test]
    fn test_stream_delivers_and_times_out() {
        let device = MockDevice::new("dev");
        let stream = CaptureStream::start(open(&device), CaptureRequest::new(StreamMask::DEPTH)).unwrap();

        // Frames emitted before the loop finishes configuring are discarded,
        // so keep producing until one makes it through.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let capture = loop {
            device.emit(StreamKind::Depth, 1_000, 5);
            if let Ok(capture) = stream.recv_timeout(Duration::from_millis(20)) {
                break capture;
            }
            assert!(std::time::Instant::now() < deadline, "no capture delivered");
        };
        assert_eq!(capture.depth().unwrap().timestamp_ms, 1.0);
        assert!(capture.color().is_none());

        while stream.try_recv().is_some() {}
        assert!(matches!(
            stream.recv_timeout(Duration::from_millis(50)),
            Err(CaptureError::Timeout)
        ));
        assert!(stream.is_active());

        stream.stop();
        assert!(device.running().is_empty());
    }

    #[test]
    fn test_exclusive_request_rejected_at_start() {
        let device = MockDevice::new("dev");
        let request = CaptureRequest::new(StreamMask::COLOR | StreamMask::INFRARED);

        let err = CaptureStream::start(open(&device), request).err();
        assert!(matches!(err, Some(CaptureError::ExclusiveStreams)));
        assert!(device.running().is_empty());
    }

    #[test]
    fn test_closed_session_ends_stream() {
        let device = MockDevice::new("dev");
        let stream = CaptureStream::start(open(&device), CaptureRequest::new(StreamMask::DEPTH)).unwrap();

        stream.closer.close();
        assert!(matches!(stream.recv(), Err(CaptureError::StreamStopped)));
        assert!(!stream.is_active());
        assert!(device.running().is_empty());
    }
}

use crate::types::{StreamKind, StreamMask};
use crate::{CaptureError, Result};
use parking_lot::{Condvar, Mutex, MutexGuard};

/// Latest timestamp (milliseconds, sensor clock) per stream kind.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimestampTable {
    slots: [Option<f64>; 3],
}

impl TimestampTable {
    pub fn get(&self, kind: StreamKind) -> Option<f64> {
        self.slots[kind.index()]
    }

    fn set(&mut self, kind: StreamKind, timestamp_ms: f64) {
        self.slots[kind.index()] = Some(timestamp_ms);
    }
}

#[derive(Debug, Default)]
struct ReadinessState {
    ready: StreamMask,
    timestamps: TimestampTable,
    closed: bool,
}

/// Hand-off point between frame producers and the capturing consumer.
///
/// Producers flip their stream's bit in the readiness mask and record the
/// frame timestamp; the consumer waits until a requested combination of bits
/// is set. At most one pending frame per kind is tracked: a second
/// `mark_ready` before the consumer drains simply overwrites the first.
#[derive(Debug, Default)]
pub struct ReadinessTracker {
    state: Mutex<ReadinessState>,
    ready_cond: Condvar,
}

impl ReadinessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fresh frame for `kind` and wake the waiting consumer.
    pub fn mark_ready(&self, kind: StreamKind, timestamp_ms: f64) {
        {
            let mut state = self.state.lock();
            if state.ready.has(kind) {
                log::trace!("{} frame replaced before it was read", kind);
            }
            state.ready |= kind.mask();
            state.timestamps.set(kind, timestamp_ms);
        }
        self.ready_cond.notify_one();
    }

    /// Clear only `kind`'s bit, forcing the consumer to wait for a newer frame.
    pub fn invalidate(&self, kind: StreamKind) {
        self.lock().invalidate(kind);
    }

    /// Clear the whole readiness mask.
    pub fn reset(&self) {
        self.lock().reset();
    }

    pub fn ready(&self) -> StreamMask {
        self.state.lock().ready
    }

    pub fn timestamp(&self, kind: StreamKind) -> Option<f64> {
        self.state.lock().timestamps.get(kind)
    }

    /// Shut the tracker down and wake every waiter.
    ///
    /// Waiters return [`CaptureError::SessionClosed`]; later waits fail
    /// immediately.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.ready_cond.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Take the lock for a multi-step wait/validate/clear sequence.
    pub fn lock(&self) -> ReadinessGuard<'_> {
        ReadinessGuard {
            cond: &self.ready_cond,
            state: self.state.lock(),
        }
    }
}

/// Exclusive access to the readiness state.
pub struct ReadinessGuard<'a> {
    cond: &'a Condvar,
    state: MutexGuard<'a, ReadinessState>,
}

impl ReadinessGuard<'_> {
    /// Block until every kind in `requested` is ready.
    ///
    /// The lock is released while waiting. There is no deadline; the only
    /// way out without data is the tracker being closed.
    pub fn wait_for(&mut self, requested: StreamMask) -> Result<()> {
        loop {
            if self.state.closed {
                return Err(CaptureError::SessionClosed);
            }
            if self.state.ready.contains(requested) {
                return Ok(());
            }
            self.cond.wait(&mut self.state);
        }
    }

    /// Release the lock until the next `mark_ready` or `close`.
    ///
    /// Used when a buffer was overwritten after its readiness was checked:
    /// the producer that wrote it is about to publish the new timestamp.
    pub fn wait_update(&mut self) -> Result<()> {
        if self.state.closed {
            return Err(CaptureError::SessionClosed);
        }
        self.cond.wait(&mut self.state);
        if self.state.closed {
            return Err(CaptureError::SessionClosed);
        }
        Ok(())
    }

    pub fn ready(&self) -> StreamMask {
        self.state.ready
    }

    pub fn timestamps(&self) -> TimestampTable {
        self.state.timestamps
    }

    pub fn invalidate(&mut self, kind: StreamKind) {
        self.state.ready.remove(kind.mask());
    }

    pub fn reset(&mut self) {
        self.state.ready = StreamMask::empty();
    }
}

//! Cross-thread consumer state
//!
//! The reading thread owns the cursor; everything another thread may touch
//! (close, metrics, fault) lives here. Counters are single-writer atomics so
//! the read path never takes a lock for them. The held buffer is guarded by
//! a lock that is only taken on buffer transitions and close, which is what
//! makes every (buffer, consumer) release happen exactly once.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::buffer::BroadcastBuffer;
use crate::stats::ConsumerStats;
use crate::stream::{BroadcastError, BroadcastStream};

/// Where a consumer currently is in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPosition {
    /// Sequence number of the current buffer
    pub sequence: u64,
    /// Populated slots in the current buffer (end marker included)
    pub valid_len: usize,
    /// Next slot to read in the current buffer
    pub cursor: usize,
}

#[derive(Debug)]
struct Lifecycle {
    /// Buffer this consumer holds a count on (None once closed)
    held: Option<Arc<BroadcastBuffer>>,
    finished_at: Option<Instant>,
    error: Option<Arc<BroadcastError>>,
    thread_id: Option<ThreadId>,
}

#[derive(Debug)]
pub(crate) struct ConsumerShared {
    label: String,
    stream: BroadcastStream,
    started_at: Instant,
    open: AtomicBool,
    bytes_read: AtomicU64,
    waits: AtomicU64,
    cursor: AtomicUsize,
    lifecycle: Mutex<Lifecycle>,
}

impl ConsumerShared {
    pub(crate) fn new(label: String, stream: BroadcastStream, start: Arc<BroadcastBuffer>) -> Self {
        Self {
            label,
            stream,
            started_at: Instant::now(),
            open: AtomicBool::new(true),
            bytes_read: AtomicU64::new(0),
            waits: AtomicU64::new(0),
            cursor: AtomicUsize::new(0),
            lifecycle: Mutex::new(Lifecycle {
                held: Some(start),
                finished_at: None,
                error: None,
                thread_id: None,
            }),
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn stream(&self) -> &BroadcastStream {
        &self.stream
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        self.stream.config().poll_interval
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub(crate) fn record_read(&self, bytes: u64, cursor: usize) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
        self.cursor.store(cursor, Ordering::Relaxed);
    }

    pub(crate) fn record_wait(&self) {
        self.waits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the calling thread as the reader, unless one is already set
    pub(crate) fn bind_current_thread(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.thread_id.is_none() {
            lifecycle.thread_id = Some(thread::current().id());
        }
    }

    pub(crate) fn set_thread_id(&self, id: ThreadId) {
        self.lifecycle.lock().thread_id = Some(id);
    }

    /// Release `from` and move the hold to its published successor
    ///
    /// Returns `Ok(None)` if the consumer was closed concurrently; in that
    /// case close already released the chain and nothing is touched here.
    pub(crate) fn advance(
        &self,
        from: &Arc<BroadcastBuffer>,
    ) -> Result<Option<Arc<BroadcastBuffer>>, BroadcastError> {
        let mut lifecycle = self.lifecycle.lock();
        let Some(held) = lifecycle.held.as_ref() else {
            return Ok(None);
        };
        debug_assert!(Arc::ptr_eq(held, from));

        let next = self.stream.release_hold(held, &self.label)?;
        lifecycle.held = Some(Arc::clone(&next));
        self.cursor.store(0, Ordering::Relaxed);
        Ok(Some(next))
    }

    /// Record a fault and close
    pub(crate) fn fail(&self, err: Arc<BroadcastError>) {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.error.is_none() {
                lifecycle.error = Some(Arc::clone(&err));
            }
        }
        if self.stream.config().debug {
            tracing::debug!(consumer = %self.label, error = %err, "Closing from fault");
        }
        self.close();
    }

    /// Close the consumer; returns false if it was already closed
    pub(crate) fn close(&self) -> bool {
        let (held, error) = {
            let mut lifecycle = self.lifecycle.lock();
            let Some(held) = lifecycle.held.take() else {
                return false;
            };
            lifecycle.finished_at = Some(Instant::now());
            self.open.store(false, Ordering::Release);
            (held, lifecycle.error.clone())
        };

        if self.stream.config().debug {
            match error {
                Some(e) => tracing::debug!(consumer = %self.label, error = %e, "Consumer closed"),
                None => tracing::debug!(consumer = %self.label, "Consumer closed"),
            }
        }

        self.stream.deregister_consumer(&self.label, &held);
        true
    }

    pub(crate) fn position(&self) -> Option<BufferPosition> {
        let lifecycle = self.lifecycle.lock();
        lifecycle.held.as_ref().map(|buffer| BufferPosition {
            sequence: buffer.sequence(),
            valid_len: buffer.valid_len(),
            cursor: self.cursor.load(Ordering::Relaxed),
        })
    }

    pub(crate) fn error(&self) -> Option<Arc<BroadcastError>> {
        self.lifecycle.lock().error.clone()
    }

    pub(crate) fn thread_id(&self) -> Option<ThreadId> {
        self.lifecycle.lock().thread_id
    }

    pub(crate) fn snapshot(&self) -> ConsumerStats {
        let lifecycle = self.lifecycle.lock();
        let waits = self.waits.load(Ordering::Relaxed);

        ConsumerStats {
            label: self.label.clone(),
            open: lifecycle.held.is_some(),
            thread_id: lifecycle.thread_id,
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            waits,
            total_wait: self
                .poll_interval()
                .saturating_mul(u32::try_from(waits).unwrap_or(u32::MAX)),
            elapsed: lifecycle
                .finished_at
                .map(|at| at.duration_since(self.started_at)),
            error: lifecycle.error.clone(),
        }
    }
}

/// Cloneable handle for closing and inspecting a consumer from any thread
#[derive(Debug, Clone)]
pub struct ConsumerHandle {
    shared: Arc<ConsumerShared>,
}

impl ConsumerHandle {
    pub(crate) fn new(shared: Arc<ConsumerShared>) -> Self {
        Self { shared }
    }

    /// Consumer label
    pub fn label(&self) -> &str {
        self.shared.label()
    }

    /// Close the consumer
    ///
    /// Idempotent; returns true only for the call that actually closed it.
    /// A reader blocked waiting for data notices within one poll interval.
    pub fn close(&self) -> bool {
        self.shared.close()
    }

    /// Whether the consumer can still read
    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// Whether a non-I/O fault closed the consumer
    pub fn had_error(&self) -> bool {
        self.shared.error().is_some()
    }

    /// The fault that closed the consumer, if any
    pub fn error(&self) -> Option<Arc<BroadcastError>> {
        self.shared.error()
    }

    /// Thread performing the reads (None before the first read)
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.shared.thread_id()
    }

    /// Current buffer and cursor (None once closed)
    pub fn position(&self) -> Option<BufferPosition> {
        self.shared.position()
    }

    /// Snapshot of the consumer's counters
    pub fn stats(&self) -> ConsumerStats {
        self.shared.snapshot()
    }

    /// Indexed report line
    pub fn report(&self, index: usize) -> String {
        self.shared.snapshot().report(index)
    }
}

impl std::fmt::Display for ConsumerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.shared.snapshot(), f)
    }
}

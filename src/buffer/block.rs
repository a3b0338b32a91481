//! A single fixed-capacity block of the broadcast stream
//!
//! Buffers are built completely by the producer and only then linked into
//! the chain, so the contents are immutable by the time any consumer can
//! reach them. The only mutable parts are the outstanding-reader count and
//! the `next` link, which is set exactly once.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;

use crate::stream::BroadcastError;

/// Marks a buffer whose count has dropped to zero and been reclaimed.
const RECLAIMED: usize = usize::MAX;

/// How the stream ends, stored in the slot right after the last data byte
#[derive(Debug, Clone)]
pub enum StreamEnd {
    /// Normal end of stream
    Eof,
    /// The source failed with an I/O error
    Io {
        /// Kind of the source error
        kind: io::ErrorKind,
        /// Rendered message of the source error
        message: String,
    },
    /// The producer failed with a non-I/O fault, shared by every consumer
    Fault(Arc<BroadcastError>),
}

impl StreamEnd {
    /// Build the end marker for a producer-side error
    pub fn from_error(err: BroadcastError) -> Self {
        match err {
            BroadcastError::Io(e) => StreamEnd::Io {
                kind: e.kind(),
                message: e.to_string(),
            },
            other => StreamEnd::Fault(Arc::new(other)),
        }
    }

    /// Whether this is a normal end of stream
    pub fn is_eof(&self) -> bool {
        matches!(self, StreamEnd::Eof)
    }
}

/// One block of the broadcast chain
pub struct BroadcastBuffer {
    /// Position of this buffer in the chain (0 = head)
    sequence: u64,
    /// Maximum number of slots, including the end marker
    capacity: usize,
    /// Data bytes (never more than `capacity`)
    data: Bytes,
    /// End marker occupying the slot after `data`, if this is the last buffer
    end: Option<StreamEnd>,
    /// Consumers that have not finished with this buffer
    outstanding: AtomicUsize,
    /// Following buffer, published once by the producer
    next: OnceLock<Arc<BroadcastBuffer>>,
}

impl BroadcastBuffer {
    pub(crate) fn new(
        sequence: u64,
        capacity: usize,
        data: Bytes,
        end: Option<StreamEnd>,
        outstanding: usize,
    ) -> Self {
        debug_assert!(data.len() + usize::from(end.is_some()) <= capacity);
        Self {
            sequence,
            capacity,
            data,
            end,
            outstanding: AtomicUsize::new(outstanding),
            next: OnceLock::new(),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of populated slots, counting the end marker
    pub fn valid_len(&self) -> usize {
        self.data.len() + usize::from(self.end.is_some())
    }

    /// Data bytes only
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn end(&self) -> Option<&StreamEnd> {
        self.end.as_ref()
    }

    /// The published successor, if any
    ///
    /// Acquire semantics: a reader that sees the successor also sees its
    /// contents.
    pub fn next(&self) -> Option<&Arc<BroadcastBuffer>> {
        self.next.get()
    }

    /// Link `next` after this buffer. Returns false if already linked.
    pub(crate) fn link(&self, next: Arc<BroadcastBuffer>) -> bool {
        self.next.set(next).is_ok()
    }

    /// Current outstanding-reader count (0 once reclaimed)
    pub fn outstanding(&self) -> usize {
        match self.outstanding.load(Ordering::Acquire) {
            RECLAIMED => 0,
            n => n,
        }
    }

    pub fn is_reclaimed(&self) -> bool {
        self.outstanding.load(Ordering::Acquire) == RECLAIMED
    }

    /// Add one reader. Fails once the buffer has been reclaimed.
    pub(crate) fn try_retain(&self) -> bool {
        self.outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| match n {
                RECLAIMED => None,
                n => Some(n + 1),
            })
            .is_ok()
    }

    /// Drop one reader.
    ///
    /// Returns `Ok(n)` with the remaining count, or `Err(())` if the count
    /// was already zero (or reclaimed) and would underflow.
    pub(crate) fn release(&self) -> Result<usize, ()> {
        self.outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| match n {
                0 | RECLAIMED => None,
                n => Some(n - 1),
            })
            .map(|prev| prev - 1)
            .map_err(|_| ())
    }

    /// Move a zero count to the reclaimed state.
    ///
    /// Only one caller ever gets `true`, even if several threads saw the
    /// count reach zero.
    pub(crate) fn try_reclaim(&self) -> bool {
        self.outstanding
            .compare_exchange(0, RECLAIMED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl fmt::Debug for BroadcastBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastBuffer")
            .field("sequence", &self.sequence)
            .field("capacity", &self.capacity)
            .field("len", &self.data.len())
            .field("end", &self.end)
            .field("outstanding", &self.outstanding.load(Ordering::Relaxed))
            .field("next", &self.next().map(|b| b.sequence))
            .finish()
    }
}

impl Drop for BroadcastBuffer {
    fn drop(&mut self) {
        // Unlink iteratively; a long chain would otherwise recurse once per buffer.
        let mut next = self.next.take();
        while let Some(buffer) = next {
            next = match Arc::try_unwrap(buffer) {
                Ok(mut inner) => inner.next.take(),
                Err(_) => None,
            };
        }
    }
}

//! Append-only chain of broadcast buffers
//!
//! The producer appends at the tail; consumers walk forward through the
//! `next` links on their own. Appending and consumer attach/detach share one
//! lock so that every buffer's initial outstanding count matches the set of
//! consumers that will actually reach it. Releases on the read path are
//! lock-free.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use super::block::{BroadcastBuffer, StreamEnd};
use crate::stream::BroadcastError;

/// State guarded by the chain lock
#[derive(Debug)]
struct ChainState {
    /// Newest published buffer
    tail: Arc<BroadcastBuffer>,
    /// Sequence number for the next appended buffer
    next_sequence: u64,
    /// Open consumers; becomes the initial count of each new buffer
    readers: usize,
    /// Data bytes published so far
    bytes_published: u64,
    /// An end marker has been appended
    finished: bool,
}

/// The shared buffer chain of one broadcast stream
#[derive(Debug)]
pub struct BufferChain {
    state: Mutex<ChainState>,
    /// Buffers whose count reached zero and were reclaimed
    reclaimed: AtomicU64,
    capacity: usize,
}

impl BufferChain {
    /// Create a chain holding a single empty head buffer
    pub fn new(capacity: usize) -> Self {
        let head = Arc::new(BroadcastBuffer::new(0, capacity, Bytes::new(), None, 0));

        Self {
            state: Mutex::new(ChainState {
                tail: head,
                next_sequence: 1,
                readers: 0,
                bytes_published: 0,
                finished: false,
            }),
            reclaimed: AtomicU64::new(0),
            capacity,
        }
    }

    /// Capacity of every buffer in the chain
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Publish a new buffer after the current tail
    ///
    /// The buffer is fully built before it is linked, so any consumer that
    /// observes the link also observes the data and end marker.
    pub fn append(
        &self,
        data: Bytes,
        end: Option<StreamEnd>,
    ) -> Result<Arc<BroadcastBuffer>, BroadcastError> {
        let mut state = self.state.lock();
        if state.finished {
            return Err(BroadcastError::WriterFinished);
        }
        if data.len() + usize::from(end.is_some()) > self.capacity {
            return Err(BroadcastError::BufferOverflow {
                len: data.len(),
                capacity: self.capacity,
            });
        }

        let finishes = end.is_some();
        let len = data.len() as u64;
        let buffer = Arc::new(BroadcastBuffer::new(
            state.next_sequence,
            self.capacity,
            data,
            end,
            state.readers,
        ));

        let linked = state.tail.link(Arc::clone(&buffer));
        debug_assert!(linked, "tail buffer already had a successor");

        // A tail nobody is holding can never be reached again once it has a
        // successor, since new consumers only attach at the tail.
        let previous = std::mem::replace(&mut state.tail, Arc::clone(&buffer));
        if previous.outstanding() == 0 {
            self.reclaim(&previous);
        }

        state.next_sequence += 1;
        state.bytes_published += len;
        state.finished = finishes;

        Ok(buffer)
    }

    /// Attach a new consumer at the tail
    pub fn attach(&self) -> Result<Arc<BroadcastBuffer>, BroadcastError> {
        let mut state = self.state.lock();

        if state.tail.try_retain() {
            state.readers += 1;
            return Ok(Arc::clone(&state.tail));
        }
        if state.finished {
            return Err(BroadcastError::StreamFinished);
        }

        // Tail already reclaimed: start the consumer on a fresh empty buffer.
        state.readers += 1;
        let anchor = Arc::new(BroadcastBuffer::new(
            state.next_sequence,
            self.capacity,
            Bytes::new(),
            None,
            state.readers,
        ));
        state.tail.link(Arc::clone(&anchor));
        state.tail = Arc::clone(&anchor);
        state.next_sequence += 1;

        Ok(anchor)
    }

    /// Detach a consumer currently holding `held`
    ///
    /// Every buffer published after `held` counted this consumer when it was
    /// appended, so the whole remainder of the chain is released. Returns the
    /// first release error, after releasing everything else.
    pub fn detach(
        &self,
        held: &Arc<BroadcastBuffer>,
        label: &str,
    ) -> Result<(), BroadcastError> {
        let mut state = self.state.lock();
        state.readers = state.readers.saturating_sub(1);

        let mut first_err = None;
        let mut cursor = Some(held);
        while let Some(buffer) = cursor {
            if let Err(e) = self.release(buffer, label) {
                first_err.get_or_insert(e);
            }
            cursor = buffer.next();
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Drop one consumer's hold on `buffer`
    ///
    /// Returns `Ok(true)` if this call reclaimed the buffer.
    pub fn release(&self, buffer: &BroadcastBuffer, label: &str) -> Result<bool, BroadcastError> {
        match buffer.release() {
            Ok(0) => Ok(self.reclaim(buffer)),
            Ok(_) => Ok(false),
            Err(()) => Err(BroadcastError::RefcountUnderflow {
                buffer: buffer.sequence(),
                consumer: label.to_string(),
            }),
        }
    }

    fn reclaim(&self, buffer: &BroadcastBuffer) -> bool {
        if !buffer.try_reclaim() {
            return false;
        }
        self.reclaimed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(buffer = buffer.sequence(), "Buffer reclaimed");
        true
    }

    /// Data bytes readable from `buffer` at `cursor` without waiting
    pub fn available(buffer: &BroadcastBuffer, cursor: usize) -> usize {
        let mut total = buffer.data().len().saturating_sub(cursor);
        let mut next = buffer.next();
        while let Some(b) = next {
            total += b.data().len();
            next = b.next();
        }
        total
    }

    /// Newest published buffer
    pub fn tail(&self) -> Arc<BroadcastBuffer> {
        Arc::clone(&self.state.lock().tail)
    }

    /// Consumers currently attached
    pub fn readers(&self) -> usize {
        self.state.lock().readers
    }

    /// Buffers appended after the head (anchors included)
    pub fn appended(&self) -> u64 {
        self.state.lock().next_sequence - 1
    }

    pub fn reclaimed(&self) -> u64 {
        self.reclaimed.load(Ordering::Relaxed)
    }

    pub fn bytes_published(&self) -> u64 {
        self.state.lock().bytes_published
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().finished
    }
}

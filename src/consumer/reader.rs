//! Sequential reader over the broadcast chain
//!
//! Each consumer walks the chain with its own cursor. When it runs out of
//! published data it sleeps for the poll interval and retries, so a
//! consumer that is ahead of the producer blocks its own thread and nobody
//! else's.

use std::io::{self, Read};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crate::buffer::{BroadcastBuffer, StreamEnd};
use crate::stats::ConsumerStats;
use crate::stream::{BroadcastError, BroadcastStream};

use super::handle::{BufferPosition, ConsumerHandle, ConsumerShared};

/// One independent reader of a broadcast stream
///
/// Reads need `&mut self` and so happen on one thread at a time; use
/// [`handle`](Self::handle) to close or inspect the consumer from elsewhere.
/// Dropping the consumer closes it.
#[derive(Debug)]
pub struct BroadcastConsumer {
    shared: Arc<ConsumerShared>,
    current: Arc<BroadcastBuffer>,
    cursor: usize,
    thread_bound: bool,
}

impl BroadcastConsumer {
    pub(crate) fn new(label: String, stream: BroadcastStream, start: Arc<BroadcastBuffer>) -> Self {
        Self {
            shared: Arc::new(ConsumerShared::new(label, stream, Arc::clone(&start))),
            current: start,
            cursor: 0,
            thread_bound: false,
        }
    }

    /// Read the next byte
    ///
    /// Returns `Ok(Some(byte))`, or `Ok(None)` once the stream has ended or
    /// the consumer is closed. Blocks, polling, while the producer has not
    /// published more data. An I/O failure of the source is returned as an
    /// error (once); any other fault closes the consumer, is recorded on it,
    /// and reads as a normal end of stream.
    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        if !self.thread_bound {
            self.shared.bind_current_thread();
            self.thread_bound = true;
        }

        while self.shared.is_open() {
            let data = self.current.data();
            if self.cursor < data.len() {
                let byte = data[self.cursor];
                self.cursor += 1;
                self.shared.record_read(1, self.cursor);
                return Ok(Some(byte));
            }

            if let Some(end) = self.current.end().cloned() {
                self.cursor = self.current.valid_len();
                return self.end_of_stream(end);
            }

            if self.current.next().is_some() {
                match self.shared.advance(&self.current) {
                    Ok(Some(next)) => {
                        self.current = next;
                        self.cursor = 0;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        self.shared.fail(Arc::new(e));
                        return Ok(None);
                    }
                }
            } else {
                thread::sleep(self.shared.poll_interval());
                self.shared.record_wait();
            }
        }

        Ok(None)
    }

    fn end_of_stream(&mut self, end: StreamEnd) -> io::Result<Option<u8>> {
        match end {
            StreamEnd::Eof => {
                self.shared.close();
                Ok(None)
            }
            StreamEnd::Fault(err) => {
                self.shared.fail(err);
                Ok(None)
            }
            StreamEnd::Io { kind, message } => {
                if self.shared.stream().config().debug {
                    tracing::debug!(consumer = %self.label(), error = %message, "Closing from I/O error");
                }
                self.shared.close();
                Err(io::Error::new(kind, message))
            }
        }
    }

    /// Consumer label
    pub fn label(&self) -> &str {
        self.shared.label()
    }

    /// Data bytes readable right now without waiting
    pub fn available(&self) -> usize {
        self.shared.stream().available(&self.current, self.cursor)
    }

    /// Close the consumer; see [`ConsumerHandle::close`]
    pub fn close(&self) -> bool {
        self.shared.close()
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    pub fn had_error(&self) -> bool {
        self.shared.error().is_some()
    }

    pub fn error(&self) -> Option<Arc<BroadcastError>> {
        self.shared.error()
    }

    pub fn thread_id(&self) -> Option<ThreadId> {
        self.shared.thread_id()
    }

    /// Force the recorded reader thread
    ///
    /// Normally set by the first read.
    pub fn set_thread_id(&mut self, id: ThreadId) {
        self.shared.set_thread_id(id);
        self.thread_bound = true;
    }

    /// Current buffer and cursor (None once closed)
    pub fn position(&self) -> Option<BufferPosition> {
        self.shared.position()
    }

    pub fn stats(&self) -> ConsumerStats {
        self.shared.snapshot()
    }

    /// Handle for closing and inspecting this consumer from other threads
    pub fn handle(&self) -> ConsumerHandle {
        ConsumerHandle::new(Arc::clone(&self.shared))
    }

    /// Repositioning is not supported
    pub fn mark_supported(&self) -> bool {
        false
    }

    /// No-op; see [`reset`](Self::reset)
    pub fn mark(&mut self, _read_limit: usize) {}

    /// Always fails: consumers cannot rewind
    pub fn reset(&mut self) -> Result<(), BroadcastError> {
        Err(BroadcastError::Unsupported("reset"))
    }
}

impl Read for BroadcastConsumer {
    /// Blocks for the first byte only, then copies whatever else the current
    /// buffer already holds.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let Some(first) = self.read_byte()? else {
            return Ok(0);
        };
        buf[0] = first;

        let rest = &self.current.data()[self.cursor..];
        let n = rest.len().min(buf.len() - 1);
        buf[1..=n].copy_from_slice(&rest[..n]);
        self.cursor += n;
        if n > 0 {
            self.shared.record_read(n as u64, self.cursor);
        }
        Ok(n + 1)
    }
}

impl Drop for BroadcastConsumer {
    fn drop(&mut self) {
        self.shared.close();
    }
}

//! Producer side of a broadcast stream
//!
//! The writer stages bytes until a full buffer's worth is available, then
//! publishes it into the chain. The end of the stream (normal or faulted)
//! occupies one slot after the last data byte.

use std::io::{self, Read, Write};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::buffer::StreamEnd;

use super::error::BroadcastError;
use super::store::BroadcastStream;

/// The single producer of a [`BroadcastStream`]
#[derive(Debug)]
pub struct BroadcastWriter {
    stream: BroadcastStream,
    staging: BytesMut,
    finished: bool,
}

impl BroadcastWriter {
    pub(super) fn new(stream: BroadcastStream) -> Self {
        let capacity = stream.config().buffer_size;
        Self {
            stream,
            staging: BytesMut::with_capacity(capacity),
            finished: false,
        }
    }

    fn capacity(&self) -> usize {
        self.stream.config().buffer_size
    }

    /// The stream this writer feeds
    pub fn stream(&self) -> &BroadcastStream {
        &self.stream
    }

    /// Whether the end of the stream has been published
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Append bytes to the stream
    ///
    /// Every full buffer is published immediately; a trailing partial
    /// buffer stays staged until more data, [`publish_partial`](Self::publish_partial)
    /// or the end of the stream.
    pub fn publish(&mut self, mut data: &[u8]) -> Result<(), BroadcastError> {
        self.ensure_open()?;
        let capacity = self.capacity();

        while !data.is_empty() {
            let take = (capacity - self.staging.len()).min(data.len());
            self.staging.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.staging.len() == capacity {
                let full = self.take_staged();
                self.stream.chain().append(full, None)?;
            }
        }
        Ok(())
    }

    /// Publish whatever is staged, even if the buffer is not full
    pub fn publish_partial(&mut self) -> Result<(), BroadcastError> {
        self.ensure_open()?;
        if self.staging.is_empty() {
            return Ok(());
        }
        let partial = self.take_staged();
        self.stream.chain().append(partial, None)?;
        Ok(())
    }

    /// Publish the staged bytes followed by the end-of-stream marker
    pub fn finish(&mut self) -> Result<(), BroadcastError> {
        self.publish_end(StreamEnd::Eof)?;
        tracing::debug!(
            bytes = self.stream.chain().bytes_published(),
            "Stream finished"
        );
        Ok(())
    }

    /// Publish the staged bytes followed by a fault marker
    ///
    /// Consumers deliver every byte written so far, then close. I/O errors
    /// are re-raised from each consumer's read; other faults are recorded
    /// on the consumer.
    pub fn fail(&mut self, err: BroadcastError) -> Result<(), BroadcastError> {
        tracing::debug!(error = %err, "Stream failed");
        self.publish_end(StreamEnd::from_error(err))
    }

    /// Copy a whole source into the stream, then finish it
    ///
    /// A read error fails the stream and is returned. Returns the number of
    /// bytes copied.
    pub fn pump<R: Read>(&mut self, mut reader: R) -> Result<u64, BroadcastError> {
        let mut scratch = vec![0u8; self.capacity()];
        let mut total = 0u64;

        loop {
            match reader.read(&mut scratch) {
                Ok(0) => break,
                Ok(n) => {
                    self.publish(&scratch[..n])?;
                    total += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fail_source(e)),
            }
        }

        self.finish()?;
        Ok(total)
    }

    /// Async variant of [`pump`](Self::pump) for tokio readers
    pub async fn pump_async<R: AsyncRead + Unpin>(
        &mut self,
        mut reader: R,
    ) -> Result<u64, BroadcastError> {
        let mut scratch = vec![0u8; self.capacity()];
        let mut total = 0u64;

        loop {
            match reader.read(&mut scratch).await {
                Ok(0) => break,
                Ok(n) => {
                    self.publish(&scratch[..n])?;
                    total += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fail_source(e)),
            }
        }

        self.finish()?;
        Ok(total)
    }

    fn fail_source(&mut self, e: io::Error) -> BroadcastError {
        let end = StreamEnd::Io {
            kind: e.kind(),
            message: e.to_string(),
        };
        tracing::debug!(error = %e, "Source read failed");
        if let Err(publish_err) = self.publish_end(end) {
            tracing::warn!(error = %publish_err, "Could not publish source failure");
        }
        BroadcastError::Io(e)
    }

    fn publish_end(&mut self, end: StreamEnd) -> Result<(), BroadcastError> {
        self.ensure_open()?;
        // Full buffers are published eagerly, so one slot is always free.
        let rest = self.take_staged();
        self.stream.chain().append(rest, Some(end))?;
        self.finished = true;
        Ok(())
    }

    fn take_staged(&mut self) -> Bytes {
        let capacity = self.capacity();
        let staged = self.staging.split().freeze();
        self.staging.reserve(capacity);
        staged
    }

    fn ensure_open(&self) -> Result<(), BroadcastError> {
        if self.finished {
            Err(BroadcastError::WriterFinished)
        } else {
            Ok(())
        }
    }
}

impl Write for BroadcastWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.publish(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.publish_partial()?;
        Ok(())
    }
}

impl Drop for BroadcastWriter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::warn!("Writer dropped without finishing the stream");
        if let Err(e) = self.fail(BroadcastError::ProducerDropped) {
            tracing::warn!(error = %e, "Could not publish writer drop");
        }
    }
}

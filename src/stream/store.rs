//! Broadcast stream coordinator
//!
//! Owns the buffer chain and the consumer bookkeeping, and implements the
//! release protocol that consumers call back into as they move through the
//! chain.

use std::sync::Arc;

use crate::buffer::{BroadcastBuffer, BufferChain};
use crate::consumer::BroadcastConsumer;
use crate::stats::StreamStats;

use super::config::StreamConfig;
use super::error::BroadcastError;
use super::writer::BroadcastWriter;

#[derive(Debug)]
struct StreamInner {
    config: StreamConfig,
    chain: BufferChain,
}

/// Handle to one broadcast stream
///
/// Cheap to clone; every clone refers to the same chain. Consumers are
/// created with [`subscribe`](Self::subscribe); the single producer is the
/// [`BroadcastWriter`] returned alongside the stream.
#[derive(Debug, Clone)]
pub struct BroadcastStream {
    inner: Arc<StreamInner>,
}

impl BroadcastStream {
    /// Create a stream with the default configuration
    pub fn new() -> (Self, BroadcastWriter) {
        Self::build(StreamConfig::default())
    }

    /// Create a stream with a custom configuration
    pub fn with_config(config: StreamConfig) -> Result<(Self, BroadcastWriter), BroadcastError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: StreamConfig) -> (Self, BroadcastWriter) {
        let stream = Self {
            inner: Arc::new(StreamInner {
                chain: BufferChain::new(config.buffer_size),
                config,
            }),
        };
        let writer = BroadcastWriter::new(stream.clone());
        (stream, writer)
    }

    /// Get the stream configuration
    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    pub(crate) fn chain(&self) -> &BufferChain {
        &self.inner.chain
    }

    /// Register a new consumer
    ///
    /// The consumer starts at the beginning of the newest published buffer,
    /// so consumers registered before the first write see the whole stream.
    pub fn subscribe(&self, label: impl Into<String>) -> Result<BroadcastConsumer, BroadcastError> {
        let label = label.into();
        let start = self.inner.chain.attach()?;

        tracing::info!(
            consumer = %label,
            buffer = start.sequence(),
            consumers = self.inner.chain.readers(),
            "Consumer registered"
        );

        Ok(BroadcastConsumer::new(label, self.clone(), start))
    }

    /// Drop `label`'s hold on `buffer`
    ///
    /// Returns the buffer the consumer should treat as its current one: the
    /// published successor, or `buffer` itself if there is none yet.
    pub fn release_hold(
        &self,
        buffer: &Arc<BroadcastBuffer>,
        label: &str,
    ) -> Result<Arc<BroadcastBuffer>, BroadcastError> {
        self.inner.chain.release(buffer, label)?;
        Ok(Arc::clone(buffer.next().unwrap_or(buffer)))
    }

    /// Remove a closed consumer from the stream
    ///
    /// Releases `held` and every buffer published after it.
    pub fn deregister_consumer(&self, label: &str, held: &Arc<BroadcastBuffer>) {
        if let Err(e) = self.inner.chain.detach(held, label) {
            tracing::warn!(consumer = %label, error = %e, "Release failed during close");
        }

        tracing::debug!(
            consumer = %label,
            consumers = self.inner.chain.readers(),
            "Consumer removed"
        );
    }

    /// Bytes readable from `buffer` at `cursor` without waiting
    pub fn available(&self, buffer: &BroadcastBuffer, cursor: usize) -> usize {
        BufferChain::available(buffer, cursor)
    }

    /// Newest published buffer
    pub fn tail(&self) -> Arc<BroadcastBuffer> {
        self.inner.chain.tail()
    }

    /// Number of open consumers
    pub fn consumer_count(&self) -> usize {
        self.inner.chain.readers()
    }

    /// Get stream statistics
    pub fn stats(&self) -> StreamStats {
        let chain = &self.inner.chain;
        StreamStats {
            consumer_count: chain.readers(),
            buffers_appended: chain.appended(),
            buffers_reclaimed: chain.reclaimed(),
            bytes_published: chain.bytes_published(),
            finished: chain.is_finished(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn small_stream() -> (BroadcastStream, BroadcastWriter) {
        BroadcastStream::with_config(
            StreamConfig::default()
                .buffer_size(4)
                .poll_interval(Duration::from_millis(1)),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = BroadcastStream::with_config(StreamConfig::default().buffer_size(0));
        assert!(matches!(result, Err(BroadcastError::InvalidConfig { .. })));
    }

    #[test]
    fn test_subscribe_and_close() {
        let (stream, _writer) = small_stream();

        let c1 = stream.subscribe("c1").unwrap();
        let c2 = stream.subscribe("c2").unwrap();
        assert_eq!(stream.consumer_count(), 2);

        assert!(c1.close());
        assert!(!c1.close());
        assert_eq!(stream.consumer_count(), 1);

        drop(c2);
        assert_eq!(stream.consumer_count(), 0);
    }

    #[test]
    fn test_release_hold_returns_successor() {
        let (stream, mut writer) = small_stream();
        let _c1 = stream.subscribe("c1").unwrap();
        let head = stream.chain().tail();

        // No successor yet: stays on the same buffer
        head.try_retain();
        let same = stream.release_hold(&head, "c1").unwrap();
        assert_eq!(same.sequence(), head.sequence());

        writer.publish(b"ABCD").unwrap();
        let next = stream.release_hold(&head, "c1").unwrap();
        assert_eq!(next.sequence(), 1);
        assert!(head.is_reclaimed());
    }

    #[test]
    fn test_available_counts_published_data() {
        let (stream, mut writer) = small_stream();
        let head = stream.chain().tail();

        writer.publish(b"ABCDEF").unwrap();
        assert_eq!(stream.available(&head, 0), 4);

        writer.finish().unwrap();
        assert_eq!(stream.available(&head, 0), 6);
    }

    #[test]
    fn test_stream_stats() {
        let (stream, mut writer) = small_stream();
        let mut c1 = stream.subscribe("c1").unwrap();

        writer.publish(b"ABCDE").unwrap();
        writer.finish().unwrap();

        let mut out = Vec::new();
        while let Some(b) = c1.read_byte().unwrap() {
            out.push(b);
        }
        assert_eq!(out, b"ABCDE");

        let stats = stream.stats();
        assert_eq!(stats.consumer_count, 0);
        assert_eq!(stats.buffers_appended, 2);
        assert_eq!(stats.buffers_reclaimed, 3);
        assert_eq!(stats.bytes_published, 5);
        assert!(stats.finished);
        assert_eq!(stats.buffers_live(), 0);
    }
}

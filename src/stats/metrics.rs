//! Statistics and metrics for broadcast consumers and streams

use std::fmt;
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use crate::stream::BroadcastError;

/// Point-in-time snapshot of one consumer
#[derive(Debug, Clone)]
pub struct ConsumerStats {
    /// Consumer label
    pub label: String,
    /// Whether the consumer can still read
    pub open: bool,
    /// Thread that performs the reads (None until the first read)
    pub thread_id: Option<ThreadId>,
    /// Data bytes delivered
    pub bytes_read: u64,
    /// Number of poll-interval waits
    pub waits: u64,
    /// Time spent waiting for the producer (waits × poll interval)
    pub total_wait: Duration,
    /// Time from creation to close (None while open)
    pub elapsed: Option<Duration>,
    /// Fault that closed the consumer, if any
    pub error: Option<Arc<BroadcastError>>,
}

impl ConsumerStats {
    /// Whether a fault closed the consumer
    pub fn had_error(&self) -> bool {
        self.error.is_some()
    }

    /// One indexed report line for listing many consumers
    pub fn report(&self, index: usize) -> String {
        format!(
            "[({}) Label: {} -- Thrd: {}, TtlRead: {}, Waits: {}, TtlWait: {}, Open: {}, TotalMillis: {}] ",
            index,
            self.label,
            thread_label(self.thread_id),
            group_thousands(self.bytes_read),
            group_thousands(self.waits),
            group_thousands(self.total_wait.as_millis() as u64),
            self.open,
            self.elapsed
                .map(|d| group_thousands(d.as_millis() as u64))
                .unwrap_or_else(|| "-1".to_string()),
        )
    }
}

impl fmt::Display for ConsumerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BroadcastConsumer -- {}, isOpen: {}, BytesRead: {}, Waits: {}, TtlWait: {}",
            self.label,
            self.open,
            group_thousands(self.bytes_read),
            group_thousands(self.waits),
            group_thousands(self.total_wait.as_millis() as u64),
        )
    }
}

/// Stream-level statistics
#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    /// Open consumers
    pub consumer_count: usize,
    /// Buffers appended after the head
    pub buffers_appended: u64,
    /// Buffers reclaimed after every reader moved past them
    pub buffers_reclaimed: u64,
    /// Data bytes published by the writer
    pub bytes_published: u64,
    /// Whether the end of the stream has been published
    pub finished: bool,
}

impl StreamStats {
    /// Buffers still held by at least one consumer (head included)
    pub fn buffers_live(&self) -> u64 {
        (self.buffers_appended + 1).saturating_sub(self.buffers_reclaimed)
    }
}

fn thread_label(id: Option<ThreadId>) -> String {
    match id {
        Some(id) => format!("{:?}", id),
        None => "-1".to_string(),
    }
}

/// Format with `,` between groups of three digits
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

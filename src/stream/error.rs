//! Broadcast error types
//!
//! Error types for stream, producer and consumer operations.

use std::io;

/// Error type for broadcast stream operations
#[derive(Debug)]
pub enum BroadcastError {
    /// I/O error from the data source
    Io(io::Error),
    /// The data source failed with a non-I/O fault
    SourceFault(String),
    /// The writer was dropped before finishing the stream
    ProducerDropped,
    /// A consumer released a buffer it no longer held
    RefcountUnderflow {
        /// Sequence number of the buffer
        buffer: u64,
        /// Label of the releasing consumer
        consumer: String,
    },
    /// A buffer was built with more slots than the configured capacity
    BufferOverflow {
        /// Data bytes in the buffer
        len: usize,
        /// Configured buffer capacity
        capacity: usize,
    },
    /// Invalid configuration parameter
    InvalidConfig {
        /// Description of what was invalid
        message: &'static str,
    },
    /// Operation not supported by broadcast consumers
    Unsupported(&'static str),
    /// The writer already finished or failed the stream
    WriterFinished,
    /// The stream has ended and every buffer has been reclaimed
    StreamFinished,
}

impl std::fmt::Display for BroadcastError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BroadcastError::Io(e) => write!(f, "io error: {}", e),
            BroadcastError::SourceFault(msg) => write!(f, "source fault: {}", msg),
            BroadcastError::ProducerDropped => write!(f, "writer dropped before finishing"),
            BroadcastError::RefcountUnderflow { buffer, consumer } => write!(
                f,
                "buffer {} released by {} with no outstanding readers",
                buffer, consumer
            ),
            BroadcastError::BufferOverflow { len, capacity } => write!(
                f,
                "buffer overflow: {} bytes (capacity {})",
                len, capacity
            ),
            BroadcastError::InvalidConfig { message } => write!(f, "invalid config: {}", message),
            BroadcastError::Unsupported(op) => write!(f, "{} is not supported", op),
            BroadcastError::WriterFinished => write!(f, "stream already finished"),
            BroadcastError::StreamFinished => write!(f, "stream finished and fully consumed"),
        }
    }
}

impl std::error::Error for BroadcastError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BroadcastError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for BroadcastError {
    fn from(e: io::Error) -> Self {
        BroadcastError::Io(e)
    }
}

impl From<BroadcastError> for io::Error {
    fn from(e: BroadcastError) -> Self {
        match e {
            BroadcastError::Io(e) => e,
            BroadcastError::Unsupported(_) => io::Error::new(io::ErrorKind::Unsupported, e),
            BroadcastError::WriterFinished | BroadcastError::StreamFinished => {
                io::Error::new(io::ErrorKind::BrokenPipe, e)
            }
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

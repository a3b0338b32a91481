//! bytecast
//!
//! Single-producer, multi-consumer broadcast byte stream.
//!
//! One source is read once and published into a shared, append-only chain
//! of fixed-size buffers. Any number of consumers replay the identical byte
//! sequence, each at its own pace and on its own thread. A buffer is
//! reclaimed once every consumer has moved past it.
//!
//! # Example
//!
//! ```
//! use std::io::Read;
//! use std::thread;
//!
//! use bytecast::BroadcastStream;
//!
//! let (stream, mut writer) = BroadcastStream::new();
//! let consumers: Vec<_> = (0..3)
//!     .map(|i| stream.subscribe(format!("reader-{}", i)).unwrap())
//!     .collect();
//!
//! let readers: Vec<_> = consumers
//!     .into_iter()
//!     .map(|mut consumer| {
//!         thread::spawn(move || {
//!             let mut out = Vec::new();
//!             consumer.read_to_end(&mut out).unwrap();
//!             out
//!         })
//!     })
//!     .collect();
//!
//! writer.pump(&b"hello, everyone"[..]).unwrap();
//!
//! for reader in readers {
//!     assert_eq!(reader.join().unwrap(), b"hello, everyone");
//! }
//! ```

pub mod buffer;
pub mod consumer;
pub mod stats;
pub mod stream;

pub use buffer::{BroadcastBuffer, BufferChain, StreamEnd};
pub use consumer::{BroadcastConsumer, BufferPosition, ConsumerHandle};
pub use stats::{ConsumerStats, StreamStats};
pub use stream::{BroadcastError, BroadcastStream, BroadcastWriter, StreamConfig};

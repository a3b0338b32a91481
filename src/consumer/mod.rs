//! Broadcast consumers
//!
//! A [`BroadcastConsumer`] is one independent reader with its own cursor
//! into the chain. It is driven by a single thread; a [`ConsumerHandle`]
//! lets any other thread close it or read its counters.

pub mod handle;
pub mod reader;

pub use handle::{BufferPosition, ConsumerHandle};
pub use reader::BroadcastConsumer;

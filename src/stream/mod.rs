//! Broadcast stream coordination
//!
//! The [`BroadcastStream`] owns the buffer chain and consumer bookkeeping;
//! the [`BroadcastWriter`] is its one producer.
//!
//! # Architecture
//!
//! ```text
//!                      BroadcastStream (Arc)
//!                 ┌──────────────────────────┐
//!                 │ config: StreamConfig     │
//!                 │ chain:  BufferChain      │
//!                 └────────────┬─────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  [BroadcastWriter]   [BroadcastConsumer]   [BroadcastConsumer]
//!   publish()/finish()   read_byte()           read_byte()
//!        │                     │                     │
//!        └──► chain.append()   └──► release_hold() ◄─┘
//! ```

pub mod config;
pub mod error;
pub mod store;
pub mod writer;

pub use config::StreamConfig;
pub use error::BroadcastError;
pub use store::BroadcastStream;
pub use writer::BroadcastWriter;

//! Shared buffer chain
//!
//! The producer publishes fixed-capacity [`BroadcastBuffer`]s into an
//! append-only [`BufferChain`]. Each consumer walks the chain at its own
//! pace; a buffer is reclaimed once every consumer that could read it has
//! moved past it.
//!
//! # Architecture
//!
//! ```text
//!   [Producer] ──append──► head ──► buf 1 ──► buf 2 ──► tail
//!                                     ▲                  ▲
//!                                     │                  │
//!                               [Consumer A]       [Consumer B]
//! ```
//!
//! `next` links are set exactly once through a `OnceLock`, which gives the
//! release/acquire pairing that makes a buffer's contents visible to any
//! consumer that can see the link.

pub mod block;
pub mod chain;

pub use block::{BroadcastBuffer, StreamEnd};
pub use chain::BufferChain;

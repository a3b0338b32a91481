//! Consumer and stream statistics

pub mod metrics;

pub use metrics::{ConsumerStats, StreamStats};

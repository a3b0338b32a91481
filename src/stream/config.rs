//! Stream configuration

use std::time::Duration;

use super::error::BroadcastError;

/// Default buffer capacity (64 KiB)
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default delay between retries while a consumer waits for data
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Broadcast stream configuration options
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Slots per buffer, including the end-of-stream marker
    pub buffer_size: usize,

    /// Sleep between retries when a consumer is ahead of the producer
    pub poll_interval: Duration,

    /// Emit diagnostic events on consumer close and caught faults
    pub debug: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            debug: false,
        }
    }
}

impl StreamConfig {
    /// Set the buffer capacity
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set the poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Enable or disable diagnostic events
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Validates the current configuration.
    pub fn validate(&self) -> Result<(), BroadcastError> {
        if self.buffer_size == 0 {
            return Err(BroadcastError::InvalidConfig {
                message: "buffer_size must be non-zero",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StreamConfig::default();

        assert_eq!(config.buffer_size, 64 * 1024);
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert!(!config.debug);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_chaining() {
        let config = StreamConfig::default()
            .buffer_size(4)
            .poll_interval(Duration::from_millis(1))
            .debug(true);

        assert_eq!(config.buffer_size, 4);
        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert!(config.debug);
    }

    #[test]
    fn test_zero_buffer_size_invalid() {
        let config = StreamConfig::default().buffer_size(0);
        assert!(matches!(
            config.validate(),
            Err(BroadcastError::InvalidConfig { .. })
        ));
    }
}

//! Transfer configuration
//!
//! The engine has exactly four tunables (window size, retransmission timeout,
//! packet size, packet count) plus an explicit, disabled-by-default cap on
//! retransmissions per packet.

use crate::packet::MAX_PAYLOAD_SIZE;
use crate::sequence::MAX_SEQ_NUMBER;
use std::time::Duration;
use thiserror::Error;

/// Default window size (packets)
pub const DEFAULT_WINDOW_SIZE: u32 = 4;

/// Default retransmission timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default payload size per packet (bytes)
pub const DEFAULT_PACKET_SIZE: usize = 1024;

/// Default number of packets per transfer
pub const DEFAULT_PACKET_COUNT: u32 = 10;

/// Configuration errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Window size must be positive")]
    ZeroWindow,

    #[error("Retransmission timeout must be positive")]
    ZeroTimeout,

    #[error("Packet size {size} exceeds maximum payload {max}")]
    PacketTooLarge { size: usize, max: usize },

    #[error("Packet count {count} exceeds sequence space {max}")]
    TooManyPackets { count: u32, max: u32 },

    #[error("Payload count {payloads} does not match packet count {count}")]
    PayloadCountMismatch { payloads: usize, count: u32 },
}

/// Sliding-window transfer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArqConfig {
    /// Maximum number of unacknowledged packets in flight
    pub window_size: u32,
    /// Retransmission timeout armed for every transmitted packet
    pub timeout: Duration,
    /// Payload bytes per packet
    pub packet_size: usize,
    /// Total number of packets in the transfer
    pub packet_count: u32,
    /// Give up after this many retransmissions of a single packet
    /// (`None` retries forever)
    pub max_retransmissions: Option<u32>,
}

impl ArqConfig {
    /// Create a configuration with the given window and timeout and default
    /// transfer shape
    pub fn new(window_size: u32, timeout: Duration) -> Self {
        ArqConfig {
            window_size,
            timeout,
            ..Self::default()
        }
    }

    /// Set the number of packets to transfer
    pub fn with_packet_count(mut self, packet_count: u32) -> Self {
        self.packet_count = packet_count;
        self
    }

    /// Set the payload size of each packet
    pub fn with_packet_size(mut self, packet_size: usize) -> Self {
        self.packet_size = packet_size;
        self
    }

    /// Cap the retransmissions of any single packet
    pub fn with_max_retransmissions(mut self, limit: u32) -> Self {
        self.max_retransmissions = Some(limit);
        self
    }

    /// Check the configuration for values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.packet_size > MAX_PAYLOAD_SIZE {
            return Err(ConfigError::PacketTooLarge {
                size: self.packet_size,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        if self.packet_count > MAX_SEQ_NUMBER {
            return Err(ConfigError::TooManyPackets {
                count: self.packet_count,
                max: MAX_SEQ_NUMBER,
            });
        }
        Ok(())
    }
}

impl Default for ArqConfig {
    fn default() -> Self {
        ArqConfig {
            window_size: DEFAULT_WINDOW_SIZE,
            timeout: DEFAULT_TIMEOUT,
            packet_size: DEFAULT_PACKET_SIZE,
            packet_count: DEFAULT_PACKET_COUNT,
            max_retransmissions: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(ArqConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_builder() {
        let config = ArqConfig::new(8, Duration::from_millis(300))
            .with_packet_count(50)
            .with_packet_size(100)
            .with_max_retransmissions(3);

        assert_eq!(config.window_size, 8);
        assert_eq!(config.packet_count, 50);
        assert_eq!(config.packet_size, 100);
        assert_eq!(config.max_retransmissions, Some(3));
    }

    #[test]
    fn test_rejects_zero_window() {
        let config = ArqConfig::new(0, DEFAULT_TIMEOUT);
        assert_eq!(config.validate(), Err(ConfigError::ZeroWindow));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let config = ArqConfig::new(4, Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));
    }

    #[test]
    fn test_rejects_oversized_packets() {
        let config = ArqConfig::default().with_packet_size(MAX_PAYLOAD_SIZE + 1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PacketTooLarge { .. })
        ));
    }
}

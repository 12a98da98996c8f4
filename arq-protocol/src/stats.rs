//! Endpoint statistics and round-trip time estimation

use std::time::Duration;

/// RTT (Round-Trip Time) estimator
///
/// Tracks RTT samples taken from echoed packet timestamps and maintains a
/// smoothed RTT and variance. The estimate is informational; retransmission
/// still uses the configured timeout.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    /// Smoothed RTT (microseconds)
    srtt: f64,
    /// RTT variance (microseconds)
    rtt_var: f64,
    /// Number of samples
    sample_count: u32,
}

impl RttEstimator {
    /// Create a new RTT estimator
    pub fn new() -> Self {
        RttEstimator {
            srtt: 100_000.0, // Initial estimate: 100ms
            rtt_var: 50_000.0,
            sample_count: 0,
        }
    }

    /// Update with a new RTT sample
    pub fn update(&mut self, rtt_sample_us: u64) {
        let sample = rtt_sample_us as f64;

        if self.sample_count == 0 {
            self.srtt = sample;
            self.rtt_var = sample / 2.0;
        } else {
            let alpha = 0.125;
            let beta = 0.25;

            let error = sample - self.srtt;
            self.srtt += alpha * error;
            self.rtt_var = (1.0 - beta) * self.rtt_var + beta * error.abs();
        }

        self.sample_count += 1;
    }

    /// Get smoothed RTT in microseconds
    pub fn srtt(&self) -> u64 {
        self.srtt as u64
    }

    /// Get RTT variance in microseconds
    pub fn rtt_var(&self) -> u64 {
        self.rtt_var as u64
    }

    /// Number of samples taken
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Suggested retransmission timeout
    ///
    /// RTO = SRTT + 4 * RTT_VAR
    pub fn rto(&self) -> Duration {
        let rto_us = self.srtt + 4.0 * self.rtt_var;
        Duration::from_micros(rto_us as u64)
    }
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Sender statistics
#[derive(Debug, Clone, Default)]
pub struct SenderStats {
    /// Data packets handed to the channel, including retransmissions
    pub packets_sent: u64,
    /// Data packets sent more than once
    pub packets_retransmitted: u64,
    /// Payload bytes handed to the channel
    pub bytes_sent: u64,
    /// Timer expiries that triggered a retransmission
    pub timeouts: u64,
    /// Acknowledgements received
    pub acks_received: u64,
    /// Acknowledgements ignored as stale, duplicate or out of range
    pub acks_ignored: u64,
    /// Round-trip time estimate
    pub rtt: RttEstimator,
}

impl SenderStats {
    /// Feed the RTT estimator from an echoed timestamp
    pub fn sample_rtt(&mut self, now_us: u64, echo_us: Option<u64>) {
        if let Some(sent_at) = echo_us {
            if let Some(rtt) = now_us.checked_sub(sent_at) {
                self.rtt.update(rtt);
            }
        }
    }
}

/// Receiver statistics
#[derive(Debug, Clone, Default)]
pub struct ReceiverStats {
    /// Data packets received
    pub packets_received: u64,
    /// Packets handed to the application
    pub packets_delivered: u64,
    /// Payload bytes handed to the application
    pub bytes_delivered: u64,
    /// Arrivals ahead of the expected sequence
    pub out_of_order: u64,
    /// Arrivals of already delivered or already buffered sequences
    pub duplicates: u64,
    /// Acknowledgements sent
    pub acks_sent: u64,
}

//! Bookkeeping shared by the Go-Back-N and Selective-Repeat senders
//!
//! Both senders own a window, a timer table, the transfer's payloads and a
//! lifecycle state. They differ only in how acknowledgements move the window
//! and how expiries are answered, which lives in their own modules.

use crate::buffer::SendBuffer;
use crate::config::{ArqConfig, ConfigError};
use crate::endpoint::{ArqContext, SenderState};
use crate::packet::DataPacket;
use crate::sequence::SeqNumber;
use crate::stats::SenderStats;
use crate::timers::TimerTable;
use crate::window::SendWindow;
use bytes::Bytes;
use tracing::{debug, info, trace, warn};

pub(crate) struct SenderCore {
    pub(crate) config: ArqConfig,
    pub(crate) window: SendWindow,
    pub(crate) timers: TimerTable,
    pub(crate) buffer: SendBuffer,
    pub(crate) state: SenderState,
    pub(crate) stats: SenderStats,
    label: &'static str,
}

impl SenderCore {
    /// Sender over `packet_count` zero-filled packets of `packet_size` bytes
    pub(crate) fn new(label: &'static str, config: ArqConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let buffer = SendBuffer::zeroed(config.packet_count, config.packet_size);
        Ok(Self::with_buffer(label, config, buffer))
    }

    /// Sender over caller-supplied payloads, one per packet
    pub(crate) fn with_payloads(
        label: &'static str,
        config: ArqConfig,
        payloads: Vec<Bytes>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if payloads.len() != config.packet_count as usize {
            return Err(ConfigError::PayloadCountMismatch {
                payloads: payloads.len(),
                count: config.packet_count,
            });
        }
        if let Some(size) = payloads
            .iter()
            .map(Bytes::len)
            .find(|&len| len > crate::packet::MAX_PAYLOAD_SIZE)
        {
            return Err(ConfigError::PacketTooLarge {
                size,
                max: crate::packet::MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Self::with_buffer(label, config, SendBuffer::new(payloads)))
    }

    fn with_buffer(label: &'static str, config: ArqConfig, buffer: SendBuffer) -> Self {
        SenderCore {
            window: SendWindow::new(config.window_size, config.packet_count),
            timers: TimerTable::new(),
            buffer,
            state: SenderState::Idle,
            stats: SenderStats::default(),
            config,
            label,
        }
    }

    /// Move from `Idle` to `Running`
    ///
    /// Returns true if the sender should start transmitting. An empty
    /// transfer completes immediately.
    pub(crate) fn start(&mut self, ctx: &mut dyn ArqContext) -> bool {
        if self.state != SenderState::Idle {
            warn!("{} sender start ignored in state {:?}", self.label, self.state);
            return false;
        }
        self.state = SenderState::Running;
        info!(
            "{} sender starting: {} packets, window {}, timeout {:?}",
            self.label, self.config.packet_count, self.config.window_size, self.config.timeout
        );
        if self.window.is_complete() {
            self.complete(ctx);
            return false;
        }
        true
    }

    /// Release every timer and stop reacting to events
    pub(crate) fn stop(&mut self, ctx: &mut dyn ArqContext) {
        let cancelled = self.timers.cancel_all(ctx);
        if matches!(self.state, SenderState::Idle | SenderState::Running) {
            self.state = SenderState::Stopped;
        }
        debug!(
            "{} sender stopped at base {} ({} timers released)",
            self.label,
            self.window.base(),
            cancelled
        );
    }

    /// Put packet `seq` on the channel
    ///
    /// Returns false (after aborting the transfer) if the retransmission limit
    /// for `seq` is exhausted.
    pub(crate) fn transmit(&mut self, ctx: &mut dyn ArqContext, seq: SeqNumber) -> bool {
        if let Some(limit) = self.config.max_retransmissions {
            if self.buffer.send_count(seq) > limit {
                self.abort(ctx, seq);
                return false;
            }
        }

        let payload = self.buffer.get(seq).cloned().unwrap_or_default();
        let count = self.buffer.record_send(seq);

        self.stats.packets_sent += 1;
        self.stats.bytes_sent += payload.len() as u64;
        if count > 1 {
            self.stats.packets_retransmitted += 1;
            debug!("{} sender retransmitting seq {} (attempt {})", self.label, seq, count);
        } else {
            trace!("{} sender sent seq {}", self.label, seq);
        }

        let packet = DataPacket::new(seq, Some(ctx.now_micros()), payload);
        ctx.send(packet.into());
        true
    }

    /// Count an acknowledgement that changed nothing
    pub(crate) fn ignore_ack(&mut self, ack_seq: SeqNumber, reason: &str) {
        self.stats.acks_ignored += 1;
        debug!(
            "{} sender ignoring ACK {} ({}), base {} next {}",
            self.label,
            ack_seq,
            reason,
            self.window.base(),
            self.window.next_seq()
        );
    }

    pub(crate) fn complete(&mut self, ctx: &mut dyn ArqContext) {
        self.timers.cancel_all(ctx);
        self.state = SenderState::Completed;
        info!(
            "{} sender complete: {} packets acknowledged, {} sent, {} retransmitted",
            self.label,
            self.config.packet_count,
            self.stats.packets_sent,
            self.stats.packets_retransmitted
        );
    }

    fn abort(&mut self, ctx: &mut dyn ArqContext, seq: SeqNumber) {
        self.timers.cancel_all(ctx);
        self.state = SenderState::Aborted;
        warn!(
            "{} sender aborting: seq {} exceeded {} retransmissions",
            self.label,
            seq,
            self.config.max_retransmissions.unwrap_or_default()
        );
    }
}

//! Go-Back-N sender and receiver
//!
//! The sender keeps up to `window_size` packets in flight. Acknowledgements
//! are cumulative: ACK `k` means every sequence `<= k` arrived in order. Any
//! expiry for a sequence still in the window goes back to `base` and resends
//! the whole window.
//!
//! The receiver accepts only the next in-order sequence and discards
//! everything else, answering every arrival with the last in-order sequence.

use crate::config::{ArqConfig, ConfigError};
use crate::endpoint::{ArqContext, Endpoint, ReceiverState, SenderState};
use crate::packet::{AckPacket, DataPacket, Packet};
use crate::sender::SenderCore;
use crate::sequence::SeqNumber;
use crate::stats::{ReceiverStats, SenderStats};
use bytes::Bytes;
use tracing::{debug, info, trace};

/// Go-Back-N sender
pub struct GbnSender {
    core: SenderCore,
}

impl GbnSender {
    /// Create a sender for `config.packet_count` zero-filled packets
    pub fn new(config: ArqConfig) -> Result<Self, ConfigError> {
        Ok(GbnSender {
            core: SenderCore::new("GBN", config)?,
        })
    }

    /// Create a sender for the given payloads, one per packet
    pub fn with_payloads(config: ArqConfig, payloads: Vec<Bytes>) -> Result<Self, ConfigError> {
        Ok(GbnSender {
            core: SenderCore::with_payloads("GBN", config, payloads)?,
        })
    }

    /// Oldest unacknowledged sequence number
    pub fn base(&self) -> SeqNumber {
        self.core.window.base()
    }

    /// Next sequence number to transmit
    pub fn next_seq(&self) -> SeqNumber {
        self.core.window.next_seq()
    }

    /// Packets sent and not yet acknowledged
    pub fn in_flight(&self) -> u32 {
        self.core.window.in_flight()
    }

    /// Number of outstanding retransmission timers
    pub fn outstanding_timers(&self) -> usize {
        self.core.timers.len()
    }

    /// Whether a retransmission timer is outstanding for `seq`
    pub fn has_timer(&self, seq: SeqNumber) -> bool {
        self.core.timers.contains(seq)
    }

    pub fn state(&self) -> SenderState {
        self.core.state
    }

    pub fn stats(&self) -> &SenderStats {
        &self.core.stats
    }

    pub fn config(&self) -> &ArqConfig {
        &self.core.config
    }

    /// Transmit packets until the window is full or the data runs out
    ///
    /// A timer is armed for a packet only if none is outstanding for it, so a
    /// partial resend never stacks a second timer on a sequence.
    pub fn fill_window(&mut self, ctx: &mut dyn ArqContext) {
        let core = &mut self.core;
        while core.state.is_running() && core.window.can_send() {
            let seq = core.window.next_seq();
            if !core.transmit(ctx, seq) {
                return;
            }
            core.timers.arm_if_absent(ctx, seq, core.config.timeout);
            core.window.advance_next();
        }
    }

    /// Handle a cumulative acknowledgement
    pub fn on_ack(&mut self, ctx: &mut dyn ArqContext, ack: AckPacket) {
        if !self.core.state.is_running() {
            return;
        }

        let ack_seq = ack.ack_seq();
        self.core.stats.acks_received += 1;

        if ack_seq < self.core.window.base() {
            self.core.ignore_ack(ack_seq, "below base");
            return;
        }
        if ack_seq >= self.core.window.next_seq() {
            self.core.ignore_ack(ack_seq, "never sent");
            return;
        }

        self.core
            .stats
            .sample_rtt(ctx.now_micros(), ack.echo_timestamp());
        self.core.window.slide_to(ack_seq.next());
        let cancelled = self.core.timers.cancel_up_to(ctx, ack_seq);
        trace!(
            "GBN sender ACK {}: base now {}, {} timers cancelled",
            ack_seq,
            self.core.window.base(),
            cancelled
        );

        if self.core.window.is_complete() {
            self.core.complete(ctx);
        } else {
            self.fill_window(ctx);
        }
    }
}

impl Endpoint for GbnSender {
    fn start(&mut self, ctx: &mut dyn ArqContext) {
        if self.core.start(ctx) {
            self.fill_window(ctx);
        }
    }

    fn stop(&mut self, ctx: &mut dyn ArqContext) {
        self.core.stop(ctx);
    }

    fn on_packet(&mut self, ctx: &mut dyn ArqContext, packet: Packet) {
        match packet {
            Packet::Ack(ack) => self.on_ack(ctx, ack),
            Packet::Data(data) => {
                debug!("GBN sender ignoring data packet {}", data.seq_number());
            }
        }
    }

    /// Go back to `base` and resend the whole window
    ///
    /// A late expiry for an already acknowledged sequence is ignored.
    fn on_timeout(&mut self, ctx: &mut dyn ArqContext, seq: SeqNumber) {
        if !self.core.state.is_running() {
            return;
        }
        if seq < self.core.window.base() {
            debug!(
                "GBN sender ignoring late timeout for seq {} (base {})",
                seq,
                self.core.window.base()
            );
            return;
        }

        self.core.stats.timeouts += 1;
        info!(
            "GBN sender timeout on seq {}, retransmitting from seq {}",
            seq,
            self.core.window.base()
        );

        self.core.timers.cancel_all(ctx);
        self.core.window.rewind();
        self.fill_window(ctx);
    }

    fn is_complete(&self) -> bool {
        self.core.state == SenderState::Completed
    }
}

/// Go-Back-N receiver
pub struct GbnReceiver {
    /// Next in-order sequence the application will accept
    expected_seq: SeqNumber,
    state: ReceiverState,
    stats: ReceiverStats,
}

impl GbnReceiver {
    pub fn new() -> Self {
        GbnReceiver {
            expected_seq: SeqNumber::ZERO,
            state: ReceiverState::Idle,
            stats: ReceiverStats::default(),
        }
    }

    /// Next in-order sequence number
    pub fn expected_seq(&self) -> SeqNumber {
        self.expected_seq
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    fn on_data(&mut self, ctx: &mut dyn ArqContext, packet: DataPacket) {
        let seq = packet.seq_number();
        let echo = packet.timestamp();
        self.stats.packets_received += 1;

        if seq == self.expected_seq {
            trace!("GBN receiver got expected seq {}", seq);
            self.stats.packets_delivered += 1;
            self.stats.bytes_delivered += packet.payload.len() as u64;
            ctx.deliver(seq, packet.payload);
            self.expected_seq.increment();
        } else if seq < self.expected_seq {
            self.stats.duplicates += 1;
            debug!("GBN receiver discarding duplicate seq {}", seq);
        } else {
            self.stats.out_of_order += 1;
            debug!(
                "GBN receiver discarding out-of-order seq {} (expected {})",
                seq, self.expected_seq
            );
        }

        // Nothing has arrived in order yet: there is no valid cumulative ACK
        // value, so stay silent and let the sender's timer recover.
        match self.expected_seq.prev() {
            Some(last_in_order) => {
                self.stats.acks_sent += 1;
                ctx.send(AckPacket::new(last_in_order, echo).into());
            }
            None => debug!("GBN receiver has nothing in order, ACK suppressed"),
        }
    }
}

impl Default for GbnReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Endpoint for GbnReceiver {
    fn start(&mut self, _ctx: &mut dyn ArqContext) {
        if self.state == ReceiverState::Idle {
            self.state = ReceiverState::Listening;
        }
    }

    fn stop(&mut self, _ctx: &mut dyn ArqContext) {
        self.state = ReceiverState::Stopped;
    }

    fn on_packet(&mut self, ctx: &mut dyn ArqContext, packet: Packet) {
        if self.state != ReceiverState::Listening {
            return;
        }
        match packet {
            Packet::Data(data) => self.on_data(ctx, data),
            Packet::Ack(ack) => debug!("GBN receiver ignoring ACK {}", ack.ack_seq()),
        }
    }

    fn on_timeout(&mut self, _ctx: &mut dyn ArqContext, _seq: SeqNumber) {}
}

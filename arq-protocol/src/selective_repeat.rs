//! Selective-Repeat sender and receiver
//!
//! Every packet owns its retransmission timer. Acknowledgements are selective:
//! ACK `k` covers exactly sequence `k`. The sender records acknowledgements
//! inside the window and, once `base` itself is acknowledged, slides past the
//! whole run of acknowledged sequences.
//!
//! The receiver buffers arrivals ahead of a gap and delivers the contiguous
//! run as soon as the gap is filled.

use crate::buffer::ReorderBuffer;
use crate::config::{ArqConfig, ConfigError};
use crate::endpoint::{ArqContext, Endpoint, ReceiverState, SenderState};
use crate::packet::{AckPacket, DataPacket, Packet};
use crate::sender::SenderCore;
use crate::sequence::SeqNumber;
use crate::stats::{ReceiverStats, SenderStats};
use bytes::Bytes;
use std::collections::BTreeSet;
use tracing::{debug, info, trace};

/// Selective-Repeat sender
pub struct SrSender {
    core: SenderCore,
    /// Acknowledged sequences above `base`; every member is in `(base, next_seq)`
    acked: BTreeSet<SeqNumber>,
}

impl SrSender {
    /// Create a sender for `config.packet_count` zero-filled packets
    pub fn new(config: ArqConfig) -> Result<Self, ConfigError> {
        Ok(SrSender {
            core: SenderCore::new("SR", config)?,
            acked: BTreeSet::new(),
        })
    }

    /// Create a sender for the given payloads, one per packet
    pub fn with_payloads(config: ArqConfig, payloads: Vec<Bytes>) -> Result<Self, ConfigError> {
        Ok(SrSender {
            core: SenderCore::with_payloads("SR", config, payloads)?,
            acked: BTreeSet::new(),
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

    /// Packets sent and not yet slid past
    pub fn in_flight(&self) -> u32 {
        self.core.window.in_flight()
    }

    /// Whether `seq` is acknowledged but still inside the window
    pub fn is_acked(&self, seq: SeqNumber) -> bool {
        self.acked.contains(&seq)
    }

    pub fn outstanding_timers(&self) -> usize {
        self.core.timers.len()
    }

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

    /// Transmit the next packet if the window has room
    ///
    /// Returns true if a packet was sent.
    pub fn send_next(&mut self, ctx: &mut dyn ArqContext) -> bool {
        let core = &mut self.core;
        if !core.state.is_running() || !core.window.can_send() {
            return false;
        }
        let seq = core.window.next_seq();
        if !core.transmit(ctx, seq) {
            return false;
        }
        core.timers.arm(ctx, seq, core.config.timeout);
        core.window.advance_next();
        true
    }

    fn send_available(&mut self, ctx: &mut dyn ArqContext) {
        while self.send_next(ctx) {}
    }

    /// Handle a selective acknowledgement
    pub fn on_ack(&mut self, ctx: &mut dyn ArqContext, ack: AckPacket) {
        if !self.core.state.is_running() {
            return;
        }

        let ack_seq = ack.ack_seq();
        self.core.stats.acks_received += 1;

        if !self.core.window.contains(ack_seq) {
            self.core.ignore_ack(ack_seq, "outside window");
            return;
        }
        if self.acked.contains(&ack_seq) {
            self.core.ignore_ack(ack_seq, "duplicate");
            return;
        }

        self.core
            .stats
            .sample_rtt(ctx.now_micros(), ack.echo_timestamp());
        self.core.timers.cancel(ctx, ack_seq);

        let base = self.core.window.base();
        if ack_seq != base {
            trace!("SR sender ACK {} recorded above base {}", ack_seq, base);
            self.acked.insert(ack_seq);
            return;
        }

        let mut new_base = base.next();
        while self.acked.remove(&new_base) {
            new_base.increment();
        }
        self.core.window.slide_to(new_base);
        trace!("SR sender ACK {}: base now {}", ack_seq, new_base);

        if self.core.window.is_complete() {
            self.core.complete(ctx);
        } else {
            self.send_available(ctx);
        }
    }
}

impl Endpoint for SrSender {
    fn start(&mut self, ctx: &mut dyn ArqContext) {
        if self.core.start(ctx) {
            self.send_available(ctx);
        }
    }

    fn stop(&mut self, ctx: &mut dyn ArqContext) {
        self.core.stop(ctx);
    }

    fn on_packet(&mut self, ctx: &mut dyn ArqContext, packet: Packet) {
        match packet {
            Packet::Ack(ack) => self.on_ack(ctx, ack),
            Packet::Data(data) => {
                debug!("SR sender ignoring data packet {}", data.seq_number());
            }
        }
    }

    /// Resend `seq` alone and re-arm only its timer
    fn on_timeout(&mut self, ctx: &mut dyn ArqContext, seq: SeqNumber) {
        if !self.core.state.is_running() {
            return;
        }
        if !self.core.window.contains(seq) || self.acked.contains(&seq) {
            debug!("SR sender ignoring timeout for acknowledged seq {}", seq);
            return;
        }

        self.core.stats.timeouts += 1;
        info!("SR sender timeout for seq {}, retransmitting", seq);

        // The handle in the table is the one that just fired.
        self.core.timers.forget(seq);
        if self.core.transmit(ctx, seq) {
            self.core.timers.arm(ctx, seq, self.core.config.timeout);
        }
    }

    fn is_complete(&self) -> bool {
        self.core.state == SenderState::Completed
    }
}

/// Selective-Repeat receiver
pub struct SrReceiver {
    /// Next in-order sequence the application will accept
    expected_seq: SeqNumber,
    /// Early arrivals; every member is greater than `expected_seq`
    buffer: ReorderBuffer,
    state: ReceiverState,
    stats: ReceiverStats,
}

impl SrReceiver {
    pub fn new() -> Self {
        SrReceiver {
            expected_seq: SeqNumber::ZERO,
            buffer: ReorderBuffer::new(),
            state: ReceiverState::Idle,
            stats: ReceiverStats::default(),
        }
    }

    /// Next in-order sequence number
    pub fn expected_seq(&self) -> SeqNumber {
        self.expected_seq
    }

    /// Sequences received ahead of a gap, ascending
    pub fn buffered(&self) -> Vec<SeqNumber> {
        self.buffer.sequences().collect()
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    fn deliver(&mut self, ctx: &mut dyn ArqContext, seq: SeqNumber, payload: Bytes) {
        self.stats.packets_delivered += 1;
        self.stats.bytes_delivered += payload.len() as u64;
        ctx.deliver(seq, payload);
        self.expected_seq.increment();
    }

    fn on_data(&mut self, ctx: &mut dyn ArqContext, packet: DataPacket) {
        let seq = packet.seq_number();
        let echo = packet.timestamp();
        self.stats.packets_received += 1;

        if seq == self.expected_seq {
            self.deliver(ctx, seq, packet.payload);
            while let Some(payload) = self.buffer.remove(self.expected_seq) {
                let next = self.expected_seq;
                self.deliver(ctx, next, payload);
            }
            trace!(
                "SR receiver delivered through seq {}",
                self.expected_seq.prev().unwrap_or_default()
            );
        } else if seq > self.expected_seq {
            if self.buffer.insert(seq, packet.payload) {
                self.stats.out_of_order += 1;
                debug!(
                    "SR receiver buffered seq {} (expected {})",
                    seq, self.expected_seq
                );
            } else {
                self.stats.duplicates += 1;
                debug!("SR receiver already holds seq {}", seq);
            }
        } else {
            self.stats.duplicates += 1;
            debug!("SR receiver re-acknowledging delivered seq {}", seq);
        }

        self.stats.acks_sent += 1;
        ctx.send(AckPacket::new(seq, echo).into());
    }
}

impl Default for SrReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Endpoint for SrReceiver {
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
            Packet::Ack(ack) => debug!("SR receiver ignoring ACK {}", ack.ack_seq()),
        }
    }

    fn on_timeout(&mut self, _ctx: &mut dyn ArqContext, _seq: SeqNumber) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockContext;
    use proptest::prelude::*;
    use std::time::Duration;

    fn config(window: u32, packets: u32) -> ArqConfig {
        ArqConfig::new(window, Duration::from_millis(300))
            .with_packet_count(packets)
            .with_packet_size(4)
    }

    fn ack(n: u32) -> Packet {
        AckPacket::new(SeqNumber::new(n), None).into()
    }

    fn data(n: u32) -> Packet {
        DataPacket::new(SeqNumber::new(n), None, Bytes::from(vec![n as u8])).into()
    }

    fn started_sender(window: u32, packets: u32) -> (SrSender, MockContext) {
        let mut ctx = MockContext::new();
        let mut sender = SrSender::new(config(window, packets)).unwrap();
        sender.start(&mut ctx);
        (sender, ctx)
    }

    fn started_receiver() -> (SrReceiver, MockContext) {
        let mut ctx = MockContext::new();
        let mut receiver = SrReceiver::new();
        receiver.start(&mut ctx);
        (receiver, ctx)
    }

    #[test]
    fn test_start_sends_window_with_own_timers() {
        let (sender, mut ctx) = started_sender(4, 10);
        assert_eq!(ctx.take_data_seqs(), vec![0, 1, 2, 3]);
        assert_eq!(ctx.live_timer_seqs(), vec![0, 1, 2, 3]);
        assert_eq!(sender.outstanding_timers(), 4);
    }

    #[test]
    fn test_send_next_respects_window() {
        let (mut sender, mut ctx) = started_sender(2, 10);
        ctx.take_sent();
        assert!(!sender.send_next(&mut ctx));
        assert!(ctx.take_sent().is_empty());
    }

    #[test]
    fn test_ack_above_base_does_not_slide() {
        let (mut sender, mut ctx) = started_sender(4, 10);
        ctx.take_sent();

        sender.on_packet(&mut ctx, ack(2));

        assert_eq!(sender.base(), SeqNumber::new(0));
        assert!(sender.is_acked(SeqNumber::new(2)));
        assert_eq!(ctx.live_timer_seqs(), vec![0, 1, 3]);
        assert!(ctx.take_sent().is_empty());
    }

    #[test]
    fn test_base_ack_slides_past_acknowledged_run() {
        let (mut sender, mut ctx) = started_sender(4, 10);
        sender.on_packet(&mut ctx, ack(1));
        sender.on_packet(&mut ctx, ack(2));
        ctx.take_sent();

        sender.on_packet(&mut ctx, ack(0));

        assert_eq!(sender.base(), SeqNumber::new(3));
        assert!(!sender.is_acked(SeqNumber::new(1)));
        assert_eq!(ctx.take_data_seqs(), vec![4, 5, 6]);
        assert_eq!(ctx.live_timer_seqs(), vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_duplicate_and_stale_acks_ignored() {
        let (mut sender, mut ctx) = started_sender(4, 10);
        sender.on_packet(&mut ctx, ack(0));
        sender.on_packet(&mut ctx, ack(2));
        ctx.take_sent();
        let timers = ctx.live_timer_seqs();

        sender.on_packet(&mut ctx, ack(0));
        sender.on_packet(&mut ctx, ack(2));
        sender.on_packet(&mut ctx, ack(9));

        assert_eq!(sender.base(), SeqNumber::new(1));
        assert_eq!(ctx.live_timer_seqs(), timers);
        assert!(ctx.take_sent().is_empty());
        assert_eq!(sender.stats().acks_ignored, 3);
    }

    #[test]
    fn test_timeout_retransmits_only_that_sequence() {
        let (mut sender, mut ctx) = started_sender(4, 10);
        ctx.take_sent();
        let others: Vec<_> = [0, 2, 3]
            .iter()
            .map(|&n| sender.core.timers.handle(SeqNumber::new(n)))
            .collect();

        ctx.expire(SeqNumber::new(1));
        sender.on_timeout(&mut ctx, SeqNumber::new(1));

        assert_eq!(ctx.take_data_seqs(), vec![1]);
        assert_eq!(ctx.live_timer_seqs(), vec![0, 1, 2, 3]);
        let after: Vec<_> = [0, 2, 3]
            .iter()
            .map(|&n| sender.core.timers.handle(SeqNumber::new(n)))
            .collect();
        assert_eq!(others, after);
        assert_eq!(sender.base(), SeqNumber::new(0));
        assert_eq!(sender.next_seq(), SeqNumber::new(4));
    }

    #[test]
    fn test_timeout_for_acknowledged_sequence_ignored() {
        let (mut sender, mut ctx) = started_sender(4, 10);
        sender.on_packet(&mut ctx, ack(2));
        ctx.take_sent();

        sender.on_timeout(&mut ctx, SeqNumber::new(2));

        assert!(ctx.take_sent().is_empty());
        assert_eq!(sender.stats().timeouts, 0);
    }

    #[test]
    fn test_late_timeout_below_base_ignored() {
        let (mut sender, mut ctx) = started_sender(4, 10);
        sender.on_packet(&mut ctx, ack(0));
        sender.on_packet(&mut ctx, ack(1));
        ctx.take_sent();
        let timers = ctx.live_timer_seqs();

        sender.on_timeout(&mut ctx, SeqNumber::new(0));
        sender.on_timeout(&mut ctx, SeqNumber::new(9));

        assert_eq!(sender.base(), SeqNumber::new(2));
        assert!(ctx.take_sent().is_empty());
        assert_eq!(ctx.live_timer_seqs(), timers);
        assert_eq!(sender.stats().timeouts, 0);
        assert!(!sender.has_timer(SeqNumber::new(0)));
    }

    #[test]
    fn test_completion_cancels_everything() {
        let (mut sender, mut ctx) = started_sender(4, 3);
        sender.on_packet(&mut ctx, ack(2));
        sender.on_packet(&mut ctx, ack(1));
        sender.on_packet(&mut ctx, ack(0));

        assert!(sender.is_complete());
        assert!(ctx.live_timer_seqs().is_empty());
    }

    #[test]
    fn test_retry_limit_aborts() {
        let mut ctx = MockContext::new();
        let mut sender = SrSender::new(config(2, 2).with_max_retransmissions(0)).unwrap();
        sender.start(&mut ctx);

        ctx.expire(SeqNumber::new(1));
        sender.on_timeout(&mut ctx, SeqNumber::new(1));

        assert_eq!(sender.state(), SenderState::Aborted);
        assert!(ctx.live_timer_seqs().is_empty());
    }

    #[test]
    fn test_stop_releases_timers() {
        let (mut sender, mut ctx) = started_sender(4, 10);
        sender.stop(&mut ctx);
        assert!(ctx.live_timer_seqs().is_empty());
        assert_eq!(sender.outstanding_timers(), 0);
    }

    #[test]
    fn test_receiver_buffers_then_drains() {
        let (mut receiver, mut ctx) = started_receiver();
        receiver.on_packet(&mut ctx, data(0));
        receiver.on_packet(&mut ctx, data(2));
        receiver.on_packet(&mut ctx, data(3));

        assert_eq!(ctx.delivered_seqs(), vec![0]);
        assert_eq!(receiver.buffered(), vec![SeqNumber::new(2), SeqNumber::new(3)]);

        receiver.on_packet(&mut ctx, data(1));

        assert_eq!(ctx.delivered_seqs(), vec![0, 1, 2, 3]);
        assert!(receiver.buffered().is_empty());
        assert_eq!(receiver.expected_seq(), SeqNumber::new(4));
        assert_eq!(ctx.take_ack_seqs(), vec![0, 2, 3, 1]);
    }

    #[test]
    fn test_receiver_delivers_buffered_payloads() {
        let (mut receiver, mut ctx) = started_receiver();
        receiver.on_packet(&mut ctx, data(1));
        receiver.on_packet(&mut ctx, data(0));

        let payloads: Vec<_> = ctx.delivered.iter().map(|(_, p)| p[0]).collect();
        assert_eq!(payloads, vec![0, 1]);
    }

    #[test]
    fn test_receiver_duplicate_out_of_order_arrival() {
        let (mut receiver, mut ctx) = started_receiver();
        receiver.on_packet(&mut ctx, data(2));
        receiver.on_packet(&mut ctx, data(2));

        assert_eq!(receiver.buffered(), vec![SeqNumber::new(2)]);
        assert!(ctx.delivered.is_empty());
        assert_eq!(ctx.take_ack_seqs(), vec![2, 2]);
        assert_eq!(receiver.stats().duplicates, 1);
    }

    #[test]
    fn test_receiver_duplicate_after_delivery() {
        let (mut receiver, mut ctx) = started_receiver();
        receiver.on_packet(&mut ctx, data(0));
        receiver.on_packet(&mut ctx, data(0));

        assert_eq!(ctx.delivered_seqs(), vec![0]);
        assert_eq!(receiver.expected_seq(), SeqNumber::new(1));
        assert_eq!(ctx.take_ack_seqs(), vec![0, 0]);
    }

    proptest! {
        #[test]
        fn prop_acks_in_any_order_complete_transfer(
            order in Just((0u32..8).collect::<Vec<_>>()).prop_shuffle()
        ) {
            let (mut sender, mut ctx) = started_sender(8, 8);
            for n in order {
                sender.on_packet(&mut ctx, ack(n));
            }

            prop_assert!(sender.is_complete());
            prop_assert_eq!(sender.base(), SeqNumber::new(8));
            prop_assert!(ctx.live_timer_seqs().is_empty());
            prop_assert_eq!(sender.stats().acks_ignored, 0);
        }

        #[test]
        fn prop_receiver_delivers_each_sequence_once_in_order(
            order in Just((0u32..8).collect::<Vec<_>>()).prop_shuffle(),
            repeats in prop::collection::vec(0u32..8, 0..8),
        ) {
            let (mut receiver, mut ctx) = started_receiver();
            for n in order.iter().chain(repeats.iter()) {
                receiver.on_packet(&mut ctx, data(*n));
            }

            prop_assert_eq!(ctx.delivered_seqs(), (0..8).collect::<Vec<_>>());
            prop_assert!(receiver.buffered().is_empty());
            prop_assert_eq!(receiver.stats().duplicates, repeats.len() as u64);
            prop_assert_eq!(ctx.take_ack_seqs().len(), order.len() + repeats.len());
        }
    }
}

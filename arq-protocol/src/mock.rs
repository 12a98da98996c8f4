//! Recording context for unit tests

use crate::endpoint::{ArqContext, Channel, TimerHandle, TimerService};
use crate::packet::Packet;
use crate::sequence::SeqNumber;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::time::Duration;

/// Context that records everything an endpoint does and fires nothing
#[derive(Debug, Default)]
pub struct MockContext {
    pub now: Duration,
    pub sent: Vec<Packet>,
    pub delivered: Vec<(SeqNumber, Bytes)>,
    timers: BTreeMap<TimerHandle, SeqNumber>,
    next_handle: u64,
}

impl MockContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the packets sent so far
    pub fn take_sent(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.sent)
    }

    /// Drain sent data packets, returning their sequence numbers
    pub fn take_data_seqs(&mut self) -> Vec<u32> {
        self.take_sent()
            .into_iter()
            .filter(Packet::is_data)
            .map(|p| p.seq_number().as_raw())
            .collect()
    }

    /// Drain sent acknowledgements, returning the acknowledged values
    pub fn take_ack_seqs(&mut self) -> Vec<u32> {
        self.take_sent()
            .into_iter()
            .filter(Packet::is_ack)
            .map(|p| p.seq_number().as_raw())
            .collect()
    }

    /// Sequence numbers delivered to the application, in order
    pub fn delivered_seqs(&self) -> Vec<u32> {
        self.delivered.iter().map(|(s, _)| s.as_raw()).collect()
    }

    /// Sequence numbers with a live timer, ascending
    pub fn live_timer_seqs(&self) -> Vec<u32> {
        let mut seqs: Vec<u32> = self.timers.values().map(|s| s.as_raw()).collect();
        seqs.sort_unstable();
        seqs
    }

    pub fn is_live(&self, handle: TimerHandle) -> bool {
        self.timers.contains_key(&handle)
    }

    /// Retire the live timer for `seq` the way a scheduler does when it
    /// dispatches the expiry
    pub fn expire(&mut self, seq: SeqNumber) -> Option<TimerHandle> {
        let handle = self
            .timers
            .iter()
            .find(|(_, s)| **s == seq)
            .map(|(h, _)| *h)?;
        self.timers.remove(&handle);
        Some(handle)
    }
}

impl Channel for MockContext {
    fn send(&mut self, packet: Packet) {
        self.sent.push(packet);
    }
}

impl TimerService for MockContext {
    fn schedule(&mut self, _delay: Duration, seq: SeqNumber) -> TimerHandle {
        let handle = TimerHandle::new(self.next_handle);
        self.next_handle += 1;
        self.timers.insert(handle, seq);
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.timers.remove(&handle);
    }
}

impl ArqContext for MockContext {
    fn now(&self) -> Duration {
        self.now
    }

    fn deliver(&mut self, seq: SeqNumber, payload: Bytes) {
        self.delivered.push((seq, payload));
    }
}

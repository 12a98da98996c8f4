//! Sender-side sliding window bookkeeping
//!
//! ```text
//!       base             next_seq        base + size      limit
//!        │                  │                 │             │
//!  ──────┼──────────────────┼─────────────────┼─────────────┼──▶ seq space
//!  acked │ <── in flight ──▶│ <── sendable ──▶│  not yet    │
//! ```

use crate::sequence::SeqNumber;

/// Fixed-capacity send window over a finite transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendWindow {
    /// Oldest unacknowledged sequence number
    base: SeqNumber,
    /// Next sequence number to transmit
    next_seq: SeqNumber,
    /// Window capacity in packets
    size: u32,
    /// One past the last sequence number of the transfer
    limit: SeqNumber,
}

impl SendWindow {
    /// Create a window of `size` packets over a transfer of `packet_count`
    pub fn new(size: u32, packet_count: u32) -> Self {
        SendWindow {
            base: SeqNumber::ZERO,
            next_seq: SeqNumber::ZERO,
            size,
            limit: SeqNumber::new(packet_count),
        }
    }

    #[inline]
    pub fn base(&self) -> SeqNumber {
        self.base
    }

    #[inline]
    pub fn next_seq(&self) -> SeqNumber {
        self.next_seq
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// One past the final sequence number
    #[inline]
    pub fn limit(&self) -> SeqNumber {
        self.limit
    }

    /// Right edge of the window (exclusive)
    #[inline]
    pub fn end(&self) -> SeqNumber {
        self.base + self.size
    }

    /// Number of packets sent but not yet acknowledged
    pub fn in_flight(&self) -> u32 {
        self.next_seq.as_raw() - self.base.as_raw()
    }

    /// Whether the window admits another packet and data remains
    pub fn can_send(&self) -> bool {
        self.next_seq < self.end() && self.next_seq < self.limit
    }

    /// Whether `seq` has been sent and not yet slid past
    pub fn contains(&self, seq: SeqNumber) -> bool {
        seq >= self.base && seq < self.next_seq
    }

    /// Whether every packet of the transfer has been acknowledged
    pub fn is_complete(&self) -> bool {
        self.base >= self.limit
    }

    /// Claim the next sequence number for transmission
    pub fn advance_next(&mut self) -> SeqNumber {
        debug_assert!(self.can_send(), "window full or transfer exhausted");
        let seq = self.next_seq;
        self.next_seq.increment();
        seq
    }

    /// Move the left edge forward to `new_base`
    ///
    /// `new_base` may not move past `next_seq`; only transmitted packets can
    /// be acknowledged.
    pub fn slide_to(&mut self, new_base: SeqNumber) {
        debug_assert!(new_base >= self.base, "window cannot slide backwards");
        debug_assert!(new_base <= self.next_seq, "cannot acknowledge unsent data");
        self.base = new_base;
    }

    /// Reset `next_seq` to `base` so the whole window is sent again
    pub fn rewind(&mut self) {
        self.next_seq = self.base;
    }
}

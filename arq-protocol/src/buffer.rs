//! Payload storage for the sender and the Selective-Repeat receiver
//!
//! The sender keeps every payload for the life of the transfer so that a
//! retransmission resends exactly the bytes of the original transmission.
//! The receiver-side [`ReorderBuffer`] holds payloads that arrived ahead of a
//! gap until the gap is filled.

use crate::sequence::SeqNumber;
use bytes::Bytes;
use std::collections::BTreeMap;

/// Immutable per-sequence payload store with transmission counts
#[derive(Debug, Clone)]
pub struct SendBuffer {
    /// Payload for each sequence number, indexed by sequence
    payloads: Vec<Bytes>,
    /// Number of times each sequence has been transmitted
    send_counts: Vec<u32>,
}

impl SendBuffer {
    /// Create a buffer holding the given payloads, one per sequence number
    pub fn new(payloads: Vec<Bytes>) -> Self {
        let send_counts = vec![0; payloads.len()];
        SendBuffer {
            payloads,
            send_counts,
        }
    }

    /// Create a buffer of `count` zero-filled payloads of `size` bytes
    pub fn zeroed(count: u32, size: usize) -> Self {
        let zeros = Bytes::from(vec![0u8; size]);
        Self::new(vec![zeros; count as usize])
    }

    /// Number of packets in the transfer
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Payload for `seq`
    pub fn get(&self, seq: SeqNumber) -> Option<&Bytes> {
        self.payloads.get(seq.as_index())
    }

    /// Record a transmission of `seq`, returning its total transmission count
    pub fn record_send(&mut self, seq: SeqNumber) -> u32 {
        match self.send_counts.get_mut(seq.as_index()) {
            Some(count) => {
                *count += 1;
                *count
            }
            None => 0,
        }
    }

    /// Number of times `seq` has been transmitted
    pub fn send_count(&self, seq: SeqNumber) -> u32 {
        self.send_counts.get(seq.as_index()).copied().unwrap_or(0)
    }
}

/// Out-of-order arrivals waiting for a gap to be filled
#[derive(Debug, Default, Clone)]
pub struct ReorderBuffer {
    pending: BTreeMap<SeqNumber, Bytes>,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer an early arrival
    ///
    /// Returns false if `seq` was already buffered; the first copy is kept.
    pub fn insert(&mut self, seq: SeqNumber, payload: Bytes) -> bool {
        use std::collections::btree_map::Entry;

        match self.pending.entry(seq) {
            Entry::Vacant(slot) => {
                slot.insert(payload);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Take the payload for `seq` out of the buffer
    pub fn remove(&mut self, seq: SeqNumber) -> Option<Bytes> {
        self.pending.remove(&seq)
    }

    pub fn contains(&self, seq: SeqNumber) -> bool {
        self.pending.contains_key(&seq)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Buffered sequence numbers, ascending
    pub fn sequences(&self) -> impl Iterator<Item = SeqNumber> + '_ {
        self.pending.keys().copied()
    }
}

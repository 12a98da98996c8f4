//! Discrete-event queue and timer registry
//!
//! Events are dispatched in timestamp order; events scheduled for the same
//! instant are dispatched in the order they were scheduled. Timer liveness is
//! tracked separately from the queue so that a cancelled timer stays in the
//! heap but is discarded when it surfaces.

use crate::time::Timestamp;
use arq_protocol::endpoint::TimerHandle;
use arq_protocol::sequence::SeqNumber;
use bytes::Bytes;
use std::collections::{BinaryHeap, HashSet};
use std::fmt;

/// One of the two endpoints of a simulated transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Sender,
    Receiver,
}

impl Side {
    /// The endpoint at the other end of the link
    pub fn peer(self) -> Side {
        match self {
            Side::Sender => Side::Receiver,
            Side::Receiver => Side::Sender,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Sender => write!(f, "sender"),
            Side::Receiver => write!(f, "receiver"),
        }
    }
}

/// Something that happens to an endpoint at a point in virtual time
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Start the endpoint
    Start(Side),
    /// Stop the endpoint
    Stop(Side),
    /// Encoded packet reaching `to`
    Arrival { to: Side, bytes: Bytes },
    /// Retransmission timer armed by `side` for `seq`
    Timer {
        side: Side,
        handle: TimerHandle,
        seq: SeqNumber,
    },
}

struct PendingEvent {
    at: Timestamp,
    order: u64,
    event: Event,
}

// Ord and Eq implementations provided for use with BinaryHeap, which is a
// max-heap: the earliest (time, order) pair compares greatest.
impl Eq for PendingEvent {}
impl PartialEq for PendingEvent {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.order == other.order
    }
}

impl PartialOrd for PendingEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (other.at, other.order).cmp(&(self.at, self.order))
    }
}

/// Min-heap of events ordered by (time, insertion order)
#[derive(Default)]
pub struct EventQueue {
    pending: BinaryHeap<PendingEvent>,
    next_order: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `event` at `at`
    pub fn push(&mut self, at: Timestamp, event: Event) {
        let order = self.next_order;
        self.next_order += 1;
        self.pending.push(PendingEvent { at, order, event });
    }

    /// Remove the earliest event
    pub fn pop(&mut self) -> Option<(Timestamp, Event)> {
        self.pending.pop().map(|p| (p.at, p.event))
    }

    /// Time of the earliest event
    pub fn peek_time(&self) -> Option<Timestamp> {
        self.pending.peek().map(|p| p.at)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("pending", &self.pending.len())
            .field("next_at", &self.peek_time())
            .finish()
    }
}

/// Issues timer handles and tracks which of them may still fire
#[derive(Debug, Default)]
pub struct TimerRegistry {
    live: HashSet<TimerHandle>,
    next_id: u64,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh live handle; ids are never reused
    pub fn issue(&mut self) -> TimerHandle {
        let handle = TimerHandle::new(self.next_id);
        self.next_id += 1;
        self.live.insert(handle);
        handle
    }

    /// Cancel `handle`
    ///
    /// Returns false if the handle had already fired or been cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.live.remove(&handle)
    }

    /// Consume `handle` as it surfaces from the queue
    ///
    /// Returns true if the timer is still live and must be dispatched.
    pub fn fire(&mut self, handle: TimerHandle) -> bool {
        self.live.remove(&handle)
    }

    pub fn is_live(&self, handle: TimerHandle) -> bool {
        self.live.contains(&handle)
    }

    /// Number of timers that may still fire
    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

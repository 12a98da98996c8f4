//! Endpoint and environment contracts
//!
//! The state machines never own a socket or a clock. Everything they need from
//! the outside world (sending packets, arming and cancelling timers, reading
//! virtual time, handing payloads to the application) goes through
//! [`ArqContext`], which the harness implements. The harness in turn drives
//! each state machine through the [`Endpoint`] trait, one event at a time.

use crate::packet::Packet;
use crate::sequence::SeqNumber;
use bytes::Bytes;
use std::fmt;
use std::time::Duration;

/// Handle to a scheduled timer
///
/// Handles are issued by the [`TimerService`] and are never reused within one
/// scheduler, so cancelling a stale handle can never hit a newer timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Wrap a scheduler-assigned timer id
    pub fn new(id: u64) -> Self {
        TimerHandle(id)
    }

    /// Scheduler-assigned timer id
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Unreliable datagram channel to the peer endpoint
///
/// Delivery, ordering and loss are properties of the implementation; the
/// engine assumes none of them.
pub trait Channel {
    /// Hand a packet to the network
    fn send(&mut self, packet: Packet);
}

/// Virtual-time timer service
pub trait TimerService {
    /// Arrange for `on_timeout(seq)` to be dispatched after `delay`
    fn schedule(&mut self, delay: Duration, seq: SeqNumber) -> TimerHandle;

    /// Cancel a timer. Cancelling a fired or already-cancelled handle is a
    /// no-op, and a cancelled timer must never be dispatched.
    fn cancel(&mut self, handle: TimerHandle);
}

/// Everything an endpoint may do while handling an event
pub trait ArqContext: Channel + TimerService {
    /// Current virtual time since the start of the run
    fn now(&self) -> Duration;

    /// Hand an in-order payload to the application layer
    fn deliver(&mut self, seq: SeqNumber, payload: Bytes);

    /// Current virtual time in whole microseconds, as carried in packet
    /// timestamps
    fn now_micros(&self) -> u64 {
        self.now().as_micros().try_into().unwrap_or(u64::MAX)
    }
}

/// An ARQ state machine driven by arrival and timer events
pub trait Endpoint {
    /// Begin operation. Senders start filling their window here.
    fn start(&mut self, ctx: &mut dyn ArqContext);

    /// Tear down: release every outstanding timer. Events arriving after
    /// `stop` are ignored.
    fn stop(&mut self, ctx: &mut dyn ArqContext);

    /// A packet arrived from the channel
    fn on_packet(&mut self, ctx: &mut dyn ArqContext, packet: Packet);

    /// The timer armed for `seq` expired
    fn on_timeout(&mut self, ctx: &mut dyn ArqContext, seq: SeqNumber);

    /// Whether the endpoint has finished its work
    ///
    /// Senders complete once every packet is acknowledged; receivers run until
    /// stopped.
    fn is_complete(&self) -> bool {
        false
    }
}

/// Sender lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// Created, not yet started
    Idle,
    /// Transferring
    Running,
    /// Every packet acknowledged
    Completed,
    /// Stopped before completion
    Stopped,
    /// Gave up after exceeding the retransmission limit
    Aborted,
}

impl SenderState {
    /// Whether the sender still reacts to events
    pub fn is_running(self) -> bool {
        self == SenderState::Running
    }
}

/// Receiver lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Created, not yet started
    Idle,
    /// Accepting packets
    Listening,
    /// Stopped; arrivals are ignored
    Stopped,
}

//! One-way simulated link with scripted impairments
//!
//! A link models a point-to-point channel: each frame is serialized at the
//! link rate behind any frame still on the wire, then propagates for a fixed
//! delay. Losses and extra delays are never random; they are scripted per
//! data sequence or per acknowledged value so that runs are reproducible.

use crate::time::{transmission_time, Timestamp};
use arq_protocol::packet::{Packet, PacketType};
use arq_protocol::sequence::SeqNumber;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Default propagation delay
pub const DEFAULT_DELAY: Duration = Duration::from_millis(10);

/// Default link rate (1 Mbps)
pub const DEFAULT_RATE_BPS: u64 = 1_000_000;

/// Static link characteristics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// One-way propagation delay
    pub delay: Duration,
    /// Link rate in bits per second; zero disables serialization delay
    pub rate_bps: u64,
}

impl LinkConfig {
    pub fn new(delay: Duration, rate_bps: u64) -> Self {
        LinkConfig { delay, rate_bps }
    }

    /// Link with propagation delay only
    pub fn with_delay(delay: Duration) -> Self {
        LinkConfig { delay, rate_bps: 0 }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            delay: DEFAULT_DELAY,
            rate_bps: DEFAULT_RATE_BPS,
        }
    }
}

/// Which packets an impairment applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Data packet carrying this sequence number
    Data(SeqNumber),
    /// Acknowledgement of this value
    Ack(SeqNumber),
}

impl Target {
    fn matches(&self, packet: &Packet) -> bool {
        match (self, packet.packet_type()) {
            (Target::Data(seq), PacketType::Data) | (Target::Ack(seq), PacketType::Ack) => {
                *seq == packet.seq_number()
            }
            _ => false,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Data(seq) => write!(f, "data {}", seq),
            Target::Ack(seq) => write!(f, "ACK {}", seq),
        }
    }
}

/// What an impairment does to a matching packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Lose the packet
    Drop,
    /// Hold the packet back by an extra delay, reordering it behind later
    /// traffic
    Delay(Duration),
}

/// Scripted impairment applied to the next `count` matching transmissions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Impairment {
    pub target: Target,
    pub action: Action,
    /// Matching transmissions still to be affected
    pub count: u32,
}

impl Impairment {
    /// Drop the next `count` transmissions of data packet `seq`
    pub fn drop_data(seq: u32, count: u32) -> Self {
        Impairment {
            target: Target::Data(SeqNumber::new(seq)),
            action: Action::Drop,
            count,
        }
    }

    /// Drop the next `count` acknowledgements of `seq`
    pub fn drop_ack(seq: u32, count: u32) -> Self {
        Impairment {
            target: Target::Ack(SeqNumber::new(seq)),
            action: Action::Drop,
            count,
        }
    }

    /// Delay the next transmission of data packet `seq` by `extra`
    pub fn delay_data(seq: u32, extra: Duration) -> Self {
        Impairment {
            target: Target::Data(SeqNumber::new(seq)),
            action: Action::Delay(extra),
            count: 1,
        }
    }

    /// Delay the next acknowledgement of `seq` by `extra`
    pub fn delay_ack(seq: u32, extra: Duration) -> Self {
        Impairment {
            target: Target::Ack(SeqNumber::new(seq)),
            action: Action::Delay(extra),
            count: 1,
        }
    }
}

/// Per-link counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Frames handed to the link
    pub offered: u64,
    /// Frames put on the wire
    pub carried: u64,
    /// Frames lost to a scripted drop
    pub dropped: u64,
    /// Frames held back by a scripted delay
    pub delayed: u64,
    /// Bytes put on the wire
    pub bytes: u64,
}

/// One direction of the simulated channel
#[derive(Debug, Clone)]
pub struct Link {
    config: LinkConfig,
    impairments: Vec<Impairment>,
    /// When the transmitter finishes the frame currently on the wire
    busy_until: Timestamp,
    stats: LinkStats,
}

impl Link {
    pub fn new(config: LinkConfig) -> Self {
        Link {
            config,
            impairments: Vec::new(),
            busy_until: Timestamp::ZERO,
            stats: LinkStats::default(),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Script an impairment
    pub fn impair(&mut self, impairment: Impairment) {
        if impairment.count > 0 {
            self.impairments.push(impairment);
        }
    }

    /// Impairments not yet used up
    pub fn pending_impairments(&self) -> &[Impairment] {
        &self.impairments
    }

    /// Take the first impairment matching `packet`, consuming one use of it
    fn take_action(&mut self, packet: &Packet) -> Option<Action> {
        let index = self
            .impairments
            .iter()
            .position(|imp| imp.target.matches(packet))?;
        let impairment = &mut self.impairments[index];
        let action = impairment.action;
        impairment.count -= 1;
        if impairment.count == 0 {
            self.impairments.remove(index);
        }
        Some(action)
    }

    /// Offer a frame of `wire_len` bytes at `now`
    ///
    /// Returns the arrival time at the far end, or `None` if the frame is
    /// dropped. A dropped frame never occupies the wire.
    pub fn transmit(&mut self, now: Timestamp, packet: &Packet, wire_len: usize) -> Option<Timestamp> {
        self.stats.offered += 1;

        let extra = match self.take_action(packet) {
            Some(Action::Drop) => {
                self.stats.dropped += 1;
                debug!("link dropped {} {}", packet.packet_type(), packet.seq_number());
                return None;
            }
            Some(Action::Delay(extra)) => {
                self.stats.delayed += 1;
                debug!(
                    "link delaying {} {} by {:?}",
                    packet.packet_type(),
                    packet.seq_number(),
                    extra
                );
                extra
            }
            None => Duration::ZERO,
        };

        let start = now.max(self.busy_until);
        let done = start + transmission_time(wire_len, self.config.rate_bps);
        self.busy_until = done;
        self.stats.carried += 1;
        self.stats.bytes += wire_len as u64;

        Some(done + self.config.delay + extra)
    }
}

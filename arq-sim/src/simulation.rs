//! Deterministic two-endpoint simulation
//!
//! A [`Simulation`] owns one sender endpoint, one receiver endpoint and the
//! world between them: the virtual clock, the event queue, the timer registry
//! and one [`Link`] per direction. Each endpoint sees the world through an
//! [`ArqContext`] bound to its side, so everything it sends goes out on its
//! own link and every timer it arms is dispatched back to it.
//!
//! Runs are fully deterministic: events at the same instant are dispatched in
//! the order they were scheduled, and impairments are scripted.

use crate::link::{Impairment, Link, LinkConfig, LinkStats, Target};
use crate::scheduler::{Event, EventQueue, Side, TimerRegistry};
use crate::time::{Timestamp, VirtualClock};
use arq_protocol::endpoint::{ArqContext, Channel, Endpoint, TimerHandle, TimerService};
use arq_protocol::packet::{Packet, PacketError, PacketType};
use arq_protocol::sequence::SeqNumber;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace};

/// Default sender start time
pub const DEFAULT_SENDER_START: Duration = Duration::from_secs(1);

/// Default end of the run
pub const DEFAULT_STOP_TIME: Duration = Duration::from_secs(20);

/// Simulation errors
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Undecodable packet for {side} at {at}: {source}")]
    Decode {
        side: Side,
        at: Timestamp,
        #[source]
        source: PacketError,
    },

    #[error("Simulation already finished at {0}")]
    Finished(Timestamp),
}

/// Topology and schedule of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
    /// Sender-to-receiver link
    pub forward: LinkConfig,
    /// Receiver-to-sender link
    pub reverse: LinkConfig,
    /// When the sender starts
    pub sender_start: Duration,
    /// When the receiver starts
    pub receiver_start: Duration,
    /// When [`Simulation::run`] stops both endpoints
    pub stop_time: Duration,
}

impl SimConfig {
    /// Same link characteristics in both directions
    pub fn symmetric(link: LinkConfig) -> Self {
        SimConfig {
            forward: link,
            reverse: link,
            ..Self::default()
        }
    }

    pub fn with_sender_start(mut self, start: Duration) -> Self {
        self.sender_start = start;
        self
    }

    pub fn with_stop_time(mut self, stop: Duration) -> Self {
        self.stop_time = stop;
        self
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            forward: LinkConfig::default(),
            reverse: LinkConfig::default(),
            sender_start: DEFAULT_SENDER_START,
            receiver_start: Duration::ZERO,
            stop_time: DEFAULT_STOP_TIME,
        }
    }
}

/// What happened, as recorded in the trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceKind {
    Started,
    Stopped,
    /// Packet put on the link
    Sent { packet_type: PacketType, seq: SeqNumber },
    /// Packet lost to a scripted drop
    Dropped { packet_type: PacketType, seq: SeqNumber },
    /// Packet arrived and was decoded
    Received { packet_type: PacketType, seq: SeqNumber },
    /// Payload handed to the application
    Delivered { seq: SeqNumber },
    /// Retransmission timer dispatched
    TimerFired { seq: SeqNumber },
}

/// One trace record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub at: Timestamp,
    pub side: Side,
    pub kind: TraceKind,
}

/// Payload handed to the application layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub at: Timestamp,
    pub seq: SeqNumber,
    pub payload: Bytes,
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimReport {
    /// Virtual time at which the endpoints were stopped
    pub finished_at: Timestamp,
    /// Whether the sender had every packet acknowledged
    pub sender_complete: bool,
    /// Payloads delivered to the application
    pub delivered: usize,
    /// Events dispatched, excluding cancelled timers
    pub events: u64,
    /// Timer events discarded because they had been cancelled
    pub suppressed_timers: u64,
    pub forward: LinkStats,
    pub reverse: LinkStats,
}

/// Everything between the two endpoints
struct World {
    clock: VirtualClock,
    queue: EventQueue,
    timers: TimerRegistry,
    forward: Link,
    reverse: Link,
    trace: Vec<TraceEvent>,
    delivered: Vec<Delivery>,
}

impl World {
    fn record(&mut self, side: Side, kind: TraceKind) {
        let at = self.clock.now();
        self.trace.push(TraceEvent { at, side, kind });
    }

    fn link_mut(&mut self, from: Side) -> &mut Link {
        match from {
            Side::Sender => &mut self.forward,
            Side::Receiver => &mut self.reverse,
        }
    }
}

/// The world as seen from one endpoint while it handles an event
struct SideContext<'w> {
    world: &'w mut World,
    side: Side,
}

impl Channel for SideContext<'_> {
    fn send(&mut self, packet: Packet) {
        let now = self.world.clock.now();
        let packet_type = packet.packet_type();
        let seq = packet.seq_number();
        let bytes = packet.to_bytes().freeze();

        match self.world.link_mut(self.side).transmit(now, &packet, bytes.len()) {
            Some(arrival) => {
                trace!("{} sent {} {} arriving at {}", self.side, packet_type, seq, arrival);
                self.world.record(self.side, TraceKind::Sent { packet_type, seq });
                self.world.queue.push(
                    arrival,
                    Event::Arrival {
                        to: self.side.peer(),
                        bytes,
                    },
                );
            }
            None => {
                self.world
                    .record(self.side, TraceKind::Dropped { packet_type, seq });
            }
        }
    }
}

impl TimerService for SideContext<'_> {
    fn schedule(&mut self, delay: Duration, seq: SeqNumber) -> TimerHandle {
        let handle = self.world.timers.issue();
        let at = self.world.clock.now() + delay;
        self.world.queue.push(
            at,
            Event::Timer {
                side: self.side,
                handle,
                seq,
            },
        );
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.world.timers.cancel(handle);
    }
}

impl ArqContext for SideContext<'_> {
    fn now(&self) -> Duration {
        self.world.clock.now().as_duration()
    }

    fn deliver(&mut self, seq: SeqNumber, payload: Bytes) {
        let at = self.world.clock.now();
        self.world.record(self.side, TraceKind::Delivered { seq });
        self.world.delivered.push(Delivery { at, seq, payload });
    }
}

/// A sender and a receiver joined by a simulated link pair
pub struct Simulation<S, R> {
    sender: S,
    receiver: R,
    world: World,
    config: SimConfig,
    events: u64,
    suppressed_timers: u64,
    finished: bool,
}

impl<S: Endpoint, R: Endpoint> Simulation<S, R> {
    /// Create a simulation and schedule both endpoint starts
    pub fn new(sender: S, receiver: R, config: SimConfig) -> Self {
        let mut queue = EventQueue::new();
        queue.push(
            Timestamp::from_duration(config.receiver_start),
            Event::Start(Side::Receiver),
        );
        queue.push(
            Timestamp::from_duration(config.sender_start),
            Event::Start(Side::Sender),
        );

        Simulation {
            sender,
            receiver,
            world: World {
                clock: VirtualClock::new(),
                queue,
                timers: TimerRegistry::new(),
                forward: Link::new(config.forward),
                reverse: Link::new(config.reverse),
                trace: Vec::new(),
                delivered: Vec::new(),
            },
            config,
            events: 0,
            suppressed_timers: 0,
            finished: false,
        }
    }

    /// Script an impairment
    ///
    /// Data impairments apply to the forward link, acknowledgement
    /// impairments to the reverse link.
    pub fn impair(&mut self, impairment: Impairment) {
        match impairment.target {
            Target::Data(_) => self.world.forward.impair(impairment),
            Target::Ack(_) => self.world.reverse.impair(impairment),
        }
    }

    /// Stop `side` at `at`, ahead of the end of the run
    pub fn schedule_stop(&mut self, side: Side, at: Duration) {
        self.world
            .queue
            .push(Timestamp::from_duration(at), Event::Stop(side));
    }

    /// Run until the configured stop time
    pub fn run(&mut self) -> Result<SimReport, SimError> {
        let deadline = Timestamp::from_duration(self.config.stop_time);
        self.run_until(deadline)
    }

    /// Dispatch events up to and including `deadline` and leave the
    /// endpoints running
    ///
    /// The clock is left at the last dispatched event.
    pub fn step_until(&mut self, deadline: Timestamp) -> Result<(), SimError> {
        if self.finished {
            return Err(SimError::Finished(self.world.clock.now()));
        }
        while let Some(at) = self.world.queue.peek_time() {
            if at > deadline {
                break;
            }
            let Some((at, event)) = self.world.queue.pop() else {
                break;
            };
            self.world.clock.advance_to(at);
            self.dispatch(event)?;
        }
        Ok(())
    }

    /// Dispatch events up to and including `deadline`, then stop both
    /// endpoints
    ///
    /// The run ends early when the queue drains. A simulation can only be
    /// run once.
    pub fn run_until(&mut self, deadline: Timestamp) -> Result<SimReport, SimError> {
        info!("simulation running until {}", deadline);
        self.step_until(deadline)?;

        self.finished = true;
        self.dispatch(Event::Stop(Side::Sender))?;
        self.dispatch(Event::Stop(Side::Receiver))?;

        let report = self.report();
        info!(
            "simulation finished at {}: sender complete {}, {} delivered, {} events",
            report.finished_at, report.sender_complete, report.delivered, report.events
        );
        Ok(report)
    }

    fn dispatch(&mut self, event: Event) -> Result<(), SimError> {
        match event {
            Event::Start(side) => {
                debug!("{} starting at {}", side, self.world.clock.now());
                self.world.record(side, TraceKind::Started);
                self.with_endpoint(side, |endpoint, ctx| endpoint.start(ctx));
            }
            Event::Stop(side) => {
                debug!("{} stopping at {}", side, self.world.clock.now());
                self.world.record(side, TraceKind::Stopped);
                self.with_endpoint(side, |endpoint, ctx| endpoint.stop(ctx));
            }
            Event::Arrival { to, bytes } => {
                let packet = Packet::from_bytes(&bytes).map_err(|source| SimError::Decode {
                    side: to,
                    at: self.world.clock.now(),
                    source,
                })?;
                self.world.record(
                    to,
                    TraceKind::Received {
                        packet_type: packet.packet_type(),
                        seq: packet.seq_number(),
                    },
                );
                self.with_endpoint(to, |endpoint, ctx| endpoint.on_packet(ctx, packet));
            }
            Event::Timer { side, handle, seq } => {
                if !self.world.timers.fire(handle) {
                    trace!("{} discarding cancelled {} for seq {}", side, handle, seq);
                    self.suppressed_timers += 1;
                    return Ok(());
                }
                self.world.record(side, TraceKind::TimerFired { seq });
                self.with_endpoint(side, |endpoint, ctx| endpoint.on_timeout(ctx, seq));
            }
        }
        self.events += 1;
        Ok(())
    }

    fn with_endpoint<F>(&mut self, side: Side, f: F)
    where
        F: FnOnce(&mut dyn Endpoint, &mut dyn ArqContext),
    {
        let mut ctx = SideContext {
            world: &mut self.world,
            side,
        };
        match side {
            Side::Sender => f(&mut self.sender, &mut ctx),
            Side::Receiver => f(&mut self.receiver, &mut ctx),
        }
    }

    fn report(&self) -> SimReport {
        SimReport {
            finished_at: self.world.clock.now(),
            sender_complete: self.sender.is_complete(),
            delivered: self.world.delivered.len(),
            events: self.events,
            suppressed_timers: self.suppressed_timers,
            forward: *self.world.forward.stats(),
            reverse: *self.world.reverse.stats(),
        }
    }
}

impl<S, R> Simulation<S, R> {
    pub fn sender(&self) -> &S {
        &self.sender
    }

    pub fn receiver(&self) -> &R {
        &self.receiver
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Current virtual time
    pub fn now(&self) -> Timestamp {
        self.world.clock.now()
    }

    /// Payloads handed to the application, in delivery order
    pub fn delivered(&self) -> &[Delivery] {
        &self.world.delivered
    }

    /// Sequence numbers handed to the application, in delivery order
    pub fn delivered_seqs(&self) -> Vec<u32> {
        self.world.delivered.iter().map(|d| d.seq.as_raw()).collect()
    }

    /// Everything that happened so far
    pub fn trace(&self) -> &[TraceEvent] {
        &self.world.trace
    }

    /// Times at which data packet `seq` was handed to the link, dropped or not
    pub fn data_transmissions(&self, seq: u32) -> Vec<Timestamp> {
        let seq = SeqNumber::new(seq);
        self.world
            .trace
            .iter()
            .filter(|e| match &e.kind {
                TraceKind::Sent { packet_type, seq: s }
                | TraceKind::Dropped { packet_type, seq: s } => {
                    *packet_type == PacketType::Data && *s == seq
                }
                _ => false,
            })
            .map(|e| e.at)
            .collect()
    }

    /// Timers that may still fire
    pub fn live_timers(&self) -> usize {
        self.world.timers.live_count()
    }

    pub fn forward_link(&self) -> &Link {
        &self.world.forward
    }

    pub fn reverse_link(&self) -> &Link {
        &self.world.reverse
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arq_protocol::packet::{AckPacket, DataPacket};

    /// Sends one data packet on start and acknowledges whatever arrives
    #[derive(Default)]
    struct Probe {
        packets: Vec<(Duration, Packet)>,
        timeouts: Vec<(Duration, SeqNumber)>,
        send_on_start: bool,
        ack_on_data: bool,
        timer: Option<(Duration, bool)>,
        started: bool,
        stopped: bool,
    }

    impl Endpoint for Probe {
        fn start(&mut self, ctx: &mut dyn ArqContext) {
            self.started = true;
            if self.send_on_start {
                let payload = Bytes::from_static(b"hi");
                let packet = DataPacket::new(SeqNumber::new(0), Some(ctx.now_micros()), payload);
                ctx.send(packet.into());
            }
            if let Some((delay, cancel)) = self.timer {
                let handle = ctx.schedule(delay, SeqNumber::new(0));
                if cancel {
                    ctx.cancel(handle);
                    ctx.cancel(handle);
                }
            }
        }

        fn stop(&mut self, _ctx: &mut dyn ArqContext) {
            self.stopped = true;
        }

        fn on_packet(&mut self, ctx: &mut dyn ArqContext, packet: Packet) {
            self.packets.push((ctx.now(), packet.clone()));
            if let Packet::Data(data) = packet {
                ctx.deliver(data.seq_number(), data.payload.clone());
                if self.ack_on_data {
                    ctx.send(AckPacket::new(data.seq_number(), data.timestamp()).into());
                }
            }
        }

        fn on_timeout(&mut self, ctx: &mut dyn ArqContext, seq: SeqNumber) {
            self.timeouts.push((ctx.now(), seq));
        }
    }

    fn config() -> SimConfig {
        SimConfig::symmetric(LinkConfig::with_delay(Duration::from_millis(10)))
    }

    #[test]
    fn test_packets_cross_link_with_delay() {
        let sender = Probe {
            send_on_start: true,
            ..Default::default()
        };
        let receiver = Probe {
            ack_on_data: true,
            ..Default::default()
        };
        let mut sim = Simulation::new(sender, receiver, config());
        let report = sim.run().unwrap();

        assert_eq!(sim.receiver().packets.len(), 1);
        assert_eq!(sim.receiver().packets[0].0, Duration::from_millis(1010));
        assert_eq!(sim.sender().packets.len(), 1);
        assert_eq!(sim.sender().packets[0].0, Duration::from_millis(1020));
        assert_eq!(sim.delivered_seqs(), vec![0]);
        assert_eq!(sim.delivered()[0].payload, Bytes::from_static(b"hi"));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.forward.carried, 1);
        assert_eq!(report.reverse.carried, 1);
    }

    #[test]
    fn test_run_ends_when_queue_drains() {
        let mut sim = Simulation::new(Probe::default(), Probe::default(), config());
        let report = sim.run().unwrap();

        assert_eq!(report.finished_at, Timestamp::from_duration(DEFAULT_SENDER_START));
        assert!(sim.sender().started && sim.sender().stopped);
        assert!(sim.receiver().started && sim.receiver().stopped);
        assert!(matches!(sim.run(), Err(SimError::Finished(_))));
    }

    #[test]
    fn test_timer_fires_once() {
        let sender = Probe {
            timer: Some((Duration::from_secs(2), false)),
            ..Default::default()
        };
        let mut sim = Simulation::new(sender, Probe::default(), config());
        sim.run().unwrap();

        assert_eq!(
            sim.sender().timeouts,
            vec![(Duration::from_secs(3), SeqNumber::new(0))]
        );
        assert_eq!(sim.live_timers(), 0);
    }

    #[test]
    fn test_cancelled_timer_suppressed() {
        let sender = Probe {
            timer: Some((Duration::from_secs(2), true)),
            ..Default::default()
        };
        let mut sim = Simulation::new(sender, Probe::default(), config());
        let report = sim.run().unwrap();

        assert!(sim.sender().timeouts.is_empty());
        assert_eq!(report.suppressed_timers, 1);
    }

    #[test]
    fn test_deadline_cuts_run_short() {
        let sender = Probe {
            send_on_start: true,
            ..Default::default()
        };
        let mut sim = Simulation::new(sender, Probe::default(), config());
        let report = sim
            .run_until(Timestamp::from_duration(Duration::from_millis(1005)))
            .unwrap();

        assert!(sim.receiver().packets.is_empty());
        assert_eq!(report.finished_at, Timestamp::from_duration(DEFAULT_SENDER_START));
    }

    #[test]
    fn test_step_leaves_endpoints_running() {
        let sender = Probe {
            send_on_start: true,
            ..Default::default()
        };
        let mut sim = Simulation::new(sender, Probe::default(), config());

        sim.step_until(Timestamp::from_duration(Duration::from_millis(1005)))
            .unwrap();
        assert!(sim.sender().started && !sim.sender().stopped);
        assert!(sim.receiver().packets.is_empty());

        sim.step_until(Timestamp::from_duration(Duration::from_millis(1010)))
            .unwrap();
        assert_eq!(sim.receiver().packets.len(), 1);
        assert_eq!(sim.now(), Timestamp::from_duration(Duration::from_millis(1010)));
    }

    #[test]
    fn test_scripted_drop_recorded() {
        let sender = Probe {
            send_on_start: true,
            ..Default::default()
        };
        let mut sim = Simulation::new(sender, Probe::default(), config());
        sim.impair(Impairment::drop_data(0, 1));
        sim.run().unwrap();

        assert!(sim.receiver().packets.is_empty());
        assert_eq!(sim.data_transmissions(0).len(), 1);
        assert!(sim.trace().iter().any(|e| matches!(
            e.kind,
            TraceKind::Dropped {
                packet_type: PacketType::Data,
                ..
            }
        )));
    }
}

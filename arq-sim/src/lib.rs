//! ARQ Simulation Harness
//!
//! This crate drives the protocol endpoints in virtual time: a clock, a
//! discrete-event queue, a timer registry and a pair of one-way links with
//! scripted losses and delays. Runs are single-threaded and deterministic.

pub mod link;
pub mod scheduler;
pub mod simulation;
pub mod time;

pub use link::{Action, Impairment, Link, LinkConfig, LinkStats, Target};
pub use scheduler::{Event, EventQueue, Side, TimerRegistry};
pub use simulation::{
    Delivery, SimConfig, SimError, SimReport, Simulation, TraceEvent, TraceKind,
};
pub use time::{Timestamp, VirtualClock};

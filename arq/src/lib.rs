//! ARQ - sliding-window Automatic Repeat reQuest
//!
//! High-level Rust API for the Go-Back-N and Selective-Repeat engines and the
//! deterministic simulator that drives them.

pub use arq_protocol as protocol;
pub use arq_sim as sim;

// Re-export commonly used types
pub use protocol::{
    ArqConfig, ArqContext, Endpoint, GbnReceiver, GbnSender, Packet, PacketType, SeqNumber,
    SrReceiver, SrSender,
};
pub use sim::{Impairment, LinkConfig, SimConfig, Simulation};

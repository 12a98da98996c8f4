//! ARQ Protocol Core Implementation
//!
//! This crate implements the sliding-window automatic repeat request engines,
//! Go-Back-N and Selective-Repeat, as event-driven state machines. It contains
//! the packet codec, sequence numbers, send window, retransmission timer
//! bookkeeping and the sender and receiver endpoints.
//!
//! Endpoints never touch a socket or a wall clock: the environment is supplied
//! through [`ArqContext`] by whatever drives them, typically the
//! deterministic simulator in `arq-sim`.

pub mod buffer;
pub mod config;
pub mod endpoint;
pub mod go_back_n;
pub mod packet;
pub mod selective_repeat;
pub mod sequence;
pub mod stats;
pub mod timers;
pub mod window;

mod sender;

#[cfg(test)]
mod mock;

pub use buffer::{ReorderBuffer, SendBuffer};
pub use config::{ArqConfig, ConfigError};
pub use endpoint::{
    ArqContext, Channel, Endpoint, ReceiverState, SenderState, TimerHandle, TimerService,
};
pub use go_back_n::{GbnReceiver, GbnSender};
pub use packet::{AckPacket, DataPacket, Packet, PacketError, PacketHeader, PacketType};
pub use selective_repeat::{SrReceiver, SrSender};
pub use sequence::SeqNumber;
pub use stats::{ReceiverStats, RttEstimator, SenderStats};
pub use timers::TimerTable;
pub use window::SendWindow;

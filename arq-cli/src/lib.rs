//! ARQ CLI Library
//!
//! Shared functionality for the ARQ command-line tools: TOML configuration,
//! running a simulated transfer and printing its statistics.

pub mod config;
pub mod runner;
pub mod stats;

pub use config::{Config, ConfigError, DelayRule, DropRule, Protocol};
pub use runner::{run, RunError, TransferSummary};
pub use stats::{display_summary, format_bandwidth, format_bytes, format_micros};

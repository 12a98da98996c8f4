//! ARQ Transfer - simulated Go-Back-N / Selective-Repeat transfer
//!
//! Runs one transfer over a simulated link with scripted losses and prints
//! the resulting statistics.

use arq_cli::config::{Config, DropRule, Protocol};
use arq_cli::{display_summary, run};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "arq-transfer")]
#[command(about = "Simulated sliding-window ARQ transfer", long_about = None)]
struct Args {
    /// TOML configuration file; command-line options override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// ARQ variant
    #[arg(short, long, value_enum)]
    protocol: Option<Protocol>,

    /// Window size in packets
    #[arg(short, long)]
    window: Option<u32>,

    /// Retransmission timeout in milliseconds
    #[arg(short, long)]
    timeout_ms: Option<u64>,

    /// Payload bytes per packet
    #[arg(long)]
    packet_size: Option<usize>,

    /// Number of packets to transfer
    #[arg(short = 'n', long)]
    packets: Option<u32>,

    /// Give up after this many retransmissions of one packet
    #[arg(long)]
    max_retransmissions: Option<u32>,

    /// One-way link delay in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Link rate in bits per second (0 = unlimited)
    #[arg(long)]
    rate_bps: Option<u64>,

    /// Drop data packet SEQ (SEQ or SEQ:COUNT, repeatable)
    #[arg(long = "drop", value_name = "SEQ[:COUNT]")]
    drops: Vec<DropRule>,

    /// Drop acknowledgements of SEQ (SEQ or SEQ:COUNT, repeatable)
    #[arg(long = "drop-ack", value_name = "SEQ[:COUNT]")]
    drop_acks: Vec<DropRule>,

    /// Sender start time in milliseconds
    #[arg(long)]
    start_ms: Option<u64>,

    /// End of the run in milliseconds
    #[arg(long)]
    stop_ms: Option<u64>,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Apply command-line overrides on top of `config`
    fn apply(self, mut config: Config) -> Config {
        let t = &mut config.transfer;
        if let Some(protocol) = self.protocol {
            t.protocol = protocol;
        }
        if let Some(window) = self.window {
            t.window_size = window;
        }
        if let Some(timeout) = self.timeout_ms {
            t.timeout_ms = timeout;
        }
        if let Some(size) = self.packet_size {
            t.packet_size = size;
        }
        if let Some(count) = self.packets {
            t.packet_count = count;
        }
        if self.max_retransmissions.is_some() {
            t.max_retransmissions = self.max_retransmissions;
        }
        if let Some(delay) = self.delay_ms {
            config.link.delay_ms = delay;
        }
        if let Some(rate) = self.rate_bps {
            config.link.rate_bps = rate;
        }
        if let Some(start) = self.start_ms {
            config.schedule.sender_start_ms = start;
        }
        if let Some(stop) = self.stop_ms {
            config.schedule.stop_ms = stop;
        }
        config.drops.extend(self.drops);
        config
            .drops
            .extend(self.drop_acks.into_iter().map(|rule| DropRule { ack: true, ..rule }));
        config
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let base = match &args.config {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            Config::from_file(path)?
        }
        None => Config::default(),
    };
    let dump = args.dump_config.clone();
    let config = args.apply(base);

    if let Some(path) = dump {
        config.to_file(&path)?;
        tracing::info!("Configuration written to {}", path.display());
        return Ok(());
    }

    let summary = run(&config)?;
    display_summary(&summary);

    if !summary.delivered_intact {
        anyhow::bail!(
            "Transfer incomplete: {} of {} packets delivered",
            summary.receiver.packets_delivered,
            summary.packet_count
        );
    }
    Ok(())
}

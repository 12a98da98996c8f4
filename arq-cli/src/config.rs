//! Configuration file support for the ARQ transfer tool

use arq_protocol::config::{
    ArqConfig, ConfigError as ArqConfigError, DEFAULT_PACKET_COUNT, DEFAULT_PACKET_SIZE,
    DEFAULT_TIMEOUT, DEFAULT_WINDOW_SIZE,
};
use arq_protocol::sequence::MAX_SEQ_NUMBER;
use arq_sim::link::{Impairment, LinkConfig, DEFAULT_DELAY, DEFAULT_RATE_BPS};
use arq_sim::simulation::{SimConfig, DEFAULT_SENDER_START, DEFAULT_STOP_TIME};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Largest transfer the tool will simulate
///
/// Every payload is held in memory for the whole run.
pub const MAX_PACKET_COUNT: u32 = 100_000;

/// ARQ variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Go-Back-N
    Gbn,
    /// Selective-Repeat
    Sr,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Gbn => write!(f, "Go-Back-N"),
            Protocol::Sr => write!(f, "Selective-Repeat"),
        }
    }
}

/// Transfer parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub protocol: Protocol,
    /// Maximum packets in flight
    pub window_size: u32,
    /// Retransmission timeout in milliseconds
    pub timeout_ms: u64,
    /// Payload bytes per packet
    pub packet_size: usize,
    /// Packets in the transfer
    pub packet_count: u32,
    /// Give up after this many retransmissions of one packet
    pub max_retransmissions: Option<u32>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            protocol: Protocol::Gbn,
            window_size: DEFAULT_WINDOW_SIZE,
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            packet_size: DEFAULT_PACKET_SIZE,
            packet_count: DEFAULT_PACKET_COUNT,
            max_retransmissions: None,
        }
    }
}

/// Link characteristics, applied to both directions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// One-way propagation delay in milliseconds
    pub delay_ms: u64,
    /// Link rate in bits per second (0 = unlimited)
    pub rate_bps: u64,
}

impl Default for LinkSettings {
    fn default() -> Self {
        LinkSettings {
            delay_ms: DEFAULT_DELAY.as_millis() as u64,
            rate_bps: DEFAULT_RATE_BPS,
        }
    }
}

/// Run schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Sender start time in milliseconds
    pub sender_start_ms: u64,
    /// Receiver start time in milliseconds
    pub receiver_start_ms: u64,
    /// End of the run in milliseconds
    pub stop_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig {
            sender_start_ms: DEFAULT_SENDER_START.as_millis() as u64,
            receiver_start_ms: 0,
            stop_ms: DEFAULT_STOP_TIME.as_millis() as u64,
        }
    }
}

/// Scripted loss: drop the next `count` transmissions of `seq`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropRule {
    pub seq: u32,
    #[serde(default = "default_count")]
    pub count: u32,
    /// Apply to acknowledgements of `seq` instead of data
    #[serde(default)]
    pub ack: bool,
}

fn default_count() -> u32 {
    1
}

fn check_seq(seq: u32) -> Result<(), String> {
    if seq > MAX_SEQ_NUMBER {
        return Err(format!(
            "sequence number {} exceeds maximum {}",
            seq, MAX_SEQ_NUMBER
        ));
    }
    Ok(())
}

impl DropRule {
    fn impairment(&self) -> Result<Impairment, ConfigError> {
        check_seq(self.seq).map_err(ConfigError::Invalid)?;
        Ok(if self.ack {
            Impairment::drop_ack(self.seq, self.count)
        } else {
            Impairment::drop_data(self.seq, self.count)
        })
    }
}

/// Parses `SEQ` or `SEQ:COUNT`
impl FromStr for DropRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (seq, count) = match s.split_once(':') {
            Some((seq, count)) => (seq, count),
            None => (s, "1"),
        };
        let seq = seq
            .trim()
            .parse()
            .map_err(|e| format!("invalid sequence number '{}': {}", seq, e))?;
        check_seq(seq)?;
        let count = count
            .trim()
            .parse()
            .map_err(|e| format!("invalid drop count '{}': {}", count, e))?;
        Ok(DropRule {
            seq,
            count,
            ack: false,
        })
    }
}

/// Scripted reordering: hold the next transmission of `seq` back by
/// `extra_ms`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRule {
    pub seq: u32,
    pub extra_ms: u64,
    #[serde(default)]
    pub ack: bool,
}

impl DelayRule {
    fn impairment(&self) -> Result<Impairment, ConfigError> {
        check_seq(self.seq).map_err(ConfigError::Invalid)?;
        let extra = Duration::from_millis(self.extra_ms);
        Ok(if self.ack {
            Impairment::delay_ack(self.seq, extra)
        } else {
            Impairment::delay_data(self.seq, extra)
        })
    }
}

/// Complete run configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transfer: TransferConfig,
    pub link: LinkSettings,
    pub schedule: ScheduleConfig,
    pub drops: Vec<DropRule>,
    pub delays: Vec<DelayRule>,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Go-Back-N with packet 2 lost once
    pub fn example() -> Self {
        Config {
            drops: vec![DropRule {
                seq: 2,
                count: 1,
                ack: false,
            }],
            ..Config::default()
        }
    }

    /// Engine configuration, validated
    pub fn arq_config(&self) -> Result<ArqConfig, ConfigError> {
        let t = &self.transfer;
        if t.packet_count > MAX_PACKET_COUNT {
            return Err(ConfigError::Invalid(format!(
                "packet count {} exceeds maximum {}",
                t.packet_count, MAX_PACKET_COUNT
            )));
        }
        let mut config = ArqConfig::new(t.window_size, Duration::from_millis(t.timeout_ms))
            .with_packet_size(t.packet_size)
            .with_packet_count(t.packet_count);
        if let Some(limit) = t.max_retransmissions {
            config = config.with_max_retransmissions(limit);
        }
        config.validate()?;
        Ok(config)
    }

    /// Simulator topology and schedule
    pub fn sim_config(&self) -> Result<SimConfig, ConfigError> {
        let s = &self.schedule;
        if s.stop_ms < s.sender_start_ms {
            return Err(ConfigError::Invalid(format!(
                "stop time {}ms is before sender start {}ms",
                s.stop_ms, s.sender_start_ms
            )));
        }
        let link = LinkConfig::new(Duration::from_millis(self.link.delay_ms), self.link.rate_bps);
        Ok(SimConfig {
            forward: link,
            reverse: link,
            sender_start: Duration::from_millis(s.sender_start_ms),
            receiver_start: Duration::from_millis(s.receiver_start_ms),
            stop_time: Duration::from_millis(s.stop_ms),
        })
    }

    /// Scripted impairments, drops first
    pub fn impairments(&self) -> Result<Vec<Impairment>, ConfigError> {
        self.drops
            .iter()
            .map(DropRule::impairment)
            .chain(self.delays.iter().map(DelayRule::impairment))
            .collect()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid transfer parameters: {0}")]
    Transfer(#[from] ArqConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

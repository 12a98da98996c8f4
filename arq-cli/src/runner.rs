//! Run one simulated transfer from a [`Config`]

use crate::config::{Config, ConfigError, Protocol};
use arq_protocol::endpoint::{Endpoint, SenderState};
use arq_protocol::go_back_n::{GbnReceiver, GbnSender};
use arq_protocol::selective_repeat::{SrReceiver, SrSender};
use arq_protocol::stats::{ReceiverStats, SenderStats};
use arq_protocol::ConfigError as ArqConfigError;
use arq_sim::simulation::{Delivery, SimError, SimReport, Simulation};
use arq_sim::time::Timestamp;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Transfer errors
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid transfer parameters: {0}")]
    Transfer(#[from] ArqConfigError),

    #[error("Simulation failed: {0}")]
    Sim(#[from] SimError),
}

/// Outcome of one transfer
#[derive(Debug, Clone)]
pub struct TransferSummary {
    pub protocol: Protocol,
    pub packet_count: u32,
    /// Configured retransmission timeout
    pub timeout: Duration,
    /// When the sender started transmitting
    pub sender_start: Duration,
    pub report: SimReport,
    pub sender_state: SenderState,
    pub sender: SenderStats,
    pub receiver: ReceiverStats,
    /// Every packet delivered exactly once, in order, with its original bytes
    pub delivered_intact: bool,
    /// When the last payload reached the application
    pub last_delivery: Option<Timestamp>,
}

/// Payload for packet `index`: `size` bytes of the low byte of `index`
///
/// Distinct per packet so that delivery order and content can be checked.
pub fn payload_for(index: u32, size: usize) -> Bytes {
    Bytes::from(vec![index as u8; size])
}

fn payloads(count: u32, size: usize) -> Vec<Bytes> {
    (0..count).map(|i| payload_for(i, size)).collect()
}

fn delivered_intact(delivered: &[Delivery], count: u32, size: usize) -> bool {
    delivered.len() == count as usize
        && delivered
            .iter()
            .zip(0..count)
            .all(|(d, i)| d.seq.as_raw() == i && d.payload == payload_for(i, size))
}

fn simulate<S, R>(
    sender: S,
    receiver: R,
    config: &Config,
) -> Result<(Simulation<S, R>, SimReport), RunError>
where
    S: Endpoint,
    R: Endpoint,
{
    let impairments = config.impairments()?;
    let mut sim = Simulation::new(sender, receiver, config.sim_config()?);
    for impairment in impairments {
        sim.impair(impairment);
    }
    let report = sim.run()?;
    Ok((sim, report))
}

/// Run the transfer described by `config`
pub fn run(config: &Config) -> Result<TransferSummary, RunError> {
    let arq = config.arq_config()?;
    let protocol = config.transfer.protocol;
    let data = payloads(arq.packet_count, arq.packet_size);

    info!(
        "{} transfer: {} packets of {} bytes, window {}, timeout {:?}",
        protocol, arq.packet_count, arq.packet_size, arq.window_size, arq.timeout
    );

    let (report, sender_state, sender, receiver, delivered) = match protocol {
        Protocol::Gbn => {
            let sender = GbnSender::with_payloads(arq, data)?;
            let (sim, report) = simulate(sender, GbnReceiver::new(), config)?;
            (
                report,
                sim.sender().state(),
                sim.sender().stats().clone(),
                sim.receiver().stats().clone(),
                sim.delivered().to_vec(),
            )
        }
        Protocol::Sr => {
            let sender = SrSender::with_payloads(arq, data)?;
            let (sim, report) = simulate(sender, SrReceiver::new(), config)?;
            (
                report,
                sim.sender().state(),
                sim.sender().stats().clone(),
                sim.receiver().stats().clone(),
                sim.delivered().to_vec(),
            )
        }
    };

    Ok(TransferSummary {
        protocol,
        packet_count: arq.packet_count,
        timeout: arq.timeout,
        sender_start: Duration::from_millis(config.schedule.sender_start_ms),
        report,
        sender_state,
        sender,
        receiver,
        delivered_intact: delivered_intact(&delivered, arq.packet_count, arq.packet_size),
        last_delivery: delivered.last().map(|d| d.at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DropRule;

    #[test]
    fn test_default_transfer_completes() {
        for protocol in [Protocol::Gbn, Protocol::Sr] {
            let mut config = Config::default();
            config.transfer.protocol = protocol;

            let summary = run(&config).unwrap();
            assert_eq!(summary.sender_state, SenderState::Completed);
            assert!(summary.delivered_intact);
            assert_eq!(summary.sender.packets_retransmitted, 0);
        }
    }

    #[test]
    fn test_example_recovers_from_loss() {
        for protocol in [Protocol::Gbn, Protocol::Sr] {
            let mut config = Config::example();
            config.transfer.protocol = protocol;

            let summary = run(&config).unwrap();
            assert!(summary.report.sender_complete, "{} did not complete", protocol);
            assert!(summary.delivered_intact);
            assert!(summary.sender.timeouts >= 1);
            assert_eq!(summary.report.forward.dropped, 1);
        }
    }

    #[test]
    fn test_retry_limit_aborts_transfer() {
        let mut config = Config::default();
        config.transfer.max_retransmissions = Some(1);
        config.drops.push(DropRule {
            seq: 0,
            count: 5,
            ack: false,
        });

        let summary = run(&config).unwrap();
        assert_eq!(summary.sender_state, SenderState::Aborted);
        assert!(!summary.delivered_intact);
        assert!(summary.last_delivery.is_none());
    }

    #[test]
    fn test_out_of_range_drop_reported_as_error() {
        let mut config = Config::default();
        config.drops.push(DropRule {
            seq: 1_073_741_824,
            count: 1,
            ack: false,
        });
        assert!(matches!(
            run(&config),
            Err(RunError::Config(ConfigError::Invalid(_)))
        ));
    }

    #[test]
    fn test_oversized_transfer_rejected() {
        let mut config = Config::default();
        config.transfer.packet_count = 1_000_000_000;
        assert!(matches!(
            run(&config),
            Err(RunError::Config(ConfigError::Invalid(_)))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.transfer.timeout_ms = 0;
        assert!(matches!(run(&config), Err(RunError::Config(_))));
    }
}

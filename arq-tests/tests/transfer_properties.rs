//! Property-based tests for complete transfers
//!
//! Random window sizes, transfer lengths and scripted impairments. Whatever
//! the link does, every transfer must complete, deliver each packet exactly
//! once in order, and never exceed the window.

use arq_protocol::packet::PacketType;
use arq_protocol::{ArqConfig, Endpoint, GbnReceiver, GbnSender, SrReceiver, SrSender};
use arq_sim::{
    Impairment, LinkConfig, Side, SimConfig, Simulation, TraceEvent, TraceKind,
};
use bytes::Bytes;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
enum Mode {
    GoBackN,
    SelectiveRepeat,
}

fn mode_strategy() -> impl Strategy<Value = Mode> {
    prop_oneof![Just(Mode::GoBackN), Just(Mode::SelectiveRepeat)]
}

fn impairment_strategy() -> impl Strategy<Value = Impairment> {
    prop_oneof![
        3 => (0u32..20, 1u32..=3).prop_map(|(seq, n)| Impairment::drop_data(seq, n)),
        2 => (0u32..20, 1u32..=2).prop_map(|(seq, n)| Impairment::drop_ack(seq, n)),
        1 => (0u32..20, 1u64..3000)
            .prop_map(|(seq, ms)| Impairment::delay_data(seq, Duration::from_millis(ms))),
        1 => (0u32..20, 1u64..3000)
            .prop_map(|(seq, ms)| Impairment::delay_ack(seq, Duration::from_millis(ms))),
    ]
}

fn payloads(count: u32) -> Vec<Bytes> {
    (0..count).map(|i| Bytes::from(vec![i as u8; 64])).collect()
}

/// Check that every data transmission stays inside the window implied by
/// the acknowledgements the sender had seen at that point
fn check_window_bound(trace: &[TraceEvent], window: u32, mode: Mode) -> Result<(), TestCaseError> {
    let mut base = 0u32;
    let mut acked = BTreeSet::new();

    for event in trace.iter().filter(|e| e.side == Side::Sender) {
        match event.kind {
            TraceKind::Received {
                packet_type: PacketType::Ack,
                seq,
            } => match mode {
                Mode::GoBackN => base = base.max(seq.as_raw() + 1),
                Mode::SelectiveRepeat => {
                    acked.insert(seq.as_raw());
                    while acked.contains(&base) {
                        base += 1;
                    }
                }
            },
            TraceKind::Sent {
                packet_type: PacketType::Data,
                seq,
            }
            | TraceKind::Dropped {
                packet_type: PacketType::Data,
                seq,
            } => {
                prop_assert!(
                    seq.as_raw() < base + window,
                    "seq {} sent with base {} and window {} at {}",
                    seq,
                    base,
                    window,
                    event.at
                );
            }
            _ => {}
        }
    }
    Ok(())
}

fn check_transfer<S: Endpoint, R: Endpoint>(
    mut sim: Simulation<S, R>,
    impairments: &[Impairment],
    window: u32,
    count: u32,
    mode: Mode,
) -> Result<(), TestCaseError> {
    for impairment in impairments {
        sim.impair(*impairment);
    }
    let report = sim.run().unwrap();

    prop_assert!(report.sender_complete, "transfer did not complete: {:?}", report);
    prop_assert_eq!(sim.delivered_seqs(), (0..count).collect::<Vec<_>>());
    let delivered: Vec<_> = sim.delivered().iter().map(|d| d.payload.clone()).collect();
    prop_assert_eq!(delivered, payloads(count));
    prop_assert_eq!(sim.live_timers(), 0);
    check_window_bound(sim.trace(), window, mode)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_transfer_completes_in_order(
        mode in mode_strategy(),
        window in 1u32..=6,
        count in 1u32..=20,
        impairments in prop::collection::vec(impairment_strategy(), 0..6),
    ) {
        let config = ArqConfig::new(window, Duration::from_secs(2))
            .with_packet_count(count)
            .with_packet_size(64);
        let sim_config = SimConfig::symmetric(LinkConfig::default())
            .with_stop_time(Duration::from_secs(600));

        match mode {
            Mode::GoBackN => {
                let sender = GbnSender::with_payloads(config, payloads(count)).unwrap();
                let sim = Simulation::new(sender, GbnReceiver::new(), sim_config);
                check_transfer(sim, &impairments, window, count, mode)?;
            }
            Mode::SelectiveRepeat => {
                let sender = SrSender::with_payloads(config, payloads(count)).unwrap();
                let sim = Simulation::new(sender, SrReceiver::new(), sim_config);
                check_transfer(sim, &impairments, window, count, mode)?;
            }
        }
    }

    #[test]
    fn prop_lossless_transfer_never_retransmits(
        window in 1u32..=8,
        count in 1u32..=30,
    ) {
        let config = ArqConfig::new(window, Duration::from_secs(2))
            .with_packet_count(count)
            .with_packet_size(64);

        let sender = GbnSender::with_payloads(config, payloads(count)).unwrap();
        let mut gbn = Simulation::new(sender, GbnReceiver::new(), SimConfig::default());
        gbn.run().unwrap();
        prop_assert_eq!(gbn.sender().stats().packets_retransmitted, 0);
        prop_assert_eq!(gbn.sender().stats().packets_sent, count as u64);

        let sender = SrSender::with_payloads(config, payloads(count)).unwrap();
        let mut sr = Simulation::new(sender, SrReceiver::new(), SimConfig::default());
        sr.run().unwrap();
        prop_assert_eq!(sr.sender().stats().packets_retransmitted, 0);
        prop_assert_eq!(sr.receiver().stats().out_of_order, 0);
    }
}

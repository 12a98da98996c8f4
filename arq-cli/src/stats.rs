//! Statistics display and formatting

use crate::runner::TransferSummary;
use arq_sim::link::LinkStats;
use std::time::Duration;

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format bandwidth in human-readable form
pub fn format_bandwidth(bps: u64) -> String {
    const KBPS: u64 = 1000;
    const MBPS: u64 = KBPS * 1000;
    const GBPS: u64 = MBPS * 1000;

    if bps >= GBPS {
        format!("{:.2} Gbps", bps as f64 / GBPS as f64)
    } else if bps >= MBPS {
        format!("{:.2} Mbps", bps as f64 / MBPS as f64)
    } else if bps >= KBPS {
        format!("{:.2} Kbps", bps as f64 / KBPS as f64)
    } else {
        format!("{} bps", bps)
    }
}

/// Format a microsecond interval in human-readable form
pub fn format_micros(us: u64) -> String {
    if us >= 1_000_000 {
        format!("{:.2}s", us as f64 / 1_000_000.0)
    } else if us >= 1_000 {
        format!("{:.2}ms", us as f64 / 1_000.0)
    } else {
        format!("{}µs", us)
    }
}

/// Goodput over `elapsed`, in bits per second
pub fn goodput_bps(bytes: u64, elapsed: Duration) -> u64 {
    let micros = elapsed.as_micros();
    if micros == 0 {
        return 0;
    }
    (bytes as u128 * 8 * 1_000_000 / micros) as u64
}

fn link_row(name: &str, stats: &LinkStats) {
    println!(
        "│ {:8} │ {:7} │ {:7} │ {:7} │ {:7} │ {:10} │",
        name,
        stats.offered,
        stats.carried,
        stats.dropped,
        stats.delayed,
        format_bytes(stats.bytes)
    );
}

/// Display the outcome of a transfer
pub fn display_summary(summary: &TransferSummary) {
    let sender = &summary.sender;
    let receiver = &summary.receiver;
    let report = &summary.report;

    println!("\n┌─────────────────────────────────────────────────────────────┐");
    println!("│ TRANSFER SUMMARY                                            │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│ Protocol: {}", summary.protocol);
    println!(
        "│ Sender:   {:?} ({} of {} packets delivered)",
        summary.sender_state, receiver.packets_delivered, summary.packet_count
    );
    println!(
        "│ Delivery: {}",
        if summary.delivered_intact {
            "complete, in order"
        } else {
            "INCOMPLETE"
        }
    );
    println!("│ Finished: {}", report.finished_at);
    if let Some(at) = summary.last_delivery {
        println!("│ Last delivery: {}", at);
    }
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│ SENDER                                                      │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!(
        "│ Packets:  {} sent / {} retransmitted",
        sender.packets_sent, sender.packets_retransmitted
    );
    println!("│ Bytes:    {}", format_bytes(sender.bytes_sent));
    println!("│ Timeouts: {}", sender.timeouts);
    println!(
        "│ ACKs:     {} received / {} ignored",
        sender.acks_received, sender.acks_ignored
    );
    if sender.rtt.sample_count() > 0 {
        println!(
            "│ RTT:      {} (var {}, {} samples)",
            format_micros(sender.rtt.srtt()),
            format_micros(sender.rtt.rtt_var()),
            sender.rtt.sample_count()
        );
        println!(
            "│ RTO:      {} suggested / {} configured",
            format_micros(sender.rtt.rto().as_micros() as u64),
            format_micros(summary.timeout.as_micros() as u64)
        );
    }
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│ RECEIVER                                                    │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!(
        "│ Packets:  {} received / {} delivered",
        receiver.packets_received, receiver.packets_delivered
    );
    println!(
        "│ Anomalies: {} out of order / {} duplicates",
        receiver.out_of_order, receiver.duplicates
    );
    println!("│ ACKs sent: {}", receiver.acks_sent);
    if let Some(at) = summary.last_delivery {
        let elapsed = at.as_duration().saturating_sub(summary.sender_start);
        println!(
            "│ Goodput:  {}",
            format_bandwidth(goodput_bps(receiver.bytes_delivered, elapsed))
        );
    }
    println!("└─────────────────────────────────────────────────────────────┘");

    println!("\n┌──────────┬─────────┬─────────┬─────────┬─────────┬────────────┐");
    println!("│ Link     │ Offered │ Carried │ Dropped │ Delayed │ Bytes      │");
    println!("├──────────┼─────────┼─────────┼─────────┼─────────┼────────────┤");
    link_row("forward", &report.forward);
    link_row("reverse", &report.reverse);
    println!("└──────────┴─────────┴─────────┴─────────┴─────────┴────────────┘");
}

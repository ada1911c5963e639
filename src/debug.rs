use crate::bundler::BundleCapacity;
use crate::protocol::{Channel, Destination, Message};
use crate::sync::TickReport;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};

static DEBUG_MODE: AtomicBool = AtomicBool::new(false);
static TRACE_MODE: AtomicBool = AtomicBool::new(false);

/// Initialize debug mode from environment variables
///
/// - `FLEX_DEBUG=1`: pretty-print every message as JSON
/// - `FLEX_TRACE=1`: human-readable traces of bundling, flushing and transport
pub fn init_debug_mode() {
    let debug = env::var("FLEX_DEBUG").is_ok();
    let trace = env::var("FLEX_TRACE").is_ok();

    DEBUG_MODE.store(debug, Ordering::Relaxed);
    TRACE_MODE.store(trace, Ordering::Relaxed);

    if debug {
        eprintln!("[FLEX-LINK] Debug mode enabled - all messages will be logged as JSON");
    }

    if trace {
        eprintln!("[FLEX-LINK] Trace mode enabled - human-readable operation logs");
    }
}

pub fn is_debug_enabled() -> bool {
    DEBUG_MODE.load(Ordering::Relaxed)
}

pub fn is_trace_enabled() -> bool {
    TRACE_MODE.load(Ordering::Relaxed)
}

/// Log a message in JSON format if debug mode is enabled
pub fn log_message(direction: &str, message: &Message) {
    if !is_debug_enabled() {
        return;
    }

    match serde_json::to_string_pretty(message) {
        Ok(json) => {
            eprintln!("\n[FLEX-LINK] {} {}:\n{}\n", direction, message_summary(message), json);
        }
        Err(e) => {
            eprintln!("[FLEX-LINK] Failed to serialize message to JSON: {}", e);
        }
    }
}

/// Trace how a queue was split into messages
pub fn trace_bundle(destination: &Destination, channel: Channel, records: usize, messages: usize) {
    if !is_trace_enabled() {
        return;
    }

    eprintln!(
        "[FLEX-LINK] Bundled {} records for {} ({:?}) into {} messages",
        records,
        destination_label(destination),
        channel,
        messages
    );
}

pub fn trace_tick(report: &TickReport) {
    if !is_trace_enabled() {
        return;
    }

    eprintln!("[FLEX-LINK] Tick {}{}:", report.frame, if report.fixed_step { " (fixed)" } else { "" });
    eprintln!("  Records gathered: {}", report.records_gathered);
    if report.sources_skipped > 0 {
        eprintln!("  - {} sources skipped", report.sources_skipped);
    }
    eprintln!("  Messages sent: {}", report.messages_sent);
}

pub fn trace_capacity(capacity: &BundleCapacity) {
    if !is_trace_enabled() {
        return;
    }

    eprintln!(
        "[FLEX-LINK] Packet limits discovered: {} reliable / {} unreliable records per message",
        capacity.reliable, capacity.unreliable
    );
}

/// Trace a transport send
pub fn trace_transport_send(bytes: usize, destination: &Destination) {
    if !is_trace_enabled() {
        return;
    }

    eprintln!(
        "[FLEX-LINK] → Sent {} to {}",
        format_bytes(bytes),
        destination_label(destination)
    );
}

/// Trace a transport receive
pub fn trace_transport_receive(bytes: usize, source: &str) {
    if !is_trace_enabled() {
        return;
    }

    eprintln!("[FLEX-LINK] ← Received {} from {}", format_bytes(bytes), source);
}

fn destination_label(destination: &Destination) -> String {
    match destination {
        Destination::Server => "server".to_string(),
        Destination::All => "all clients".to_string(),
        Destination::Peer(peer) => peer.to_string(),
    }
}

/// Format bytes in human-readable format (KB, MB)
pub fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// One-line description of a message
pub fn message_summary(message: &Message) -> String {
    let settled = message.records.iter().filter(|r| r.is_settled()).count();
    if settled > 0 {
        format!(
            "Message (seq: {}, {} records, {} settled)",
            message.sequence_id,
            message.len(),
            settled
        )
    } else {
        format!("Message (seq: {}, {} records)", message.sequence_id, message.len())
    }
}

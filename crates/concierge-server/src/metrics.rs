//! Metrics collection and export for the concierge.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use concierge_core::{Disposition, Outcome};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const EVENTS_TOTAL: &str = "concierge_events_total";
    pub const RELAYED_TOTAL: &str = "concierge_relayed_total";
    pub const DROPPED_TOTAL: &str = "concierge_dropped_total";
    pub const STATUS_TRANSITIONS_TOTAL: &str = "concierge_status_transitions_total";
    pub const PUBLISHED_TOTAL: &str = "concierge_published_total";
    pub const CLIENTS_TRACKED: &str = "concierge_clients_tracked";
    pub const CLIENTS_RECENT: &str = "concierge_clients_recent";
    pub const LATENCY_SECONDS: &str = "concierge_latency_seconds";
    pub const ERRORS_TOTAL: &str = "concierge_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(names::EVENTS_TOTAL, "Bus events handled, by disposition");
    metrics::describe_counter!(names::RELAYED_TOTAL, "Data messages stamped and relayed");
    metrics::describe_counter!(names::DROPPED_TOTAL, "Messages dropped, by reason");
    metrics::describe_counter!(
        names::STATUS_TRANSITIONS_TOTAL,
        "Connection status transitions of the relay"
    );
    metrics::describe_counter!(names::PUBLISHED_TOTAL, "Messages published to the bus");
    metrics::describe_gauge!(names::CLIENTS_TRACKED, "Clients in the presence registry");
    metrics::describe_gauge!(
        names::CLIENTS_RECENT,
        "Clients seen within the recency window at the last announcement"
    );
    metrics::describe_histogram!(
        names::LATENCY_SECONDS,
        "Event handling latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of bus errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record what the engine did with one event.
pub fn record_outcome(outcome: &Outcome) {
    counter!(names::EVENTS_TOTAL, "disposition" => outcome.disposition.label()).increment(1);

    match outcome.disposition {
        Disposition::Relayed(kind) => {
            counter!(names::RELAYED_TOTAL, "kind" => kind.as_str()).increment(1);
        }
        Disposition::Dropped(reason) => {
            counter!(names::DROPPED_TOTAL, "reason" => reason.as_str()).increment(1);
        }
        Disposition::Lifecycle(status) => {
            counter!(names::STATUS_TRANSITIONS_TOTAL, "status" => status.as_str()).increment(1);
        }
        Disposition::Connected => {
            counter!(names::STATUS_TRANSITIONS_TOTAL, "status" => "connected").increment(1);
        }
        _ => {}
    }
}

/// Record a successful publish.
pub fn record_publish() {
    counter!(names::PUBLISHED_TOTAL).increment(1);
}

/// Update the tracked and recent client counts.
pub fn set_clients(tracked: usize, recent: usize) {
    gauge!(names::CLIENTS_TRACKED).set(tracked as f64);
    gauge!(names::CLIENTS_RECENT).set(recent as f64);
}

/// Record event handling latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::LATENCY_SECONDS).record(seconds);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking requests. Labels: outcome (`created` or an error code).
pub const BOOKING_REQUESTS_TOTAL: &str = "motorpool_booking_requests_total";

/// Counter: committed booking transitions. Labels: to.
pub const BOOKING_TRANSITIONS_TOTAL: &str = "motorpool_booking_transitions_total";

/// Counter: notifications written. Labels: type.
pub const NOTIFICATIONS_EMITTED_TOTAL: &str = "motorpool_notifications_emitted_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Counter: cached vehicle status changes. Labels: status.
pub const VEHICLE_STATUS_CHANGES_TOTAL: &str = "motorpool_vehicle_status_changes_total";

/// Histogram: full reconciliation sweep duration in seconds.
pub const RECONCILE_SWEEP_DURATION_SECONDS: &str = "motorpool_reconcile_sweep_duration_seconds";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "motorpool_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (records per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "motorpool_journal_flush_batch_size";

/// Counter: journal writes that failed.
pub const PERSISTENCE_FAILURES_TOTAL: &str = "motorpool_persistence_failures_total";

/// Install the fmt subscriber. `RUST_LOG` wins over the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("motorpool=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

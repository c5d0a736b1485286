use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "innkeep_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "innkeep_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "innkeep_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "innkeep_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "innkeep_connections_rejected_total";

/// Gauge: number of active tenants (loaded marketplaces).
pub const TENANTS_ACTIVE: &str = "innkeep_tenants_active";

// ── Domain metrics ──────────────────────────────────────────────

/// Counter: bookings committed.
pub const BOOKINGS_CREATED_TOTAL: &str = "innkeep_bookings_created_total";

/// Counter: booking requests refused. Labels: reason.
pub const BOOKING_REJECTIONS_TOTAL: &str = "innkeep_booking_rejections_total";

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

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertAccommodation { .. } => "insert_accommodation",
        Command::UpdatePrice { .. } => "update_price",
        Command::UpdateListing { .. } => "update_listing",
        Command::InsertBooking { .. } => "insert_booking",
        Command::CheckIn { .. } => "check_in",
        Command::SelectAccommodations { .. } => "select_accommodations",
        Command::SelectMyAccommodations => "select_my_accommodations",
        Command::SelectMyBookings => "select_my_bookings",
        Command::SelectUnavailable { .. } => "select_unavailable",
        Command::SelectEvents { .. } => "select_events",
    }
}

use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: availability checks served (cache hits included).
pub const AVAILABILITY_CHECKS_TOTAL: &str = "quotient_availability_checks_total";

/// Counter: checks answered from a hot stored verdict.
pub const VERDICT_CACHE_HITS_TOTAL: &str = "quotient_verdict_cache_hits_total";

/// Counter: checks that went to the calculator.
pub const VERDICT_CACHE_MISSES_TOTAL: &str = "quotient_verdict_cache_misses_total";

/// Histogram: calculator latency in seconds (demand queries included).
pub const COMPUTE_DURATION_SECONDS: &str = "quotient_compute_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Counter: expired cart holds removed by the reaper.
pub const REAPED_HOLDS_TOTAL: &str = "quotient_reaped_holds_total";

/// Install the Prometheus metrics exporter on the given port. No-op if
/// port is None.
pub fn init_metrics(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Plain fmt subscriber for embedding services that don't bring their own.
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}

//! Prometheus metrics for registry activity.

use metrics::{counter, gauge};

/// Initialize metrics exporter (Prometheus).
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record a login attempt (`success`, `failure` or `denied`).
pub fn login_attempt(outcome: &str) {
    counter!("tracker_logins_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record the result of one spreadsheet upload.
pub fn certificates_imported(created: usize, updated: usize, skipped: usize) {
    counter!("tracker_certificates_imported_total", "outcome" => "created").increment(created as u64);
    counter!("tracker_certificates_imported_total", "outcome" => "updated").increment(updated as u64);
    counter!("tracker_certificates_imported_total", "outcome" => "skipped").increment(skipped as u64);
}

/// Record a certificate handed over.
pub fn certificate_collected() {
    counter!("tracker_certificates_collected_total").increment(1);
}

/// Record a generated report.
pub fn report_generated(status: &str) {
    counter!("tracker_reports_generated_total", "status" => status.to_string()).increment(1);
}

/// Set the number of live sessions.
pub fn active_sessions(count: usize) {
    gauge!("tracker_active_sessions").set(count as f64);
}

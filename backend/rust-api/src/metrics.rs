use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Business Metrics
    pub static ref SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "submissions_total",
        "Total number of answer submissions settled",
        &["correct"]
    )
    .unwrap();

    pub static ref WINNER_SLOTS_CLAIMED_TOTAL: IntCounter = register_int_counter!(
        "winner_slots_claimed_total",
        "Total number of winner slots successfully claimed"
    )
    .unwrap();

    pub static ref ALLOCATION_CONFLICTS_TOTAL: IntCounter = register_int_counter!(
        "allocation_conflicts_total",
        "Total number of lost compare-and-swap races during slot allocation"
    )
    .unwrap();

    pub static ref PAYOUTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "payouts_total",
        "Total number of payout dispatch outcomes",
        &["provider", "status"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

pub fn record_submission(is_correct: bool) {
    let label = if is_correct { "true" } else { "false" };
    SUBMISSIONS_TOTAL.with_label_values(&[label]).inc();
}

pub fn record_payout(provider: &str, status: &str) {
    PAYOUTS_TOTAL.with_label_values(&[provider, status]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        let _ = SUBMISSIONS_TOTAL.with_label_values(&["true"]).get();
        let _ = WINNER_SLOTS_CLAIMED_TOTAL.get();
    }

    #[test]
    fn test_render_metrics() {
        record_submission(true);
        let output = render_metrics().unwrap();
        assert!(output.contains("submissions_total"));
    }
}

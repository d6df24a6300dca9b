//! Session metrics
//!
//! - `session_requests_total` (counter): label `outcome`
//! - `session_refresh_total` (counter): label `outcome`
//! - `session_refresh_duration_seconds` (histogram)
//! - `session_replays_total` (counter)
//!
//! No recorder is installed here; without one these calls are no-ops.

/// Record a finished pipeline request.
pub fn record_request(outcome: &'static str) {
    metrics::counter!("session_requests_total", "outcome" => outcome).increment(1);
}

/// Record a settled refresh call.
pub fn record_refresh(outcome: &'static str, duration_secs: f64) {
    metrics::counter!("session_refresh_total", "outcome" => outcome).increment(1);
    metrics::histogram!("session_refresh_duration_seconds").record(duration_secs);
}

/// Record a request replayed after a refresh.
pub fn record_replay() {
    metrics::counter!("session_replays_total").increment(1);
}

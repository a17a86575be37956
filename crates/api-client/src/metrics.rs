//! Client counters
//!
//! - `api_requests_total` (counter): labels `method`, `status`
//! - `api_refresh_total` (counter): label `outcome` (`success` / `failure`)
//! - `api_session_ended_total` (counter)
//!
//! With no recorder installed these are no-ops.

/// Record one attempt that got an answer from the backend.
pub fn record_request(method: &str, status: u16) {
    metrics::counter!("api_requests_total", "method" => method.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Record a settled refresh call.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("api_refresh_total", "outcome" => outcome).increment(1);
}

pub fn record_session_ended() {
    metrics::counter!("api_session_ended_total").increment(1);
}

//! Counters for the renewal protocol
//!
//! - `session_renewals_total` (counter): label `outcome` (`success` | `failure`)
//! - `session_requests_queued_total` (counter): requests parked behind a renewal
//! - `session_replays_total` (counter): requests re-issued after a renewal
//! - `session_retry_exhausted_total` (counter): replays rejected again
//! - `session_terminations_total` (counter): sessions ended by a failed renewal

pub fn record_renewal(outcome: &'static str) {
    metrics::counter!("session_renewals_total", "outcome" => outcome).increment(1);
}

pub fn record_queued() {
    metrics::counter!("session_requests_queued_total").increment(1);
}

pub fn record_replay() {
    metrics::counter!("session_replays_total").increment(1);
}

pub fn record_retry_exhausted() {
    metrics::counter!("session_retry_exhausted_total").increment(1);
}

pub fn record_termination() {
    metrics::counter!("session_terminations_total").increment(1);
}

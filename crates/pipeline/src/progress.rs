//! Time-to-progress arithmetic for the simulator.

use std::time::Duration;

use toonify_core::phase::PROGRESS_MAX;

/// Progress after `elapsed` of a `total`-long job, in `[0, 100]`.
///
/// A zero `total` counts as already finished.
pub fn compute_progress(elapsed: Duration, total: Duration) -> f64 {
    let total_ms = total.as_millis();
    if total_ms == 0 {
        return PROGRESS_MAX;
    }
    let pct = elapsed.as_millis() as f64 * PROGRESS_MAX / total_ms as f64;
    pct.min(PROGRESS_MAX)
}

/// Milliseconds left until `total`, never negative.
pub fn time_remaining_ms(elapsed: Duration, total: Duration) -> u64 {
    total.saturating_sub(elapsed).as_millis() as u64
}

/// Estimate the time left from a progress percentage, for feeds that do
/// not report it.
pub fn estimate_remaining_ms(progress: f64, total_ms: u64) -> u64 {
    let left = (PROGRESS_MAX - progress.clamp(0.0, PROGRESS_MAX)) / PROGRESS_MAX;
    (total_ms as f64 * left).round() as u64
}

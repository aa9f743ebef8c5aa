use std::str::FromStr;
use std::time::Duration;

use toonify_core::error::CoreError;
use toonify_core::phase::{PhaseTable, PIPELINE_TWO_PHASE};
use toonify_core::quota::{DEFAULT_DAILY_LIMIT, DEFAULT_MONTHLY_LIMIT};

/// Default interval between simulated progress ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(200);
/// Grace period after a job's nominal duration before the watchdog fires.
pub const DEFAULT_WATCHDOG_BUFFER: Duration = Duration::from_secs(5);

/// Limits given to a user with no persisted quota record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    pub daily: u32,
    pub monthly: u32,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            daily: DEFAULT_DAILY_LIMIT,
            monthly: DEFAULT_MONTHLY_LIMIT,
        }
    }
}

/// Tracker tuning loaded from environment variables.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub tick_interval: Duration,
    pub watchdog_buffer: Duration,
    /// Phase layout used when the backend does not report one.
    pub phases: PhaseTable,
    pub quota: QuotaLimits,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            watchdog_buffer: DEFAULT_WATCHDOG_BUFFER,
            phases: PhaseTable::two_phase(),
            quota: QuotaLimits::default(),
        }
    }
}

impl TrackerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default     |
    /// |-----------------------|-------------|
    /// | `TICK_INTERVAL_MS`    | `200`       |
    /// | `WATCHDOG_BUFFER_MS`  | `5000`      |
    /// | `PIPELINE_PHASES`     | `two_phase` |
    /// | `DAILY_QUOTA_LIMIT`   | `3`         |
    /// | `MONTHLY_QUOTA_LIMIT` | `50`        |
    pub fn from_env() -> Result<Self, CoreError> {
        let tick_ms: u64 = env_or("TICK_INTERVAL_MS", 200)?;
        if tick_ms == 0 {
            return Err(CoreError::Validation(
                "TICK_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }
        let watchdog_ms: u64 = env_or("WATCHDOG_BUFFER_MS", 5_000)?;

        let pipeline =
            std::env::var("PIPELINE_PHASES").unwrap_or_else(|_| PIPELINE_TWO_PHASE.into());
        let phases = PhaseTable::builtin(pipeline.trim())?;

        let quota = QuotaLimits {
            daily: env_or("DAILY_QUOTA_LIMIT", DEFAULT_DAILY_LIMIT)?,
            monthly: env_or("MONTHLY_QUOTA_LIMIT", DEFAULT_MONTHLY_LIMIT)?,
        };

        Ok(Self {
            tick_interval: Duration::from_millis(tick_ms),
            watchdog_buffer: Duration::from_millis(watchdog_ms),
            phases,
            quota,
        })
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> Result<T, CoreError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::Validation(format!("{name} must be a valid number, got '{raw}'"))),
        Err(_) => Ok(default),
    }
}

//! Usage quota record, rollover rules, and limit checks (pure logic).
//!
//! The stateful, persisted ledger built on these rules lives in
//! `toonify_pipeline::ledger`. Everything here operates on a plain
//! [`Quota`] value and an explicit "today" so it can be tested without
//! clocks or storage.

use std::fmt;

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Free-tier generations per calendar day.
pub const DEFAULT_DAILY_LIMIT: u32 = 3;
/// Free-tier generations per calendar month.
pub const DEFAULT_MONTHLY_LIMIT: u32 = 50;
/// Remaining count at or below which a low-quota warning is raised.
pub const LOW_REMAINING_THRESHOLD: u32 = 1;
/// Store key under which the quota record is persisted.
pub const QUOTA_STORAGE_KEY: &str = "user_quota";

// ---------------------------------------------------------------------------
// QuotaKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaKind {
    Daily,
    Monthly,
}

impl QuotaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
        }
    }
}

impl fmt::Display for QuotaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Quota record
// ---------------------------------------------------------------------------

/// The persisted usage record.
///
/// Missing fields deserialize to their defaults and unknown fields are
/// ignored, so records written by older or newer builds still load.
/// A missing `last_reset_date` reads as the distant past, which forces a
/// rollover on first use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Quota {
    pub daily_limit: u32,
    pub daily_used: u32,
    pub monthly_limit: u32,
    pub monthly_used: u32,
    pub last_reset_date: NaiveDate,
}

impl Default for Quota {
    fn default() -> Self {
        Self {
            daily_limit: DEFAULT_DAILY_LIMIT,
            daily_used: 0,
            monthly_limit: DEFAULT_MONTHLY_LIMIT,
            monthly_used: 0,
            last_reset_date: NaiveDate::MIN,
        }
    }
}

/// Which counters a rollover reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rollover {
    pub daily: bool,
    pub monthly: bool,
}

impl Rollover {
    pub fn any(self) -> bool {
        self.daily || self.monthly
    }
}

impl Quota {
    /// A fresh record with the given limits, last reset `today`.
    pub fn new(daily_limit: u32, monthly_limit: u32, today: NaiveDate) -> Self {
        Self {
            daily_limit,
            daily_used: 0,
            monthly_limit,
            monthly_used: 0,
            last_reset_date: today,
        }
    }

    pub fn limit(&self, kind: QuotaKind) -> u32 {
        match kind {
            QuotaKind::Daily => self.daily_limit,
            QuotaKind::Monthly => self.monthly_limit,
        }
    }

    pub fn used(&self, kind: QuotaKind) -> u32 {
        match kind {
            QuotaKind::Daily => self.daily_used,
            QuotaKind::Monthly => self.monthly_used,
        }
    }

    /// `limit - used`, never negative.
    pub fn remaining(&self, kind: QuotaKind) -> u32 {
        self.limit(kind).saturating_sub(self.used(kind))
    }

    /// Clamp counters into `0..=limit` (records edited by hand may not be).
    pub fn normalized(mut self) -> Self {
        self.daily_used = self.daily_used.min(self.daily_limit);
        self.monthly_used = self.monthly_used.min(self.monthly_limit);
        self
    }

    /// Reset counters whose period ended before `today`.
    ///
    /// The daily counter resets whenever the calendar day changed; the
    /// monthly counter when the calendar month changed. Dates moving
    /// backwards (clock skew) also count as a change.
    pub fn apply_rollover(&mut self, today: NaiveDate) -> Rollover {
        if self.last_reset_date == today {
            return Rollover::default();
        }
        let monthly = (self.last_reset_date.year(), self.last_reset_date.month())
            != (today.year(), today.month());

        self.daily_used = 0;
        if monthly {
            self.monthly_used = 0;
        }
        self.last_reset_date = today;

        Rollover {
            daily: true,
            monthly,
        }
    }

    /// Evaluate the limit for `kind` without mutating the record.
    ///
    /// Callers are expected to have applied [`apply_rollover`](Self::apply_rollover)
    /// for the same `today` first.
    pub fn evaluate(&self, kind: QuotaKind, today: NaiveDate) -> QuotaCheck {
        let remaining = self.remaining(kind);
        if remaining == 0 {
            return QuotaCheck {
                kind,
                allowed: false,
                remaining,
                signal: Some(QuotaSignal::Exhausted {
                    kind,
                    resets_on: reset_boundary(kind, today),
                }),
            };
        }

        let signal = (remaining <= LOW_REMAINING_THRESHOLD)
            .then_some(QuotaSignal::Low { kind, remaining });

        QuotaCheck {
            kind,
            allowed: true,
            remaining,
            signal,
        }
    }

    /// Add `amount` to both counters, clamped at their limits.
    pub fn consume(&mut self, amount: u32) {
        self.daily_used = self.daily_used.saturating_add(amount).min(self.daily_limit);
        self.monthly_used = self
            .monthly_used
            .saturating_add(amount)
            .min(self.monthly_limit);
    }

    /// Zero the daily counter and mark `today` as the last reset.
    pub fn reset_daily(&mut self, today: NaiveDate) {
        self.daily_used = 0;
        self.last_reset_date = today;
    }

    /// Replace both limits, keeping the usage counters.
    ///
    /// Limits below current usage are rejected so `used <= limit` holds.
    pub fn upgraded(&self, daily_limit: u32, monthly_limit: u32) -> Result<Self, CoreError> {
        if daily_limit < self.daily_used {
            return Err(CoreError::Validation(format!(
                "daily limit {daily_limit} is below today's usage {}",
                self.daily_used
            )));
        }
        if monthly_limit < self.monthly_used {
            return Err(CoreError::Validation(format!(
                "monthly limit {monthly_limit} is below this month's usage {}",
                self.monthly_used
            )));
        }
        Ok(Self {
            daily_limit,
            monthly_limit,
            ..self.clone()
        })
    }

    /// Read-only view with computed remaining counts.
    pub fn view(&self) -> QuotaView {
        QuotaView {
            daily: QuotaWindow {
                limit: self.daily_limit,
                used: self.daily_used,
                remaining: self.remaining(QuotaKind::Daily),
            },
            monthly: QuotaWindow {
                limit: self.monthly_limit,
                used: self.monthly_used,
                remaining: self.remaining(QuotaKind::Monthly),
            },
            last_reset_date: self.last_reset_date,
        }
    }
}

/// First day on which a spent `kind` allowance is available again:
/// tomorrow for daily, the first of next month for monthly.
pub fn reset_boundary(kind: QuotaKind, today: NaiveDate) -> NaiveDate {
    match kind {
        QuotaKind::Daily => today.checked_add_days(Days::new(1)).unwrap_or(today),
        QuotaKind::Monthly => today
            .with_day(1)
            .and_then(|first| first.checked_add_months(Months::new(1)))
            .unwrap_or(today),
    }
}

// ---------------------------------------------------------------------------
// Check results and views
// ---------------------------------------------------------------------------

/// Condition raised by a quota check for the user's attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum QuotaSignal {
    /// Nothing left; available again on `resets_on`.
    Exhausted {
        kind: QuotaKind,
        resets_on: NaiveDate,
    },
    /// Allowed, but only `remaining` uses are left.
    Low { kind: QuotaKind, remaining: u32 },
}

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaCheck {
    pub kind: QuotaKind,
    pub allowed: bool,
    pub remaining: u32,
    pub signal: Option<QuotaSignal>,
}

impl QuotaCheck {
    /// Convert a refused check into [`CoreError::QuotaExceeded`].
    pub fn into_result(self) -> Result<Self, CoreError> {
        match self.signal {
            Some(QuotaSignal::Exhausted { kind, resets_on }) if !self.allowed => {
                Err(CoreError::QuotaExceeded { kind, resets_on })
            }
            _ => Ok(self),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaWindow {
    pub limit: u32,
    pub used: u32,
    pub remaining: u32,
}

/// Quota as presented to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaView {
    pub daily: QuotaWindow,
    pub monthly: QuotaWindow,
    pub last_reset_date: NaiveDate,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn remaining_is_computed() {
        let mut quota = Quota::new(3, 50, date(2026, 3, 10));
        quota.consume(2);
        assert_eq!(quota.remaining(QuotaKind::Daily), 1);
        assert_eq!(quota.remaining(QuotaKind::Monthly), 48);
    }

    #[test]
    fn consume_clamps_at_limit() {
        let mut quota = Quota::new(3, 4, date(2026, 3, 10));
        quota.consume(10);
        assert_eq!(quota.daily_used, 3);
        assert_eq!(quota.monthly_used, 4);
        assert_eq!(quota.remaining(QuotaKind::Daily), 0);
    }

    #[test]
    fn same_day_is_not_a_rollover() {
        let today = date(2026, 3, 10);
        let mut quota = Quota::new(3, 50, today);
        quota.consume(3);
        assert!(!quota.apply_rollover(today).any());
        assert_eq!(quota.daily_used, 3);
    }

    #[test]
    fn next_day_resets_daily_only() {
        let mut quota = Quota::new(3, 50, date(2026, 3, 10));
        quota.consume(3);
        let rollover = quota.apply_rollover(date(2026, 3, 11));
        assert_eq!(
            rollover,
            Rollover {
                daily: true,
                monthly: false
            }
        );
        assert_eq!(quota.daily_used, 0);
        assert_eq!(quota.monthly_used, 3);
        assert_eq!(quota.last_reset_date, date(2026, 3, 11));
    }

    #[test]
    fn new_month_resets_both() {
        let mut quota = Quota::new(3, 50, date(2026, 3, 31));
        quota.consume(2);
        let rollover = quota.apply_rollover(date(2026, 4, 1));
        assert!(rollover.daily && rollover.monthly);
        assert_eq!(quota.monthly_used, 0);
    }

    #[test]
    fn same_month_in_another_year_is_a_monthly_rollover() {
        let mut quota = Quota::new(3, 50, date(2025, 4, 20));
        quota.consume(1);
        assert!(quota.apply_rollover(date(2026, 4, 20)).monthly);
    }

    #[test]
    fn exhausted_check_reports_boundary() {
        let today = date(2026, 3, 10);
        let mut quota = Quota::new(1, 50, today);
        quota.consume(1);

        let daily = quota.evaluate(QuotaKind::Daily, today);
        assert!(!daily.allowed);
        assert_eq!(daily.remaining, 0);
        assert_eq!(
            daily.signal,
            Some(QuotaSignal::Exhausted {
                kind: QuotaKind::Daily,
                resets_on: date(2026, 3, 11),
            })
        );
    }

    #[test]
    fn low_remaining_warns_but_allows() {
        let today = date(2026, 3, 10);
        let mut quota = Quota::new(3, 50, today);
        quota.consume(2);

        let check = quota.evaluate(QuotaKind::Daily, today);
        assert!(check.allowed);
        assert_eq!(
            check.signal,
            Some(QuotaSignal::Low {
                kind: QuotaKind::Daily,
                remaining: 1
            })
        );
    }

    #[test]
    fn healthy_quota_has_no_signal() {
        let today = date(2026, 3, 10);
        let quota = Quota::new(3, 50, today);
        let check = quota.evaluate(QuotaKind::Monthly, today);
        assert!(check.allowed);
        assert!(check.signal.is_none());
    }

    #[test]
    fn into_result_maps_exhaustion_to_error() {
        let today = date(2026, 12, 31);
        let quota = Quota::new(0, 0, today);
        assert_matches!(
            quota.evaluate(QuotaKind::Monthly, today).into_result(),
            Err(CoreError::QuotaExceeded { kind: QuotaKind::Monthly, resets_on }) if resets_on == date(2027, 1, 1)
        );
    }

    #[test]
    fn reset_boundaries() {
        assert_eq!(reset_boundary(QuotaKind::Daily, date(2026, 2, 28)), date(2026, 3, 1));
        assert_eq!(reset_boundary(QuotaKind::Monthly, date(2026, 2, 14)), date(2026, 3, 1));
        assert_eq!(reset_boundary(QuotaKind::Monthly, date(2026, 12, 5)), date(2027, 1, 1));
    }

    #[test]
    fn upgrade_preserves_usage() {
        let mut quota = Quota::new(3, 50, date(2026, 3, 10));
        quota.consume(3);
        let upgraded = quota.upgraded(10, 200).unwrap();
        assert_eq!(upgraded.daily_used, 3);
        assert_eq!(upgraded.remaining(QuotaKind::Daily), 7);
        assert_eq!(upgraded.remaining(QuotaKind::Monthly), 197);
    }

    #[test]
    fn upgrade_below_usage_rejected() {
        let mut quota = Quota::new(3, 50, date(2026, 3, 10));
        quota.consume(2);
        assert_matches!(quota.upgraded(1, 50), Err(CoreError::Validation(_)));
        assert_matches!(quota.upgraded(3, 1), Err(CoreError::Validation(_)));
    }

    #[test]
    fn reset_daily_keeps_monthly() {
        let mut quota = Quota::new(3, 50, date(2026, 3, 10));
        quota.consume(3);
        quota.reset_daily(date(2026, 3, 10));
        assert_eq!(quota.daily_used, 0);
        assert_eq!(quota.monthly_used, 3);
    }

    #[test]
    fn record_tolerates_missing_and_unknown_fields() {
        let quota: Quota =
            serde_json::from_str(r#"{"daily_used":2,"theme":"dark"}"#).expect("lenient parse");
        assert_eq!(quota.daily_used, 2);
        assert_eq!(quota.daily_limit, DEFAULT_DAILY_LIMIT);
        assert_eq!(quota.monthly_limit, DEFAULT_MONTHLY_LIMIT);
        assert_eq!(quota.last_reset_date, NaiveDate::MIN);
    }

    #[test]
    fn normalized_clamps_overdrawn_counters() {
        let quota = Quota {
            daily_limit: 3,
            daily_used: 9,
            monthly_limit: 50,
            monthly_used: 70,
            last_reset_date: date(2026, 3, 10),
        }
        .normalized();
        assert_eq!(quota.daily_used, 3);
        assert_eq!(quota.monthly_used, 50);
    }
}

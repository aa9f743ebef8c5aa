//! Calendar-day source for quota rollover.
//!
//! Rollover compares UTC calendar days, so a user crossing time zones or
//! a daylight-saving transition never gets an extra or a lost reset.

use std::sync::atomic::{AtomicI32, Ordering};

use chrono::{Datelike, NaiveDate, Utc};

/// Supplies "today" as a calendar date.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// The wall clock, read as a UTC calendar day.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// A clock that only moves when told to.
///
/// Used by tests and by tooling that replays a ledger at a fixed date.
#[derive(Debug)]
pub struct ManualClock {
    days_from_ce: AtomicI32,
}

impl ManualClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            days_from_ce: AtomicI32::new(today.num_days_from_ce()),
        }
    }

    pub fn set(&self, today: NaiveDate) {
        self.days_from_ce
            .store(today.num_days_from_ce(), Ordering::SeqCst);
    }

    pub fn advance_days(&self, days: i32) {
        self.days_from_ce.fetch_add(days, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        NaiveDate::from_num_days_from_ce_opt(self.days_from_ce.load(Ordering::SeqCst))
            .unwrap_or_default()
    }
}

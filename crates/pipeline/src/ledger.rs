//! Persisted daily/monthly usage quota.
//!
//! [`QuotaLedger`] is the only writer of the [`Quota`] record. Every
//! operation runs as one read-modify-write under the ledger's mutex: the
//! next record is computed on a copy, saved to the store, and only then
//! committed in memory, so a failed save leaves both sides unchanged.

use std::sync::Arc;

use tokio::sync::Mutex;
use toonify_core::clock::Clock;
use toonify_core::error::CoreError;
use toonify_core::quota::{Quota, QuotaCheck, QuotaKind, QuotaSignal, QuotaView, QUOTA_STORAGE_KEY};
use toonify_core::store::KeyValueStore;

use crate::config::QuotaLimits;

pub struct QuotaLedger {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    quota: Mutex<Quota>,
}

impl std::fmt::Debug for QuotaLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaLedger").finish_non_exhaustive()
    }
}

impl QuotaLedger {
    /// Load the persisted record, falling back to `defaults` when it is
    /// missing or unreadable, and apply any pending rollover.
    pub async fn load(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        defaults: QuotaLimits,
    ) -> Result<Self, CoreError> {
        let today = clock.today();
        let fresh = || Quota::new(defaults.daily, defaults.monthly, today);

        let mut quota = match store.load(QUOTA_STORAGE_KEY).await {
            Ok(Some(raw)) => match decode_stored(&raw, defaults) {
                Ok(stored) => stored.normalized(),
                Err(e) => {
                    tracing::warn!(error = %e, "Stored quota record is corrupt, using defaults");
                    fresh()
                }
            },
            Ok(None) => {
                tracing::info!("No stored quota record, using defaults");
                fresh()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read quota record, using defaults");
                fresh()
            }
        };

        let rollover = quota.apply_rollover(today);
        if rollover.any() {
            tracing::info!(
                daily = rollover.daily,
                monthly = rollover.monthly,
                "Quota rolled over on load",
            );
        }
        persist(store.as_ref(), &quota).await?;

        Ok(Self {
            store,
            clock,
            quota: Mutex::new(quota),
        })
    }

    /// Check whether one more use of `kind` is allowed.
    ///
    /// Applies (and persists) any pending rollover first. Low and exhausted
    /// conditions are logged and returned in [`QuotaCheck::signal`].
    pub async fn check_quota(&self, kind: QuotaKind) -> Result<QuotaCheck, CoreError> {
        let today = self.clock.today();
        let mut quota = self.quota.lock().await;
        self.roll_over(&mut quota).await?;

        let check = quota.evaluate(kind, today);
        log_signal(check.signal);
        Ok(check)
    }

    /// Consume `amount` uses from both the daily and monthly quotas.
    ///
    /// Both limits are re-checked inside the same critical section; returns
    /// `Ok(false)` without consuming when either is spent.
    pub async fn consume_quota(&self, amount: u32) -> Result<bool, CoreError> {
        let today = self.clock.today();
        let mut quota = self.quota.lock().await;
        self.roll_over(&mut quota).await?;

        let refused = [QuotaKind::Daily, QuotaKind::Monthly]
            .into_iter()
            .map(|kind| quota.evaluate(kind, today))
            .find(|check| !check.allowed);
        if let Some(check) = refused {
            log_signal(check.signal);
            return Ok(false);
        }

        let mut next = quota.clone();
        next.consume(amount);
        persist(self.store.as_ref(), &next).await?;
        *quota = next;

        tracing::info!(
            amount,
            daily_remaining = quota.remaining(QuotaKind::Daily),
            monthly_remaining = quota.remaining(QuotaKind::Monthly),
            "Quota consumed",
        );
        Ok(true)
    }

    /// Zero today's usage.
    pub async fn reset_daily_quota(&self) -> Result<QuotaView, CoreError> {
        let today = self.clock.today();
        let mut quota = self.quota.lock().await;

        let mut next = quota.clone();
        next.apply_rollover(today);
        next.reset_daily(today);
        persist(self.store.as_ref(), &next).await?;
        *quota = next;

        tracing::info!("Daily quota reset");
        Ok(quota.view())
    }

    /// Replace both limits, keeping current usage.
    pub async fn upgrade_quota(
        &self,
        daily_limit: u32,
        monthly_limit: u32,
    ) -> Result<QuotaView, CoreError> {
        let mut quota = self.quota.lock().await;
        self.roll_over(&mut quota).await?;

        let next = quota.upgraded(daily_limit, monthly_limit)?;
        persist(self.store.as_ref(), &next).await?;
        *quota = next;

        tracing::info!(daily_limit, monthly_limit, "Quota limits upgraded");
        Ok(quota.view())
    }

    /// The current record, as last committed.
    pub async fn snapshot(&self) -> Quota {
        self.quota.lock().await.clone()
    }

    /// The current record as of today, without persisting a rollover.
    pub async fn view(&self) -> QuotaView {
        let mut quota = self.quota.lock().await.clone();
        quota.apply_rollover(self.clock.today());
        quota.view()
    }

    async fn roll_over(&self, quota: &mut Quota) -> Result<(), CoreError> {
        let mut next = quota.clone();
        let rollover = next.apply_rollover(self.clock.today());
        if !rollover.any() {
            return Ok(());
        }
        persist(self.store.as_ref(), &next).await?;
        *quota = next;

        tracing::info!(
            daily = rollover.daily,
            monthly = rollover.monthly,
            "Quota rolled over",
        );
        Ok(())
    }
}

/// Parse a stored record, taking any missing limit from `defaults`.
fn decode_stored(raw: &str, defaults: QuotaLimits) -> Result<Quota, serde_json::Error> {
    let mut value: serde_json::Value = serde_json::from_str(raw)?;
    if let Some(fields) = value.as_object_mut() {
        fields
            .entry("daily_limit")
            .or_insert_with(|| defaults.daily.into());
        fields
            .entry("monthly_limit")
            .or_insert_with(|| defaults.monthly.into());
    }
    serde_json::from_value(value)
}

async fn persist(store: &dyn KeyValueStore, quota: &Quota) -> Result<(), CoreError> {
    let json = serde_json::to_string(quota)
        .map_err(|e| CoreError::Internal(format!("Failed to encode quota record: {e}")))?;
    store
        .save(QUOTA_STORAGE_KEY, &json)
        .await
        .map_err(|e| CoreError::Persistence(e.to_string()))
}

fn log_signal(signal: Option<QuotaSignal>) {
    match signal {
        Some(QuotaSignal::Exhausted { kind, resets_on }) => {
            tracing::warn!(kind = %kind, resets_on = %resets_on, "Quota exhausted");
        }
        Some(QuotaSignal::Low { kind, remaining }) => {
            tracing::warn!(kind = %kind, remaining, "Quota running low");
        }
        None => {}
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

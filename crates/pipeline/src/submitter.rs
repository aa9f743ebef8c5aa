//! Precondition checks and job creation.

use std::sync::Arc;

use chrono::Utc;
use toonify_core::error::CoreError;
use toonify_core::generation::{validate_generation_request, GenerationRequest};
use toonify_core::job::{JobHandle, JobStatus};
use toonify_core::phase::PhaseTable;
use toonify_core::quota::QuotaKind;
use toonify_generation::GenerationBackend;

use crate::ledger::QuotaLedger;

pub struct JobSubmitter {
    ledger: Arc<QuotaLedger>,
    backend: Arc<dyn GenerationBackend>,
    /// Used when the backend does not report its own phase layout.
    default_phases: PhaseTable,
}

impl JobSubmitter {
    pub fn new(
        ledger: Arc<QuotaLedger>,
        backend: Arc<dyn GenerationBackend>,
        default_phases: PhaseTable,
    ) -> Self {
        Self {
            ledger,
            backend,
            default_phases,
        }
    }

    pub fn backend(&self) -> Arc<dyn GenerationBackend> {
        Arc::clone(&self.backend)
    }

    /// Validate `request`, check quota, create the job, and consume one use.
    ///
    /// The backend is only called once validation and both quota checks
    /// pass, and quota is only consumed once the backend accepted the job.
    pub async fn submit(&self, request: &GenerationRequest) -> Result<JobHandle, CoreError> {
        validate_generation_request(request)?;

        for kind in [QuotaKind::Daily, QuotaKind::Monthly] {
            self.ledger.check_quota(kind).await?.into_result()?;
        }

        let ticket = self
            .backend
            .request_generation(request)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Generation request failed");
                CoreError::Submission(e.to_string())
            })?;

        if ticket.initial_status == JobStatus::Failed {
            return Err(CoreError::Submission(format!(
                "Job {} was rejected by the generation service",
                ticket.job_id
            )));
        }

        let phases = ticket
            .configured_phases
            .unwrap_or_else(|| self.default_phases.clone());
        let total_duration_ms = ticket
            .total_duration_ms
            .unwrap_or_else(|| phases.total_nominal_duration_ms());
        if total_duration_ms == 0 {
            return Err(CoreError::Submission(format!(
                "Job {} reported a zero duration",
                ticket.job_id
            )));
        }

        if !self.ledger.consume_quota(1).await? {
            // Spent between the check and now; report whichever ran out.
            for kind in [QuotaKind::Daily, QuotaKind::Monthly] {
                self.ledger.check_quota(kind).await?.into_result()?;
            }
            return Err(CoreError::Internal("Quota could not be consumed".to_string()));
        }

        tracing::info!(
            job_id = %ticket.job_id,
            styles = request.style_selectors.len(),
            total_duration_ms,
            "Generation job submitted",
        );

        Ok(JobHandle {
            job_id: ticket.job_id,
            submitted_at: Utc::now(),
            total_duration_ms,
            phases,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

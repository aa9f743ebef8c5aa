//! The generation collaborator contract.
//!
//! A [`GenerationBackend`] accepts a [`GenerationRequest`], hands back a
//! [`GenerationTicket`] identifying the job, and later produces the job's
//! [`JobResults`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use toonify_core::generation::GenerationRequest;
use toonify_core::job::{JobResults, JobStatus};
use toonify_core::phase::PhaseTable;
use toonify_core::types::JobId;

/// Acceptance receipt for a generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationTicket {
    pub job_id: JobId,
    #[serde(default = "default_initial_status")]
    pub initial_status: JobStatus,
    /// Phase layout the backend will run, when it reports one.
    #[serde(default)]
    pub configured_phases: Option<PhaseTable>,
    /// Expected end-to-end duration, when the backend reports one.
    #[serde(default)]
    pub total_duration_ms: Option<u64>,
}

fn default_initial_status() -> JobStatus {
    JobStatus::Starting
}

/// Errors from generation and moderation collaborators.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The collaborator returned a non-2xx status code.
    #[error("Collaborator API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    /// The collaborator has no record of the job.
    #[error("Unknown job: {0}")]
    UnknownJob(JobId),

    /// The collaborator answered with something we cannot use.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Create a generation job.
    async fn request_generation(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationTicket, GenerationError>;

    /// Fetch the outputs of a job.
    ///
    /// Called once the job is in its final phase, for the assets produced
    /// so far, and again at completion if that first answer was incomplete.
    /// Backends may release a job's outputs after handing them out.
    async fn fetch_results(&self, job_id: &str) -> Result<JobResults, GenerationError>;
}

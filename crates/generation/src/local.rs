//! In-process simulated generation backend.
//!
//! Accepts every request immediately and serves placeholder assets, so
//! the tracker can run end to end without a real model server.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::RwLock;
use toonify_core::generation::GenerationRequest;
use toonify_core::job::{JobResults, JobStatus, StyledResult};
use toonify_core::phase::PhaseTable;
use toonify_core::types::JobId;

use crate::backend::{GenerationBackend, GenerationError, GenerationTicket};

/// Placeholder mesh served for every simulated job.
pub const PLACEHOLDER_MESH_MODEL: &str = "/api/placeholder/3d-model.glb";

/// Length of the random suffix in simulated job ids.
const JOB_ID_SUFFIX_LEN: usize = 9;

pub struct LocalGenerationBackend {
    phases: PhaseTable,
    /// Styles requested per job, for building results. Entries leave the
    /// map when their results are fetched.
    jobs: RwLock<HashMap<JobId, Vec<String>>>,
}

impl LocalGenerationBackend {
    pub fn new(phases: PhaseTable) -> Self {
        Self {
            phases,
            jobs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for LocalGenerationBackend {
    fn default() -> Self {
        Self::new(PhaseTable::two_phase())
    }
}

/// `job_<unix millis>_<9 lowercase alphanumerics>`.
pub fn generate_job_id() -> JobId {
    let suffix: String = rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(JOB_ID_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("job_{}_{suffix}", chrono::Utc::now().timestamp_millis())
}

fn placeholder_result(style: &str) -> StyledResult {
    StyledResult {
        style: style.to_string(),
        image_url: format!("/api/placeholder/400/400?style={style}"),
        thumbnail_url: format!("/api/placeholder/200/200?style={style}"),
    }
}

#[async_trait]
impl GenerationBackend for LocalGenerationBackend {
    async fn request_generation(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationTicket, GenerationError> {
        let job_id = generate_job_id();
        self.jobs
            .write()
            .await
            .insert(job_id.clone(), request.effective_styles());

        tracing::debug!(job_id = %job_id, "Simulated generation job accepted");

        Ok(GenerationTicket {
            job_id,
            initial_status: JobStatus::Starting,
            configured_phases: Some(self.phases.clone()),
            total_duration_ms: Some(self.phases.total_nominal_duration_ms()),
        })
    }

    async fn fetch_results(&self, job_id: &str) -> Result<JobResults, GenerationError> {
        let styles = self
            .jobs
            .write()
            .await
            .remove(job_id)
            .ok_or_else(|| GenerationError::UnknownJob(job_id.to_string()))?;

        Ok(JobResults {
            mesh_model: Some(PLACEHOLDER_MESH_MODEL.to_string()),
            styled_results: styles.iter().map(|s| placeholder_result(s)).collect(),
        })
    }
}

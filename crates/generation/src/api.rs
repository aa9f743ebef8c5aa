//! REST client for a remote generation service.
//!
//! Endpoints:
//! - `POST {api_url}/generations` with `{image_reference, style_selectors}`
//! - `GET  {api_url}/generations/{job_id}/results`

use async_trait::async_trait;
use toonify_core::generation::GenerationRequest;
use toonify_core::job::JobResults;

use crate::backend::{GenerationBackend, GenerationError, GenerationTicket};

/// HTTP client for one generation service.
pub struct HttpGenerationBackend {
    client: reqwest::Client,
    api_url: String,
}

impl HttpGenerationBackend {
    /// * `api_url` - Base HTTP URL, e.g. `http://host:9000`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl GenerationBackend for HttpGenerationBackend {
    async fn request_generation(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationTicket, GenerationError> {
        let response = self
            .client
            .post(format!("{}/generations", self.api_url))
            .json(request)
            .send()
            .await?;

        let ticket: GenerationTicket = parse_response(response).await?;
        if ticket.job_id.trim().is_empty() {
            return Err(GenerationError::InvalidResponse(
                "generation service returned an empty job id".to_string(),
            ));
        }
        Ok(ticket)
    }

    async fn fetch_results(&self, job_id: &str) -> Result<JobResults, GenerationError> {
        let response = self
            .client
            .get(format!("{}/generations/{job_id}/results", self.api_url))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GenerationError::UnknownJob(job_id.to_string()));
        }
        parse_response(response).await
    }
}

// ---- response helpers, shared with the moderation client ----

/// Return the response unchanged on a 2xx status, otherwise an
/// [`GenerationError::ApiError`] with the status and body text.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, GenerationError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(GenerationError::ApiError {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Parse a successful JSON response body into the expected type.
pub(crate) async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, GenerationError> {
    let response = ensure_success(response).await?;
    Ok(response.json::<T>().await?)
}

//! Content moderation collaborator.
//!
//! [`HttpModerator`] posts raw image bytes to `{api_url}/classify`. The
//! service may answer with a ready verdict (`{flagged, confidence}`) or
//! with raw class probabilities (`{predictions: [...]}`), which are scored
//! locally with [`score_predictions`].

use async_trait::async_trait;
use serde::Deserialize;
use toonify_core::moderation::{score_predictions, ModerationVerdict, Prediction};

use crate::api::parse_response;
use crate::backend::GenerationError;

#[async_trait]
pub trait Moderator: Send + Sync {
    async fn classify(&self, bytes: &[u8]) -> Result<ModerationVerdict, GenerationError>;
}

/// Accepts every image. Used when no moderation service is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissiveModerator;

#[async_trait]
impl Moderator for PermissiveModerator {
    async fn classify(&self, _bytes: &[u8]) -> Result<ModerationVerdict, GenerationError> {
        Ok(ModerationVerdict {
            flagged: false,
            confidence: 0.0,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassifyResponse {
    Verdict(ModerationVerdict),
    Predictions { predictions: Vec<Prediction> },
}

impl ClassifyResponse {
    fn into_verdict(self) -> ModerationVerdict {
        match self {
            Self::Verdict(verdict) => verdict,
            Self::Predictions { predictions } => score_predictions(&predictions),
        }
    }
}

pub struct HttpModerator {
    client: reqwest::Client,
    api_url: String,
}

impl HttpModerator {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Moderator for HttpModerator {
    async fn classify(&self, bytes: &[u8]) -> Result<ModerationVerdict, GenerationError> {
        let response = self
            .client
            .post(format!("{}/classify", self.api_url))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await?;

        let parsed: ClassifyResponse = parse_response(response).await?;
        Ok(parsed.into_verdict())
    }
}

//! Upload screening ahead of job submission.

use std::sync::Arc;

use serde::Serialize;
use toonify_core::error::CoreError;
use toonify_core::moderation::{check_verdict, validate_upload, ModerationVerdict};
use toonify_generation::Moderator;
use uuid::Uuid;

/// An upload that passed screening.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenedUpload {
    pub upload_id: Uuid,
    /// Value to pass as a generation request's `image_reference`.
    pub image_reference: String,
    /// Sniffed image format, e.g. `png`.
    pub format: String,
    pub size_bytes: usize,
    /// `None` when the moderation service could not be reached.
    pub moderation: Option<ModerationVerdict>,
}

pub struct UploadScreen {
    moderator: Arc<dyn Moderator>,
}

impl UploadScreen {
    pub fn new(moderator: Arc<dyn Moderator>) -> Self {
        Self { moderator }
    }

    /// Check type, size, and header bytes, then ask the moderator.
    ///
    /// Moderator outages do not block uploads; the verdict is then `None`.
    pub async fn screen(
        &self,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<ScreenedUpload, CoreError> {
        let format = validate_upload(content_type, bytes)?;

        let moderation = match self.moderator.classify(bytes).await {
            Ok(verdict) => {
                if let Err(e) = check_verdict(&verdict) {
                    tracing::warn!(
                        confidence = verdict.confidence,
                        "Upload rejected by moderation",
                    );
                    return Err(e);
                }
                Some(verdict)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Moderation unavailable, accepting upload unscreened");
                None
            }
        };

        let upload_id = Uuid::new_v4();
        tracing::info!(
            upload_id = %upload_id,
            size_bytes = bytes.len(),
            "Upload accepted",
        );

        Ok(ScreenedUpload {
            upload_id,
            image_reference: format!("upload://{upload_id}"),
            format: format!("{format:?}").to_ascii_lowercase(),
            size_bytes: bytes.len(),
            moderation,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use toonify_generation::{GenerationError, PermissiveModerator};

    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    struct FixedModerator(Option<ModerationVerdict>);

    #[async_trait]
    impl Moderator for FixedModerator {
        async fn classify(&self, _bytes: &[u8]) -> Result<ModerationVerdict, GenerationError> {
            self.0.ok_or_else(|| GenerationError::InvalidResponse("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn clean_png_is_accepted() {
        let screen = UploadScreen::new(Arc::new(PermissiveModerator));
        let upload = screen.screen("image/png", PNG).await.unwrap();
        assert_eq!(upload.format, "png");
        assert_eq!(upload.size_bytes, PNG.len());
        assert!(upload.image_reference.starts_with("upload://"));
        assert!(upload.moderation.is_some());
    }

    #[tokio::test]
    async fn flagged_upload_is_rejected() {
        let screen = UploadScreen::new(Arc::new(FixedModerator(Some(ModerationVerdict {
            flagged: true,
            confidence: 0.88,
        }))));
        assert_matches!(
            screen.screen("image/png", PNG).await,
            Err(CoreError::Validation(msg)) if msg.contains("88%")
        );
    }

    #[tokio::test]
    async fn moderator_outage_does_not_block() {
        let screen = UploadScreen::new(Arc::new(FixedModerator(None)));
        let upload = screen.screen("image/png", PNG).await.unwrap();
        assert!(upload.moderation.is_none());
    }

    #[tokio::test]
    async fn wrong_type_never_reaches_moderator() {
        let screen = UploadScreen::new(Arc::new(FixedModerator(None)));
        assert_matches!(
            screen.screen("text/plain", PNG).await,
            Err(CoreError::Validation(_))
        );
    }
}

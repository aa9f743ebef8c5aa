//! Upload screening rules and moderation scoring.
//!
//! The moderation model itself is an external collaborator; this module
//! only holds the acceptance rules applied around it.

use image::ImageFormat;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Largest accepted upload (5 MiB).
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Summed explicit-category probability above which an image is flagged.
pub const FLAG_THRESHOLD: f64 = 0.7;

/// Classifier categories counted towards the explicit score.
pub const EXPLICIT_CATEGORIES: &[&str] = &["Porn", "Hentai", "Sexy"];

/// One class probability reported by a classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub class_name: String,
    pub probability: f64,
}

/// The moderation collaborator's answer for one image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModerationVerdict {
    pub flagged: bool,
    /// Explicit score in `0.0..=1.0`.
    pub confidence: f64,
}

impl ModerationVerdict {
    /// Confidence as a whole percentage, for user-facing messages.
    pub fn confidence_percent(&self) -> u32 {
        (self.confidence.clamp(0.0, 1.0) * 100.0).round() as u32
    }
}

/// Score raw classifier output: sum the explicit categories and flag the
/// image when the sum exceeds [`FLAG_THRESHOLD`].
pub fn score_predictions(predictions: &[Prediction]) -> ModerationVerdict {
    let confidence: f64 = predictions
        .iter()
        .filter(|p| EXPLICIT_CATEGORIES.contains(&p.class_name.as_str()))
        .map(|p| p.probability)
        .sum();

    ModerationVerdict {
        flagged: confidence > FLAG_THRESHOLD,
        confidence,
    }
}

/// Check an upload's declared type, size, and header bytes.
///
/// Returns the sniffed image format on success.
pub fn validate_upload(content_type: &str, bytes: &[u8]) -> Result<ImageFormat, CoreError> {
    if !content_type.trim().to_ascii_lowercase().starts_with("image/") {
        return Err(CoreError::Validation(format!(
            "Only image uploads are accepted, got '{content_type}'"
        )));
    }
    if bytes.is_empty() {
        return Err(CoreError::Validation("Upload is empty".to_string()));
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(CoreError::Validation(format!(
            "Upload is {} bytes, the limit is 5 MB",
            bytes.len()
        )));
    }

    image::guess_format(bytes)
        .map_err(|_| CoreError::Validation("Upload is not a recognised image".to_string()))
}

/// Reject a flagged verdict with a message carrying its confidence.
pub fn check_verdict(verdict: &ModerationVerdict) -> Result<(), CoreError> {
    if verdict.flagged {
        return Err(CoreError::Validation(format!(
            "Inappropriate image detected (confidence: {}%)",
            verdict.confidence_percent()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

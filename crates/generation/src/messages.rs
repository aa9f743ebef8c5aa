//! Live progress feed message types and parser.
//!
//! The progress service sends JSON frames shaped
//! `{"type": "<kind>", "data": {...}}` with kinds `progress`,
//! `succeeded`, and `failed`.

use serde::Deserialize;
use toonify_core::job::{JobResults, StyledResult};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProgressUpdate {
    /// Intermediate progress.
    #[serde(rename = "progress")]
    Progress(ProgressData),

    /// The job finished; carries its outputs.
    #[serde(rename = "succeeded")]
    Succeeded(JobResults),

    /// The job failed on the backend.
    #[serde(rename = "failed")]
    Failed(FailedData),
}

impl ProgressUpdate {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }
}

/// Payload for `progress` frames.
///
/// Only `progress` is required; the tracker derives the phase from it and
/// uses the backend's `phase` only for logging. `current_step` replaces the
/// phase label, and any assets already produced are shown before the job
/// finishes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProgressData {
    /// Percentage in `0..=100`. Backends may overshoot or regress; the
    /// tracker clamps.
    pub progress: f64,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub time_remaining_ms: Option<u64>,
    #[serde(default)]
    pub mesh_model: Option<String>,
    #[serde(default)]
    pub styled_results: Vec<StyledResult>,
}

impl ProgressData {
    /// Assets carried by this update, if any.
    pub fn partial_results(&self) -> Option<JobResults> {
        if self.mesh_model.is_none() && self.styled_results.is_empty() {
            return None;
        }
        Some(JobResults {
            mesh_model: self.mesh_model.clone(),
            styled_results: self.styled_results.clone(),
        })
    }
}

/// Payload for `failed` frames.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FailedData {
    #[serde(default = "default_failure_message")]
    pub message: String,
}

fn default_failure_message() -> String {
    "Generation failed".to_string()
}

/// Parse a text frame. Returns `Err` for malformed JSON or unknown kinds;
/// callers log and skip those.
pub fn parse_message(text: &str) -> Result<ProgressUpdate, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_progress_message() {
        let json = r#"{"type":"progress","data":{"progress":42.5,"phase":"model","current_step":"Generating 3D model","time_remaining_ms":12000}}"#;
        match parse_message(json).unwrap() {
            ProgressUpdate::Progress(data) => {
                assert_eq!(data.progress, 42.5);
                assert_eq!(data.phase.as_deref(), Some("model"));
                assert_eq!(data.time_remaining_ms, Some(12_000));
            }
            other => panic!("Expected Progress, got {other:?}"),
        }
    }

    #[test]
    fn parse_minimal_progress() {
        let json = r#"{"type":"progress","data":{"progress":5}}"#;
        match parse_message(json).unwrap() {
            ProgressUpdate::Progress(data) => {
                assert!(data.phase.is_none());
                assert!(data.current_step.is_none());
                assert!(data.partial_results().is_none());
            }
            other => panic!("Expected Progress, got {other:?}"),
        }
    }

    #[test]
    fn progress_keeps_intermediate_assets() {
        let json = r#"{"type":"progress","data":{"progress":60,"phase":"stylize",
            "current_step":"Applying","mesh_model":"/m.glb","styled_results":[
            {"style":"anime","image_url":"/a.png","thumbnail_url":"/a_t.png"}]}}"#;
        match parse_message(json).unwrap() {
            ProgressUpdate::Progress(data) => {
                assert_eq!(data.current_step.as_deref(), Some("Applying"));
                let partial = data.partial_results().unwrap();
                assert_eq!(partial.mesh_model.as_deref(), Some("/m.glb"));
                assert_eq!(partial.styled_results[0].style, "anime");
            }
            other => panic!("Expected Progress, got {other:?}"),
        }
    }

    #[test]
    fn parse_succeeded_message() {
        let json = r#"{"type":"succeeded","data":{"mesh_model":"/m.glb","styled_results":[
            {"style":"anime","image_url":"/a.png","thumbnail_url":"/a_t.png"}]}}"#;
        let msg = parse_message(json).unwrap();
        assert!(msg.is_terminal());
        match msg {
            ProgressUpdate::Succeeded(results) => {
                assert_eq!(results.mesh_model.as_deref(), Some("/m.glb"));
                assert_eq!(results.styled_results[0].style, "anime");
            }
            other => panic!("Expected Succeeded, got {other:?}"),
        }
    }

    #[test]
    fn parse_failed_without_message() {
        let json = r#"{"type":"failed","data":{}}"#;
        match parse_message(json).unwrap() {
            ProgressUpdate::Failed(data) => assert_eq!(data.message, "Generation failed"),
            other => panic!("Expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_an_error() {
        assert!(parse_message(r#"{"type":"queued","data":{}}"#).is_err());
        assert!(parse_message("not json").is_err());
    }
}

//! Generation request model, style catalogue, and request validation.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Style catalogue
// ---------------------------------------------------------------------------

pub const STYLE_DISNEY: &str = "disney";
pub const STYLE_ANIME: &str = "anime";
pub const STYLE_PIXAR: &str = "pixar";
pub const STYLE_PIXEL: &str = "pixel";
pub const STYLE_WATERCOLOR: &str = "watercolor";
pub const STYLE_CARTOON: &str = "cartoon";
pub const STYLE_FANTASY: &str = "fantasy";

/// Every style a request may select.
pub const KNOWN_STYLES: &[&str] = &[
    STYLE_DISNEY,
    STYLE_ANIME,
    STYLE_PIXAR,
    STYLE_PIXEL,
    STYLE_WATERCOLOR,
    STYLE_CARTOON,
    STYLE_FANTASY,
];

/// Styles rendered when a request selects none.
pub const DEFAULT_STYLES: &[&str] = &[STYLE_DISNEY, STYLE_ANIME, STYLE_PIXAR];

/// Maximum number of styles per request.
pub const MAX_STYLE_SELECTIONS: usize = 3;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// What the user asks the generation collaborator to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Reference to the uploaded image (URL, data URI, or upload id).
    #[serde(default)]
    pub image_reference: String,
    #[serde(default)]
    pub style_selectors: Vec<String>,
}

impl GenerationRequest {
    pub fn new(image_reference: impl Into<String>, style_selectors: Vec<String>) -> Self {
        Self {
            image_reference: image_reference.into(),
            style_selectors,
        }
    }

    /// The requested styles, or [`DEFAULT_STYLES`] when none were chosen.
    pub fn effective_styles(&self) -> Vec<String> {
        if self.style_selectors.is_empty() {
            DEFAULT_STYLES.iter().map(|s| s.to_string()).collect()
        } else {
            self.style_selectors.clone()
        }
    }
}

/// Check a request before any quota or collaborator work.
///
/// Rejects a blank image reference, unknown or repeated styles, and more
/// than [`MAX_STYLE_SELECTIONS`] styles.
pub fn validate_generation_request(request: &GenerationRequest) -> Result<(), CoreError> {
    if request.image_reference.trim().is_empty() {
        return Err(CoreError::Validation(
            "An image is required to start a generation".to_string(),
        ));
    }

    if request.style_selectors.len() > MAX_STYLE_SELECTIONS {
        return Err(CoreError::Validation(format!(
            "At most {MAX_STYLE_SELECTIONS} styles may be selected, got {}",
            request.style_selectors.len()
        )));
    }

    for (i, style) in request.style_selectors.iter().enumerate() {
        if !KNOWN_STYLES.contains(&style.as_str()) {
            return Err(CoreError::Validation(format!(
                "Unknown style '{style}'. Must be one of: {}",
                KNOWN_STYLES.join(", ")
            )));
        }
        if request.style_selectors[..i].contains(style) {
            return Err(CoreError::Validation(format!(
                "Style '{style}' selected more than once"
            )));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Opaque optical capability seam.
//!
//! The rasterizer/recognizer itself is an external collaborator; the
//! pipeline only reruns its heuristic grammar over whatever text comes
//! back.

use crate::error::ExtractError;

/// Opaque rasterize-and-recognize capability. Possibly slow, possibly
/// failing; implementations own their wall-clock timeouts.
pub trait OpticalCapability: Send + Sync {
    /// Rasterize the document pages and return recognized raw text.
    fn rasterize_and_extract(&self, document: &[u8]) -> Result<String, ExtractError>;
}

/// Scripted capability for tests: returns a fixed text or a fixed failure.
pub struct FixedOptical {
    text: Option<String>,
}

impl FixedOptical {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }

    pub fn failing() -> Self {
        Self { text: None }
    }
}

impl OpticalCapability for FixedOptical {
    fn rasterize_and_extract(&self, _document: &[u8]) -> Result<String, ExtractError> {
        match &self.text {
            Some(text) => Ok(text.clone()),
            None => Err(ExtractError::Optical("scripted failure".to_string())),
        }
    }
}

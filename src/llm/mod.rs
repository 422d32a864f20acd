//! Remote generation backend
//!
//! The reasoning layer talks to the model through [`GenerationBackend`] so the
//! HTTP client can be swapped for a scripted double in tests.

use crate::Result;
use async_trait::async_trait;

pub mod gemini;
pub use gemini::GeminiClient;

/// Which model tier a call should run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Text,
    Vision,
}

/// Binary image sent alongside a prompt.
#[derive(Debug, Clone)]
pub struct ImagePart {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// A single generation call.
#[derive(Debug, Clone)]
pub struct GenerationCall {
    pub prompt: String,
    pub image: Option<ImagePart>,
    pub tier: ModelTier,
}

impl GenerationCall {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
            tier: ModelTier::Text,
        }
    }

    pub fn vision(prompt: impl Into<String>, image: ImagePart) -> Self {
        Self {
            prompt: prompt.into(),
            image: Some(image),
            tier: ModelTier::Vision,
        }
    }
}

/// Raw model output.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub finish_reason: Option<String>,
}

impl Generation {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: Some("STOP".to_string()),
        }
    }
}

/// Trait for remote text generation
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// One attempt. Retrying is the caller's concern.
    async fn generate(&self, call: &GenerationCall) -> Result<Generation>;
}

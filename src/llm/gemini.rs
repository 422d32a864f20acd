//! Gemini API client
//!
//! Uses a long-lived reqwest::Client for connection pooling and an explicit
//! per-call timeout so a stuck request cannot block a handler indefinitely.

use super::{Generation, GenerationBackend, GenerationCall, ModelTier};
use crate::config::Settings;
use crate::error::AgentError;
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    vision_model: String,
}

impl GeminiClient {
    pub fn new(settings: &Settings) -> crate::Result<Self> {
        let api_key = settings.require_api_key()?.to_string();

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(settings.request_timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            vision_model: settings.vision_model.clone(),
        })
    }

    fn endpoint(&self, tier: ModelTier) -> String {
        let model = match tier {
            ModelTier::Text => &self.model,
            ModelTier::Vision => &self.vision_model,
        };
        format!("{}/{}:generateContent", self.base_url, model)
    }

    /// Trivial round trip used by connectivity checks.
    pub async fn ping(&self) -> crate::Result<()> {
        self.generate(&GenerationCall::text("Ping")).await.map(|_| ())
    }
}

#[async_trait]
impl GenerationBackend for GeminiClient {
    async fn generate(&self, call: &GenerationCall) -> crate::Result<Generation> {
        let request = build_request(call);

        debug!(
            tier = ?call.tier,
            prompt_chars = call.prompt.len(),
            has_image = call.image.is_some(),
            "Calling Gemini API"
        );

        let response = self
            .client
            .post(self.endpoint(call.tier))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                if e.is_timeout() {
                    AgentError::Timeout(e.to_string())
                } else {
                    AgentError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Gemini API error response: {}", error_text);
            return Err(AgentError::from_status(status.as_u16(), error_text));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AgentError::Llm(format!("Gemini parse error: {}", e))
        })?;

        let generation = into_generation(gemini_response)?;

        info!(
            chars = generation.text.len(),
            finish_reason = generation.finish_reason.as_deref().unwrap_or("unknown"),
            "Gemini response received"
        );

        Ok(generation)
    }
}

fn build_request(call: &GenerationCall) -> GeminiRequest {
    let mut parts = vec![Part::text(&call.prompt)];
    if let Some(image) = &call.image {
        parts.push(Part {
            text: None,
            inline_data: Some(InlineData {
                mime_type: image.mime_type.clone(),
                data: base64::engine::general_purpose::STANDARD.encode(&image.data),
            }),
        });
    }

    GeminiRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts,
        }],
        generation_config: GenerationConfig {
            temperature: 0.3,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 4096,
        },
    }
}

fn into_generation(response: GeminiResponse) -> crate::Result<Generation> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(AgentError::EmptyResponse)?;

    let text: String = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(AgentError::EmptyResponse);
    }

    Ok(Generation {
        text,
        finish_reason: candidate.finish_reason,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            inline_data: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ImagePart;

    #[test]
    fn test_request_serialization() {
        let call = GenerationCall::vision(
            "What is this invoice?",
            ImagePart {
                mime_type: "image/png".to_string(),
                data: vec![1, 2, 3],
            },
        );

        let json = serde_json::to_value(build_request(&call)).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "What is this invoice?");
        assert_eq!(json["contents"][0]["parts"][1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(json["contents"][0]["parts"][1]["inlineData"]["data"], "AQID");
        assert!(json["generationConfig"]["maxOutputTokens"].is_number());
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello "}, {"text": "sir"}]},
                "finishReason": "STOP"
            }]
        }"#;
        let response: GeminiResponse = serde_json::from_str(raw).unwrap();
        let generation = into_generation(response).unwrap();
        assert_eq!(generation.text, "Hello sir");
        assert_eq!(generation.finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn test_empty_candidates_is_empty_response() {
        let response: GeminiResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(matches!(into_generation(response), Err(AgentError::EmptyResponse)));

        let blocked: GeminiResponse =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#).unwrap();
        assert!(matches!(into_generation(blocked), Err(AgentError::EmptyResponse)));
    }
}

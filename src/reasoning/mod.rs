//! Reasoning call layer
//!
//! Composes the generation backend, retry executor, segmenter and extractor
//! into the three call shapes the agents use:
//! - `think`: persona + situation + question
//! - `see_and_think`: the same over an image or document file
//! - `discuss`: a multi-turn transcript plus a new message
//!
//! Remote failures propagate out of `think` and `discuss`. `see_and_think`
//! absorbs every failure into a degraded result flagged for human review.

use crate::config::Settings;
use crate::extractor;
use crate::llm::{GeminiClient, Generation, GenerationBackend, GenerationCall};
use crate::models::{ChatTurn, GenerationRequest, GenerationResult, Record, ResponseFormat};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::segmenter;
use crate::Result;
use chrono::Utc;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub mod document;

use document::DocumentPayload;

pub const THINK_ORIGIN: &str = "reasoner";
pub const VISION_ORIGIN: &str = "vision-reasoner";
pub const DIALOGUE_ORIGIN: &str = "dialogue-reasoner";

/// Call shape, used to pick the heuristic base confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallShape {
    Think,
    Vision,
    Dialogue,
}

impl CallShape {
    fn origin(self) -> &'static str {
        match self {
            CallShape::Think => THINK_ORIGIN,
            CallShape::Vision => VISION_ORIGIN,
            CallShape::Dialogue => DIALOGUE_ORIGIN,
        }
    }

    fn base_confidence(self) -> f32 {
        match self {
            CallShape::Think => 0.90,
            CallShape::Vision => 0.85,
            CallShape::Dialogue => 0.95,
        }
    }
}

pub struct Reasoner {
    backend: Arc<dyn GenerationBackend>,
    retry: RetryExecutor,
    document_char_budget: usize,
}

impl Reasoner {
    pub fn new(backend: Arc<dyn GenerationBackend>, retry: RetryExecutor) -> Self {
        Self {
            backend,
            retry,
            document_char_budget: Settings::default().document_char_budget,
        }
    }

    /// Gemini-backed reasoner configured from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let backend = Arc::new(GeminiClient::new(settings)?);
        let retry = RetryExecutor::new(RetryPolicy::new(
            settings.retry_max_attempts,
            settings.retry_base_delay,
        ));
        Ok(Self::new(backend, retry).with_document_char_budget(settings.document_char_budget))
    }

    pub fn with_document_char_budget(mut self, budget: usize) -> Self {
        self.document_char_budget = budget;
        self
    }

    /// Plain reasoning over a persona, a situation and a question.
    pub async fn think(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let mut prompt = format!(
            "{}\n\nCURRENT SITUATION:\n{}\n\nQUESTION FOR YOU:\n{}\n\nThink through this step by step, then give your answer.\n",
            request.persona.trim(),
            request.context.trim(),
            request.question.trim(),
        );

        if request.format == ResponseFormat::Structured {
            prompt.push_str(
                "\nAfter your reasoning, write a line starting with \"JSON:\" followed by your \
                 final answer as a single valid JSON object.\n",
            );
        }

        let generation = self.call(GenerationCall::text(prompt)).await?;
        Ok(self.finish(CallShape::Think, &request.question, request.format, &generation))
    }

    /// Reason over a file. Never fails: problems come back as a degraded
    /// result with zero confidence and `needs_human_review` set.
    pub async fn see_and_think(&self, persona: &str, path: &Path, question: &str) -> GenerationResult {
        match self.try_see_and_think(persona, path, question).await {
            Ok(result) => result,
            Err(e) => {
                warn!(file = %path.display(), "Document reasoning degraded: {}", e);
                GenerationResult::degraded(
                    VISION_ORIGIN,
                    question,
                    format!("Error processing document: {}", e),
                    format!(
                        "I encountered an error while trying to read the document ({}): {}",
                        display_name(path),
                        e
                    ),
                )
            }
        }
    }

    async fn try_see_and_think(
        &self,
        persona: &str,
        path: &Path,
        question: &str,
    ) -> Result<GenerationResult> {
        let payload = document::load_document(path, self.document_char_budget).await?;

        let call = match payload {
            DocumentPayload::Image(image) => GenerationCall::vision(
                format!(
                    "{}\n\nQUESTION: {}\n\nAnalyze this document and think step-by-step.",
                    persona.trim(),
                    question.trim()
                ),
                image,
            ),
            DocumentPayload::Text { text, truncated } => {
                info!(
                    file = %path.display(),
                    chars = text.len(),
                    truncated,
                    "Inlining extracted document text"
                );
                GenerationCall::text(format!(
                    "{}\n\nDOCUMENT: {}\nCONTENT (extracted text{}):\n---\n{}\n---\n\nQUESTION: {}\n\nAnalyze this document and think step-by-step.",
                    persona.trim(),
                    display_name(path),
                    if truncated { ", truncated" } else { "" },
                    text,
                    question.trim()
                ))
            }
        };

        let generation = self.call(call).await?;
        let result = self.finish(CallShape::Vision, question, ResponseFormat::Text, &generation);

        if result.final_answer.is_empty() {
            return Err(crate::error::AgentError::EmptyResponse);
        }
        Ok(result)
    }

    /// Continue a conversation given its transcript.
    pub async fn discuss(
        &self,
        persona: &str,
        history: &[ChatTurn],
        new_message: &str,
    ) -> Result<GenerationResult> {
        let transcript: String = history
            .iter()
            .map(|turn| format!("{}: {}\n", turn.role, turn.content))
            .collect();

        let prompt = format!(
            "{}\n\nCONVERSATION HISTORY:\n{}\nUSER MESSAGE:\n{}\n\nThink step-by-step about the context, then respond.\n",
            persona.trim(),
            transcript,
            new_message.trim(),
        );

        let generation = self.call(GenerationCall::text(prompt)).await?;
        Ok(self.finish(CallShape::Dialogue, new_message, ResponseFormat::Text, &generation))
    }

    async fn call(&self, call: GenerationCall) -> Result<Generation> {
        self.retry.execute(|| self.backend.generate(&call)).await
    }

    fn finish(
        &self,
        shape: CallShape,
        query: &str,
        format: ResponseFormat,
        generation: &Generation,
    ) -> GenerationResult {
        let segments = segmenter::segment(&generation.text);

        let requested = match format {
            ResponseFormat::Structured => {
                requested_confidence(&extractor::extract_mapping(&segments.final_answer))
            }
            ResponseFormat::Text => None,
        };
        let confidence = requested.unwrap_or_else(|| heuristic_confidence(shape, generation));

        GenerationResult {
            origin: shape.origin().to_string(),
            query: query.to_string(),
            rationale: segments.rationale,
            final_answer: segments.final_answer,
            confidence,
            needs_human_review: false,
            timestamp: Utc::now(),
        }
    }
}

/// Confidence derived from call shape, finish reason and answer length.
fn heuristic_confidence(shape: CallShape, generation: &Generation) -> f32 {
    let finish_confidence = match generation.finish_reason.as_deref() {
        Some("STOP") => 1.0,
        Some("MAX_TOKENS") | Some("LENGTH") => 0.8,
        Some("SAFETY") | Some("RECITATION") => 0.6,
        _ => 0.9,
    };

    let length = generation.text.trim().len();
    let length_confidence = if length < 50 {
        0.7
    } else if length > 8000 {
        0.85
    } else {
        1.0
    };

    (shape.base_confidence() * finish_confidence * length_confidence).clamp(0.0, 1.0)
}

/// A model-reported confidence, when one was asked for and is usable.
fn requested_confidence(answer: &Record) -> Option<f32> {
    ["confidence_score", "confidence"]
        .iter()
        .filter_map(|key| answer.get(*key).and_then(Value::as_f64))
        .find(|v| (0.0..=1.0).contains(v))
        .map(|v| v as f32)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::llm::testing::ScriptedBackend;
    use crate::llm::ModelTier;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn reasoner(backend: Arc<ScriptedBackend>) -> Reasoner {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            jitter_unit: Duration::from_millis(1),
        };
        Reasoner::new(backend, RetryExecutor::new(policy))
    }

    #[tokio::test]
    async fn test_think_segments_and_scores() {
        let backend = Arc::new(ScriptedBackend::with_replies(&[
            "Balances look fine across both banks.\nFinal Answer: We are comfortable this week.",
        ]));
        let result = reasoner(backend.clone())
            .think(&GenerationRequest::new("You are Arjun.", "BANK: 28L", "How is cash?"))
            .await;

        let result = assert_ok!(result);
        assert_eq!(result.origin, THINK_ORIGIN);
        assert_eq!(result.query, "How is cash?");
        assert_eq!(result.rationale, "Balances look fine across both banks.");
        assert_eq!(result.final_answer, "We are comfortable this week.");
        assert!(!result.needs_human_review);
        assert!(result.confidence > 0.0 && result.confidence <= 1.0);

        let prompt = &backend.prompts()[0];
        assert!(prompt.starts_with("You are Arjun."));
        assert!(prompt.contains("CURRENT SITUATION:\nBANK: 28L"));
        assert!(prompt.contains("QUESTION FOR YOU:\nHow is cash?"));
        assert!(!prompt.contains("JSON:"));
    }

    #[tokio::test]
    async fn test_structured_request_uses_reported_confidence() {
        let backend = Arc::new(ScriptedBackend::with_replies(&[
            "Looks like an invoice.\nJSON: {\"document_type\": \"invoice\", \"confidence_score\": 0.42}",
        ]));
        let result = reasoner(backend.clone())
            .think(&GenerationRequest::new("p", "c", "q").structured())
            .await
            .unwrap();

        assert!((result.confidence - 0.42).abs() < 1e-6);
        assert!(backend.prompts()[0].contains("\"JSON:\""));
    }

    #[tokio::test]
    async fn test_think_propagates_permanent_error() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_error(AgentError::from_status(400, "bad request".into()));

        let result = reasoner(backend.clone())
            .think(&GenerationRequest::new("p", "c", "q"))
            .await;
        assert!(matches!(assert_err!(result), AgentError::InvalidRequest { .. }));
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_think_retries_transient_then_succeeds() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_error(AgentError::from_status(429, "quota".into()));
        backend.push_reply("Single answer.");

        let result = reasoner(backend.clone())
            .think(&GenerationRequest::new("p", "c", "q"))
            .await
            .unwrap();
        assert_eq!(result.final_answer, "Single answer.");
        assert_eq!(backend.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_see_and_think_missing_file_degrades() {
        let backend = Arc::new(ScriptedBackend::new());
        let result = reasoner(backend.clone())
            .see_and_think("You are Meera.", Path::new("/no/such/invoice.jpg"), "What is this?")
            .await;

        assert_eq!(result.confidence, 0.0);
        assert!(result.needs_human_review);
        assert!(result.rationale.contains("Error processing document"));
        assert!(result.final_answer.contains("invoice.jpg"));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_see_and_think_exhausted_retries_degrade() {
        let path = std::env::temp_dir().join(format!("cfo-{}.txt", uuid::Uuid::new_v4()));
        std::fs::write(&path, "Invoice 17, total 1,18,000").unwrap();

        let backend = Arc::new(ScriptedBackend::new());
        for _ in 0..3 {
            backend.push_error(AgentError::from_status(503, "overloaded".into()));
        }

        let result = reasoner(backend.clone())
            .see_and_think("persona", &path, "What is this?")
            .await;

        assert_eq!(result.confidence, 0.0);
        assert!(result.needs_human_review);
        assert_eq!(backend.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_see_and_think_inlines_text_documents() {
        let path = std::env::temp_dir().join(format!("cfo-{}.csv", uuid::Uuid::new_v4()));
        std::fs::write(&path, "vendor,amount\nUltraTech,450000\n").unwrap();

        let backend = Arc::new(ScriptedBackend::with_replies(&[
            "It is a payables extract.\n\nOne vendor, 4.5L due.",
        ]));
        let result = reasoner(backend.clone())
            .see_and_think("persona", &path, "Summarise")
            .await;

        assert_eq!(result.origin, VISION_ORIGIN);
        assert_eq!(result.final_answer, "One vendor, 4.5L due.");
        let calls = backend.calls();
        assert_eq!(calls[0].tier, ModelTier::Text);
        assert!(calls[0].image.is_none());
        assert!(calls[0].prompt.contains("UltraTech,450000"));
    }

    #[tokio::test]
    async fn test_discuss_renders_transcript() {
        let backend = Arc::new(ScriptedBackend::with_replies(&["Response: Noted, sir."]));
        let history = vec![
            ChatTurn::new("User", "Any payments today?"),
            ChatTurn::new("Priya", "Two, both statutory."),
        ];

        let result = reasoner(backend.clone())
            .discuss("You are Priya.", &history, "Pay them.")
            .await
            .unwrap();

        assert_eq!(result.origin, DIALOGUE_ORIGIN);
        assert_eq!(result.final_answer, "Noted, sir.");
        let prompt = &backend.prompts()[0];
        assert!(prompt.contains("User: Any payments today?\nPriya: Two, both statutory.\n"));
        assert!(prompt.contains("USER MESSAGE:\nPay them."));
    }

    #[test]
    fn test_heuristic_confidence_bounds() {
        let short = Generation {
            text: "ok".to_string(),
            finish_reason: Some("SAFETY".to_string()),
        };
        let c = heuristic_confidence(CallShape::Vision, &short);
        assert!(c > 0.0 && c < 0.5);

        let normal = Generation::new("x".repeat(200));
        assert!((heuristic_confidence(CallShape::Dialogue, &normal) - 0.95).abs() < 1e-6);
    }
}

//! Core data models for the assistant

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// A key-value record as read from the finance store or extracted from text.
pub type Record = Map<String, Value>;

//
// ================= Generation =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    Structured,
}

/// One reasoning request: persona + situation + question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub persona: String,
    pub context: String,
    pub question: String,
    #[serde(default)]
    pub format: ResponseFormat,
}

impl GenerationRequest {
    pub fn new(
        persona: impl Into<String>,
        context: impl Into<String>,
        question: impl Into<String>,
    ) -> Self {
        Self {
            persona: persona.into(),
            context: context.into(),
            question: question.into(),
            format: ResponseFormat::Text,
        }
    }

    pub fn structured(mut self) -> Self {
        self.format = ResponseFormat::Structured;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Which call shape produced this result
    pub origin: String,
    pub query: String,
    pub rationale: String,
    pub final_answer: String,
    pub confidence: f32,
    pub needs_human_review: bool,
    pub timestamp: DateTime<Utc>,
}

impl GenerationResult {
    /// Result for a call that could not be completed.
    pub fn degraded(origin: &str, query: &str, rationale: String, final_answer: String) -> Self {
        Self {
            origin: origin.to_string(),
            query: query.to_string(),
            rationale,
            final_answer,
            confidence: 0.0,
            needs_human_review: true,
            timestamp: Utc::now(),
        }
    }
}

//
// ================= Dialogue =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

//
// ================= Documents =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub document_id: String,
    /// Open vocabulary chosen by the model ("invoice", "ra_bill", ...)
    pub document_kind: String,
    pub source_file: String,
    /// SHA-256 of the file bytes, empty when the file could not be read
    pub content_digest: String,
    pub extracted_at: DateTime<Utc>,
    pub raw_analysis: String,
    pub fields: Record,
    pub validation_notes: String,
    pub needs_human_review: bool,
}

//
// ================= Conversation =================
//

/// Per-conversation state owned by the decision router.
///
/// Holds at most one pending decision; posting a new one replaces it.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ConversationContext {
    pub pending_decision: Option<String>,
    pub last_message: Option<String>,
    #[serde(default)]
    pub pending: Record,
}

impl ConversationContext {
    pub fn pending_decision_text(&self) -> &str {
        self.pending_decision.as_deref().unwrap_or("None")
    }

    pub fn last_message_text(&self) -> &str {
        self.last_message.as_deref().unwrap_or("None")
    }
}

//
// ================= Feedback =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackCategory {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub event_id: Uuid,
    pub conversation_id: String,
    pub category: FeedbackCategory,
    pub score: f32,
    /// The understanding text the judgment was derived from
    pub source_text: String,
    pub original_message: String,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for FeedbackCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FeedbackCategory::Positive => "positive",
            FeedbackCategory::Neutral => "neutral",
            FeedbackCategory::Negative => "negative",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResponseFormat::Text => "text",
            ResponseFormat::Structured => "structured",
        };
        write!(f, "{}", s)
    }
}

//! Decision router
//!
//! Classifies each inbound human message against the conversation's pending
//! decision, then either hands it to the decision handler or answers with
//! the classifier's suggested reply. Handling is serialised per conversation.

use crate::extractor;
use crate::feedback::FeedbackSink;
use crate::models::{ConversationContext, FeedbackCategory, FeedbackEvent, GenerationRequest, Record};
use crate::reasoning::Reasoner;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub mod context_store;

pub use context_store::{build_context_store, ContextStore, InMemoryContextStore, PostgresContextStore};

pub const DEFAULT_HANDOFF_REPLY: &str = "I've processed your response, sir.";
pub const DEFAULT_DIRECT_REPLY: &str = "I've noted that. Is there anything else?";

const CLASSIFY_QUESTION: &str = r#"What is the human telling us?
Think about their intent. Are they approving, rejecting, asking a question, or giving instructions?

Give your answer as a JSON object with keys:
- "intent": (approval/rejection/question/instruction/acknowledgment)
- "is_decision": (boolean)
- "explanation": (what you understood)
- "reply_suggestion": (how we should reply)"#;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Approval,
    Rejection,
    Question,
    Instruction,
    Acknowledgment,
    /// Missing or unrecognised judgment
    Unknown,
}

impl Intent {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "approval" | "approve" => Intent::Approval,
            "rejection" | "reject" => Intent::Rejection,
            "question" => Intent::Question,
            "instruction" => Intent::Instruction,
            "acknowledgment" | "acknowledgement" => Intent::Acknowledgment,
            _ => Intent::Unknown,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Intent::Approval => "approval",
            Intent::Rejection => "rejection",
            Intent::Question => "question",
            Intent::Instruction => "instruction",
            Intent::Acknowledgment => "acknowledgment",
            Intent::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// The model's judgment of one inbound message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub intent: Intent,
    /// The model's own decision flag
    pub is_decision: bool,
    pub explanation: String,
    pub reply_suggestion: Option<String>,
}

impl Classification {
    /// Interpret an extracted mapping. Anything missing falls back to the
    /// conservative reading: unknown intent, not a decision.
    pub fn from_mapping(map: &Record) -> Self {
        let intent = map
            .get("intent")
            .and_then(Value::as_str)
            .map(Intent::parse)
            .unwrap_or(Intent::Unknown);

        let is_decision = match map.get("is_decision") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        };

        let text = |key: &str| {
            map.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Self {
            intent,
            is_decision,
            explanation: text("explanation").unwrap_or_default(),
            reply_suggestion: text("reply_suggestion"),
        }
    }

    /// Whether the message resolves a decision and needs the deeper handoff.
    pub fn needs_handoff(&self) -> bool {
        self.is_decision || matches!(self.intent, Intent::Approval | Intent::Rejection)
    }
}

/// What the decision handler made of a human reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub understanding: String,
    pub needs_clarification: bool,
}

/// Deeper processing for messages that resolve a pending decision.
#[async_trait]
pub trait DecisionHandler: Send + Sync {
    async fn process_response(
        &self,
        message: &str,
        context: &ConversationContext,
    ) -> Result<DecisionOutcome>;
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteOutcome {
    pub conversation_id: String,
    pub classification: Classification,
    pub handed_off: bool,
    pub needs_clarification: bool,
    pub reply: String,
    pub feedback: Option<FeedbackEvent>,
}

pub struct DecisionRouter {
    reasoner: Arc<Reasoner>,
    persona: String,
    handler: Arc<dyn DecisionHandler>,
    store: Arc<dyn ContextStore>,
    feedback: Arc<dyn FeedbackSink>,
    locks: LockMap,
    reply_limit: usize,
}

type LockMap = StdMutex<HashMap<String, Arc<Mutex<()>>>>;

/// Holds one conversation's lock and drops its map entry once nobody else
/// is waiting on it.
struct ConversationGuard<'a> {
    locks: &'a LockMap,
    conversation_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ConversationGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let idle = locks
            .get(&self.conversation_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.conversation_id);
        }
    }
}

impl DecisionRouter {
    pub fn new(
        reasoner: Arc<Reasoner>,
        persona: impl Into<String>,
        handler: Arc<dyn DecisionHandler>,
        store: Arc<dyn ContextStore>,
        feedback: Arc<dyn FeedbackSink>,
    ) -> Self {
        Self {
            reasoner,
            persona: persona.into(),
            handler,
            store,
            feedback,
            locks: StdMutex::new(HashMap::new()),
            reply_limit: 3_000,
        }
    }

    pub fn with_reply_limit(mut self, limit: usize) -> Self {
        self.reply_limit = limit;
        self
    }

    /// Exclusive access to one conversation for the lifetime of the guard.
    async fn lock_conversation(&self, conversation_id: &str) -> ConversationGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(conversation_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        ConversationGuard {
            locks: &self.locks,
            conversation_id: conversation_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    pub async fn context(&self, conversation_id: &str) -> Result<ConversationContext> {
        Ok(self.store.load(conversation_id).await?.unwrap_or_default())
    }

    /// Ask the model what `message` means given the pending decision.
    ///
    /// Remote failures propagate. An unparseable judgment is not.
    pub async fn classify(
        &self,
        message: &str,
        context: &ConversationContext,
    ) -> Result<Classification> {
        let situation = format!(
            "PENDING ITEMS WE'RE WAITING FOR RESPONSE ON: {}\nLAST MESSAGE WE SENT: {}\nHUMAN'S MESSAGE: {}",
            context.pending_decision_text(),
            context.last_message_text(),
            message
        );

        let request = GenerationRequest::new(&self.persona, situation, CLASSIFY_QUESTION).structured();
        let result = self.reasoner.think(&request).await?;

        let mut map = extractor::extract_mapping(&result.final_answer);
        if map.is_empty() {
            map = extractor::extract_mapping(&result.rationale);
        }
        if map.is_empty() {
            debug!("Classifier judgment unparseable, using conservative default");
        }

        Ok(Classification::from_mapping(&map))
    }

    /// Classify `message` and produce the reply for `conversation_id`.
    pub async fn route(&self, conversation_id: &str, message: &str) -> Result<RouteOutcome> {
        let _guard = self.lock_conversation(conversation_id).await;
        let mut context = self.context(conversation_id).await?;

        let classification = self.classify(message, &context).await?;
        info!(
            conversation_id,
            intent = %classification.intent,
            is_decision = classification.is_decision,
            "Classified inbound message"
        );

        let mut handed_off = false;
        let mut needs_clarification = false;
        let mut feedback = None;

        let reply = if classification.needs_handoff() {
            handed_off = true;
            let outcome = self.handler.process_response(message, &context).await?;
            needs_clarification = outcome.needs_clarification;

            if !needs_clarification {
                if let Some(event) = score(conversation_id, &outcome.understanding, message) {
                    self.feedback.record(event.clone()).await?;
                    feedback = Some(event);
                }
                context.pending_decision = None;
                context.pending.clear();
            }

            non_empty_or(outcome.understanding, DEFAULT_HANDOFF_REPLY)
        } else {
            non_empty_or(
                classification.reply_suggestion.clone().unwrap_or_default(),
                DEFAULT_DIRECT_REPLY,
            )
        };

        let reply = fit_reply(&reply, self.reply_limit);
        context.last_message = Some(reply.clone());
        self.store.save(conversation_id, &context).await?;

        Ok(RouteOutcome {
            conversation_id: conversation_id.to_string(),
            classification,
            handed_off,
            needs_clarification,
            reply,
            feedback,
        })
    }

    /// Record a decision the human is now expected to answer.
    ///
    /// Only one decision is tracked per conversation; an unresolved one is
    /// replaced.
    pub async fn post_decision(
        &self,
        conversation_id: &str,
        decision: &str,
        pending: Record,
    ) -> Result<()> {
        let _guard = self.lock_conversation(conversation_id).await;
        let mut context = self.context(conversation_id).await?;

        if let Some(previous) = &context.pending_decision {
            warn!(
                conversation_id,
                previous = %previous,
                "Replacing unresolved pending decision"
            );
        }

        context.pending_decision = Some(decision.to_string());
        context.pending = pending;
        self.store.save(conversation_id, &context).await
    }

    /// Remember an outbound message sent outside of `route`.
    pub async fn note_outbound(&self, conversation_id: &str, text: &str) -> Result<()> {
        let _guard = self.lock_conversation(conversation_id).await;
        let mut context = self.context(conversation_id).await?;
        context.last_message = Some(text.to_string());
        self.store.save(conversation_id, &context).await
    }
}

/// Grade a resolved decision from the handler's understanding text.
///
/// Returns `None` when the understanding says it is unclear: that is a failure
/// to interpret, not a judgment.
pub fn score(conversation_id: &str, understanding: &str, original: &str) -> Option<FeedbackEvent> {
    let lowered = understanding.to_lowercase();
    if lowered.contains("unclear") {
        return None;
    }

    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    // "confirmation" is boilerplate in handler replies, only "confirmed" counts
    let positive = ["approve", "confirmed"].iter().any(|cue| lowered.contains(cue))
        || words.contains(&"yes");
    let negative = ["reject", "cancel"].iter().any(|cue| lowered.contains(cue))
        || words.contains(&"no");

    let (category, score) = if positive {
        (FeedbackCategory::Positive, 1.0)
    } else if negative {
        (FeedbackCategory::Negative, 0.0)
    } else {
        (FeedbackCategory::Neutral, 0.5)
    };

    Some(FeedbackEvent {
        event_id: Uuid::new_v4(),
        conversation_id: conversation_id.to_string(),
        category,
        score,
        source_text: understanding.to_string(),
        original_message: original.to_string(),
        created_at: Utc::now(),
    })
}

fn non_empty_or(text: String, fallback: &str) -> String {
    if text.trim().is_empty() {
        fallback.to_string()
    } else {
        text
    }
}

/// Cut a reply to the chat presentation limit.
pub fn fit_reply(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit.saturating_sub(1)).collect();
    out.push('…');
    out
}

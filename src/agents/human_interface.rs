//! Human interface: everything the CFO reads on their phone goes through here.

use super::cfo::{Cfo, DailyBriefing};
use super::personas;
use crate::models::{GenerationRequest, Record};
use crate::reasoning::Reasoner;
use crate::router::{fit_reply, DecisionRouter, RouteOutcome};
use crate::Result;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const GREETING: &str = "Priya at your service, sir. How can I help you today?";
pub const UPLOAD_ACK: &str = "I've received the document. Meera and Rajesh are looking at it now...";

const FORMAT_QUESTION: &str = r#"Format this briefing for a busy executive reading on their phone. Make it:
- Easy to scan quickly
- Use emojis to highlight key points
- Put the most important thing first
- Make the action items crystal clear
- Tell them exactly how to respond

Keep it under 3000 characters. Make sure they can respond with simple words like YES, NO, APPROVE, HOLD."#;

const ALERT_QUESTION: &str = r#"Format this as an URGENT alert message. Make it:
- Immediately clear this is urgent
- Say what the problem is in one line
- Say what action is needed
- Give them a way to respond quickly

Use the 🚨 emoji to grab attention."#;

pub struct HumanInterface {
    reasoner: Arc<Reasoner>,
    cfo: Arc<Cfo>,
    router: Arc<DecisionRouter>,
    chat_limit: usize,
}

impl HumanInterface {
    pub fn new(
        reasoner: Arc<Reasoner>,
        cfo: Arc<Cfo>,
        router: Arc<DecisionRouter>,
        chat_limit: usize,
    ) -> Self {
        Self {
            reasoner,
            cfo,
            router,
            chat_limit,
        }
    }

    pub fn router(&self) -> &Arc<DecisionRouter> {
        &self.router
    }

    pub fn cfo(&self) -> &Arc<Cfo> {
        &self.cfo
    }

    /// Phone-friendly rendering of a briefing.
    pub async fn format_for_human(&self, briefing: &DailyBriefing) -> Result<String> {
        let context = format!(
            "CFO'S BRIEFING: {}\nACTIONS NEEDING DECISION: {}",
            briefing.briefing, briefing.actions_needed
        );
        let formatted = self
            .reasoner
            .think(&GenerationRequest::new(personas::HUMAN_INTERFACE, context, FORMAT_QUESTION))
            .await?;
        Ok(fit_reply(&formatted.final_answer, self.chat_limit))
    }

    pub async fn format_alert(&self, alert: &Value) -> Result<String> {
        let formatted = self
            .reasoner
            .think(&GenerationRequest::new(
                personas::HUMAN_INTERFACE,
                format!("ALERT DATA: {}", alert),
                ALERT_QUESTION,
            ))
            .await?;
        Ok(fit_reply(&formatted.final_answer, self.chat_limit))
    }

    /// Build today's briefing and make its actions the pending decision.
    pub async fn prepare_briefing(&self, conversation_id: &str) -> Result<String> {
        let briefing = self.cfo.create_daily_briefing().await?;
        let formatted = self.format_for_human(&briefing).await?;

        let mut pending = Record::new();
        pending.insert("actions_needed".to_string(), json!(briefing.actions_needed));
        pending.insert("briefing".to_string(), json!(briefing.briefing));

        self.router
            .post_decision(conversation_id, &briefing.actions_needed, pending)
            .await?;
        self.router.note_outbound(conversation_id, &formatted).await?;

        info!(conversation_id, chars = formatted.chars().count(), "Briefing ready to send");
        Ok(formatted)
    }

    /// Route an inbound text message.
    pub async fn handle_text(&self, conversation_id: &str, message: &str) -> Result<RouteOutcome> {
        self.router.route(conversation_id, message).await
    }

    /// Review an uploaded document. Always produces a chat-safe reply.
    pub async fn handle_upload(&self, conversation_id: &str, path: &Path) -> String {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let reply = match self.cfo.handle_new_document(path).await {
            Ok(review) => format!("Update on {}:\n\n{}", file_name, review.cfo_decision),
            Err(e) => {
                error!(file = %path.display(), "Document review failed: {}", e);
                format!(
                    "I couldn't finish reviewing {} ({}). Please check it manually or send it again.",
                    file_name, e
                )
            }
        };

        let reply = fit_reply(&reply, self.chat_limit);
        if let Err(e) = self.router.note_outbound(conversation_id, &reply).await {
            warn!(conversation_id, "Could not record outbound message: {}", e);
        }
        reply
    }
}

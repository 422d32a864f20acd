//! CFO: briefings, document decisions and the decision handoff.

use super::doc_processor::DocProcessor;
use super::finance_manager::FinanceManager;
use super::personas;
use crate::models::{ConversationContext, ExtractedDocument, GenerationRequest, GenerationResult};
use crate::reasoning::Reasoner;
use crate::router::{DecisionHandler, DecisionOutcome};
use crate::Result;
use async_trait::async_trait;
use chrono::Local;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const BRIEFING_QUESTION: &str = r#"As CFO, prepare your daily briefing. Think about:
1. What's the ONE thing I must focus on today?
2. What decisions need to be made right now?
3. What can wait?
4. Any red flags I should be worried about?
5. Any good news?

Create a briefing that starts with the most important thing, is clear about what needs my
decision, gives enough context to decide and skips details I don't need.
Format it for a busy person reading on their phone."#;

const ACTIONS_QUESTION: &str = r#"What specific decisions/approvals do I need from the human?
For each decision:
- What is the decision?
- What are the options?
- What do I recommend?
- How should they respond?

Format as a clear list of action items."#;

const DOCUMENT_QUESTION: &str = r#"What should we do with this document? Think about:
1. Is the extraction reliable?
2. Should this go into our system automatically?
3. Does a human need to verify anything?
4. Any immediate actions needed?
5. How should I inform the human CFO?

Give me your decision and reasoning."#;

const RESPONSE_QUESTION: &str = r#"What is the human telling us? Think about:
1. What did they approve or reject?
2. Did they modify anything?
3. Did they ask for more information?
4. What actions should we take now?

If their response is unclear, say it is unclear and what we should ask.

Give me:
- What I understood
- Actions to take
- Confirmation message to send back"#;

const UNUSUAL_QUESTION: &str = r#"This is an unusual situation. How should we handle it? Think about:
1. What's the risk if we do nothing?
2. What's the safest action?
3. Should I involve the human CFO?
4. Is this urgent or can it wait?

When in doubt, I prefer to ask the human rather than guess."#;

#[derive(Debug, Clone, Serialize)]
pub struct DailyBriefing {
    pub briefing: String,
    pub actions_needed: String,
    pub cash_analysis: String,
    pub payment_recommendation: String,
    pub collection_status: String,
    pub goals_analysis: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentReview {
    pub extraction: ExtractedDocument,
    pub cfo_decision: String,
}

pub struct Cfo {
    reasoner: Arc<Reasoner>,
    finance: Arc<FinanceManager>,
    documents: Arc<DocProcessor>,
}

impl Cfo {
    pub fn new(
        reasoner: Arc<Reasoner>,
        finance: Arc<FinanceManager>,
        documents: Arc<DocProcessor>,
    ) -> Self {
        Self {
            reasoner,
            finance,
            documents,
        }
    }

    async fn think(&self, context: String, question: &str) -> Result<GenerationResult> {
        self.reasoner
            .think(&GenerationRequest::new(personas::CFO, context, question))
            .await
    }

    /// Morning briefing plus the actions that need a human decision.
    pub async fn create_daily_briefing(&self) -> Result<DailyBriefing> {
        let cash = self.finance.analyze_cash_position().await?;
        let payments = self.finance.recommend_payments(&cash.final_answer).await?;
        let collections = self.finance.analyze_collections().await?;
        let goals = self.finance.analyze_financial_goals().await?;

        let today = Local::now();
        let context = format!(
            "FINANCE MANAGER'S CASH ANALYSIS: {}\nFINANCE MANAGER'S PAYMENT RECOMMENDATIONS: {}\nFINANCE MANAGER'S COLLECTION STATUS: {}\nFINANCE MANAGER'S GOALS REVIEW: {}\nTODAY: {}\nDAY: {}",
            cash.final_answer,
            payments.final_answer,
            collections.final_answer,
            goals.final_answer,
            today.date_naive(),
            today.format("%A"),
        );
        let briefing = self.think(context, BRIEFING_QUESTION).await?;

        let actions = self
            .think(format!("My briefing: {}", briefing.final_answer), ACTIONS_QUESTION)
            .await?;

        info!("Daily briefing prepared");
        Ok(DailyBriefing {
            briefing: briefing.final_answer,
            actions_needed: actions.final_answer,
            cash_analysis: cash.final_answer,
            payment_recommendation: payments.final_answer,
            collection_status: collections.final_answer,
            goals_analysis: goals.final_answer,
        })
    }

    /// Extract a new document and decide what to do with it. Nothing is
    /// written to the finance store here.
    pub async fn handle_new_document(&self, path: &Path) -> Result<DocumentReview> {
        let extraction = self.documents.process(path).await;

        let context = format!(
            "A new document was uploaded.\nDOCUMENT TYPE: {}\nEXTRACTED DATA: {}\nCONFIDENCE NOTES: {}\nFLAGGED FOR REVIEW: {}",
            extraction.document_kind,
            Value::Object(extraction.fields.clone()),
            extraction.validation_notes,
            if extraction.needs_human_review { "yes" } else { "no" },
        );
        let decision = self.think(context, DOCUMENT_QUESTION).await?;

        Ok(DocumentReview {
            extraction,
            cfo_decision: decision.final_answer,
        })
    }

    /// Interpret a human reply to a pending decision.
    pub async fn process_human_response(
        &self,
        response: &str,
        context: &ConversationContext,
    ) -> Result<DecisionOutcome> {
        let mut situation = format!(
            "WHAT WE ASKED THE HUMAN: {}\nHUMAN'S RESPONSE: {}",
            context.pending_decision.as_deref().unwrap_or(""),
            response
        );
        if !context.pending.is_empty() {
            situation.push_str(&format!(
                "\nPENDING DETAILS: {}",
                Value::Object(context.pending.clone())
            ));
        }

        let understanding = self.think(situation, RESPONSE_QUESTION).await?.final_answer;
        let needs_clarification = understanding.to_lowercase().contains("unclear");

        Ok(DecisionOutcome {
            understanding,
            needs_clarification,
        })
    }

    pub async fn handle_unusual_situation(
        &self,
        situation: &str,
        data: &Value,
    ) -> Result<GenerationResult> {
        let context = format!("UNUSUAL SITUATION: {}\nRELEVANT DATA: {}", situation, data);
        self.think(context, UNUSUAL_QUESTION).await
    }
}

#[async_trait]
impl DecisionHandler for Cfo {
    async fn process_response(
        &self,
        message: &str,
        context: &ConversationContext,
    ) -> Result<DecisionOutcome> {
        self.process_human_response(message, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedBackend;
    use crate::retry::{RetryExecutor, RetryPolicy};
    use crate::store::fixtures::sample_database;
    use crate::store::{FinanceStore, JsonFileStore};
    use serde_json::json;
    use std::time::Duration;

    fn cfo(backend: Arc<ScriptedBackend>) -> Cfo {
        let retry = RetryExecutor::new(RetryPolicy::new(1, Duration::from_millis(1)));
        let reasoner = Arc::new(Reasoner::new(backend, retry));
        let store: Arc<dyn FinanceStore> =
            Arc::new(JsonFileStore::from_value(sample_database()).unwrap());
        Cfo::new(
            reasoner.clone(),
            Arc::new(FinanceManager::new(reasoner.clone(), store.clone())),
            Arc::new(DocProcessor::new(reasoner, store)),
        )
    }

    #[tokio::test]
    async fn test_daily_briefing_chains_calls() {
        // cash, payments, collections, briefing, actions; goals answer locally
        let backend = Arc::new(ScriptedBackend::with_replies(&[
            "Cash is tight.",
            "Pay UltraTech, hold Tata.",
            "PWD is 45 days late.",
            "Focus on PWD collection today.",
            "1. Approve UltraTech 4.5L? Reply YES or NO.",
        ]));

        let briefing = cfo(backend.clone()).create_daily_briefing().await.unwrap();

        assert_eq!(briefing.briefing, "Focus on PWD collection today.");
        assert_eq!(briefing.actions_needed, "1. Approve UltraTech 4.5L? Reply YES or NO.");
        let prompts = backend.prompts();
        assert_eq!(prompts.len(), 5);
        assert!(prompts[1].contains("CASH SITUATION: Cash is tight."));
        assert!(prompts[3].starts_with("You are Rajesh"));
        assert!(prompts[3].contains("FINANCE MANAGER'S PAYMENT RECOMMENDATIONS: Pay UltraTech, hold Tata."));
        assert!(prompts[4].contains("My briefing: Focus on PWD collection today."));
    }

    #[tokio::test]
    async fn test_briefing_failure_propagates() {
        let backend = Arc::new(ScriptedBackend::new());
        assert!(cfo(backend).create_daily_briefing().await.is_err());
    }

    #[tokio::test]
    async fn test_process_human_response() {
        let backend = Arc::new(ScriptedBackend::with_replies(&[
            "Approved the UltraTech payment.",
            "Their answer is unclear; ask which invoice.",
        ]));
        let cfo = cfo(backend.clone());
        let mut context = ConversationContext::default();
        context.pending_decision = Some("Pay UltraTech 4.5L?".to_string());
        context.pending.insert("invoice_id".to_string(), json!("INV-1"));

        let clear = cfo.process_response("yes", &context).await.unwrap();
        assert!(!clear.needs_clarification);
        let prompt = &backend.prompts()[0];
        assert!(prompt.contains("WHAT WE ASKED THE HUMAN: Pay UltraTech 4.5L?"));
        assert!(prompt.contains("\"invoice_id\":\"INV-1\""));

        let unclear = cfo.process_response("maybe", &context).await.unwrap();
        assert!(unclear.needs_clarification);
    }

    #[tokio::test]
    async fn test_unusual_situation() {
        let backend = Arc::new(ScriptedBackend::with_replies(&[
            "Risk is a bounced cheque.\nDecision: Ask the human CFO before releasing CH1.",
        ]));
        let result = cfo(backend.clone())
            .handle_unusual_situation("Vendor asks for advance", &json!({"vendor": "V2"}))
            .await
            .unwrap();

        assert_eq!(result.final_answer, "Ask the human CFO before releasing CH1.");
        let prompt = &backend.prompts()[0];
        assert!(prompt.contains("UNUSUAL SITUATION: Vendor asks for advance"));
        assert!(prompt.contains("{\"vendor\":\"V2\"}"));
    }

    #[tokio::test]
    async fn test_handle_new_document_degraded_extraction() {
        let backend = Arc::new(ScriptedBackend::with_replies(&[
            "Could not read it; ask the human to resend.",
        ]));
        let review = cfo(backend.clone())
            .handle_new_document(Path::new("/missing/scan.jpg"))
            .await
            .unwrap();

        assert!(review.extraction.needs_human_review);
        assert_eq!(review.cfo_decision, "Could not read it; ask the human to resend.");
        assert!(backend.prompts()[0].contains("FLAGGED FOR REVIEW: yes"));
    }
}

//! Finance manager: cash, payments, collections and goals.

use super::personas;
use crate::models::{GenerationRequest, GenerationResult};
use crate::reasoning::Reasoner;
use crate::segmenter::NO_RATIONALE;
use crate::store::{
    format_master, format_records, format_summary, format_uncleared_cheques, ChequeDirection,
    FinanceStore,
};
use crate::Result;
use chrono::{Local, Utc};
use std::sync::Arc;
use tracing::info;

pub const ORIGIN: &str = "finance-manager";

pub const NO_GOALS_ANSWER: &str = "We haven't set any financial goals yet. I recommend we set \
     some targets for emergency funds or specific purchases.";

const CASH_QUESTION: &str = r#"Analyze our cash position. Think about:
1. What's our actual available cash right now?
2. What's our real liquidity (including credit lines)?
3. How does this compare to our near-term obligations?
4. Are we in a comfortable, tight, or critical situation?
5. What worries you most?
6. What's positive about the situation?

Give me your assessment as our Finance Manager. Be honest and direct."#;

const PAYMENTS_QUESTION: &str = r#"Which payments should we make and which should we hold? Think about:
1. What MUST be paid today? (statutory, salaries, critical)
2. What SHOULD be paid to avoid problems?
3. What CAN wait a few days?
4. What can we negotiate or delay?

For each payment: pay now or hold, why, and the risk of your recommendation.

Format your response as:
- PAY NOW: (list with amounts and reasons)
- HOLD: (list with amounts and reasons)
- Total paying: X
- Cash remaining after: Y"#;

const COLLECTIONS_QUESTION: &str = r#"Analyze our collection situation. Think about:
1. What's our total outstanding?
2. What's overdue and by how much?
3. Which collections are likely to come soon?
4. Which ones are you worried about?
5. Who should we follow up with and how?

For overdue amounts, say whether it is normal for this client and what action you recommend."#;

const GOALS_QUESTION: &str = r#"Analyze our progress towards these financial goals.
1. Are we on track?
2. Which goals are at risk?
3. Do we have enough cash to allocate towards them?
4. What specific action should we take this week to get closer?

Explain your reasoning in plain language."#;

const DATA_NEEDS_QUESTION: &str = "What data do you need to answer this question? Just name the \
     data types if possible (e.g., bank accounts, vendors, payables).";

pub struct FinanceManager {
    reasoner: Arc<Reasoner>,
    store: Arc<dyn FinanceStore>,
}

impl FinanceManager {
    pub fn new(reasoner: Arc<Reasoner>, store: Arc<dyn FinanceStore>) -> Self {
        Self { reasoner, store }
    }

    async fn think(&self, context: String, question: &str) -> Result<GenerationResult> {
        self.reasoner
            .think(&GenerationRequest::new(personas::FINANCE_MANAGER, context, question))
            .await
    }

    pub async fn analyze_cash_position(&self) -> Result<GenerationResult> {
        let cheques = self.store.cheque_register().await?;
        let context = format!(
            "BANK ACCOUNTS: {}\nCHEQUES ISSUED (not yet cleared): {}\nCHEQUES RECEIVED (not yet cleared): {}\nPENDING PAYMENTS (what we owe): {}\nPENDING COLLECTIONS (what we're owed): {}\nTODAY'S DATE: {}",
            format_records(&self.store.bank_accounts().await?),
            format_uncleared_cheques(&cheques, ChequeDirection::Issued),
            format_uncleared_cheques(&cheques, ChequeDirection::Received),
            format_summary(&self.store.pending_payables().await?),
            format_summary(&self.store.pending_receivables().await?),
            Local::now().date_naive(),
        );

        info!("Analyzing cash position");
        self.think(context, CASH_QUESTION).await
    }

    pub async fn recommend_payments(&self, cash_analysis: &str) -> Result<GenerationResult> {
        let context = format!(
            "CASH SITUATION: {}\nPENDING PAYMENTS: {}\nVENDOR INFORMATION: {}\nTODAY: {}",
            cash_analysis,
            format_records(&self.store.pending_payables().await?),
            format_master(&self.store.vendors().await?, "No vendor master data."),
            Local::now().date_naive(),
        );

        self.think(context, PAYMENTS_QUESTION).await
    }

    pub async fn analyze_collections(&self) -> Result<GenerationResult> {
        let context = format!(
            "RECEIVABLES (what clients owe us): {}\nCLIENT INFORMATION: {}\nTODAY: {}",
            format_records(&self.store.receivables().await?),
            format_master(&self.store.clients().await?, "No client master data."),
            Local::now().date_naive(),
        );

        self.think(context, COLLECTIONS_QUESTION).await
    }

    /// Goal review. Without goals this answers locally, no remote call.
    pub async fn analyze_financial_goals(&self) -> Result<GenerationResult> {
        let goals = self.store.financial_goals().await?;
        if goals.is_empty() {
            return Ok(GenerationResult {
                origin: ORIGIN.to_string(),
                query: "Analyze financial goals".to_string(),
                rationale: NO_RATIONALE.to_string(),
                final_answer: NO_GOALS_ANSWER.to_string(),
                confidence: 1.0,
                needs_human_review: false,
                timestamp: Utc::now(),
            });
        }

        let context = format!(
            "FINANCIAL GOALS: {}\nTOTAL LIQUID CASH AVAILABLE: {:.2}\nTODAY: {}",
            format_records(&goals),
            self.store.total_bank_balance().await?,
            Local::now().date_naive(),
        );

        self.think(context, GOALS_QUESTION).await
    }

    /// Answer an ad-hoc question, first asking which data it needs.
    pub async fn answer_question(&self, question: &str) -> Result<GenerationResult> {
        let context = self.gather_context(question).await?;
        self.think(context, question).await
    }

    async fn gather_context(&self, question: &str) -> Result<String> {
        let needs = self
            .think(format!("Question: {}", question), DATA_NEEDS_QUESTION)
            .await?
            .final_answer
            .to_lowercase();

        let mentions = |words: &[&str]| words.iter().any(|w| needs.contains(w));
        let mut parts = Vec::new();

        if mentions(&["bank", "cash"]) {
            parts.push(format!(
                "BANK ACCOUNTS: {}",
                format_records(&self.store.bank_accounts().await?)
            ));
        }
        if mentions(&["vendor", "payment", "payable"]) {
            parts.push(format!(
                "PAYABLES: {}",
                format_summary(&self.store.payables().await?)
            ));
            parts.push(format!(
                "VENDORS: {}",
                format_master(&self.store.vendors().await?, "No vendor master data.")
            ));
        }
        if mentions(&["client", "collection", "receivable"]) {
            parts.push(format!(
                "RECEIVABLES: {}",
                format_summary(&self.store.receivables().await?)
            ));
            parts.push(format!(
                "CLIENTS: {}",
                format_master(&self.store.clients().await?, "No client master data.")
            ));
        }

        if parts.is_empty() {
            Ok("No specific context gathered.".to_string())
        } else {
            Ok(parts.join("\n\n"))
        }
    }
}

//! Persona agents and their wiring
//!
//! HUMAN → HumanInterface → DecisionRouter → Cfo → FinanceManager / DocProcessor

use crate::config::Settings;
use crate::feedback::FeedbackLog;
use crate::reasoning::Reasoner;
use crate::router::{build_context_store, ContextStore, DecisionRouter};
use crate::store::{FinanceStore, JsonFileStore};
use crate::Result;
use std::sync::Arc;
use tracing::info;

pub mod cfo;
pub mod doc_processor;
pub mod finance_manager;
pub mod human_interface;
pub mod personas;

pub use cfo::{Cfo, DailyBriefing, DocumentReview};
pub use doc_processor::{DocProcessor, VendorMatch};
pub use finance_manager::FinanceManager;
pub use human_interface::HumanInterface;

/// Every agent wired over one reasoner, store and feedback log.
pub struct Assistant {
    pub store: Arc<dyn FinanceStore>,
    pub reasoner: Arc<Reasoner>,
    pub finance: Arc<FinanceManager>,
    pub documents: Arc<DocProcessor>,
    pub cfo: Arc<Cfo>,
    pub interface: Arc<HumanInterface>,
    pub feedback: Arc<FeedbackLog>,
}

impl Assistant {
    /// Wire agents over existing components.
    pub fn assemble(
        reasoner: Arc<Reasoner>,
        store: Arc<dyn FinanceStore>,
        router_store: Arc<dyn ContextStore>,
        chat_limit: usize,
    ) -> Self {
        let finance = Arc::new(FinanceManager::new(reasoner.clone(), store.clone()));
        let documents = Arc::new(DocProcessor::new(reasoner.clone(), store.clone()));
        let cfo = Arc::new(Cfo::new(reasoner.clone(), finance.clone(), documents.clone()));
        let feedback = Arc::new(FeedbackLog::new());

        let router = Arc::new(
            DecisionRouter::new(
                reasoner.clone(),
                personas::HUMAN_INTERFACE,
                cfo.clone(),
                router_store,
                feedback.clone(),
            )
            .with_reply_limit(chat_limit),
        );
        let interface = Arc::new(HumanInterface::new(
            reasoner.clone(),
            cfo.clone(),
            router,
            chat_limit,
        ));

        Self {
            store,
            reasoner,
            finance,
            documents,
            cfo,
            interface,
            feedback,
        }
    }

    /// Build the production assistant: Gemini backend, JSON store on disk,
    /// context store from `DATABASE_URL` when set.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let reasoner = Arc::new(Reasoner::from_settings(settings)?);
        let store: Arc<dyn FinanceStore> =
            Arc::new(JsonFileStore::open(&settings.database_path).await?);
        let contexts = build_context_store(settings.database_url.as_deref());

        info!(model = %settings.model, "Assistant initialized");
        Ok(Self::assemble(reasoner, store, contexts, settings.chat_message_limit))
    }
}

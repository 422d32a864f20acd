//! CFO Assistant
//!
//! A multi-persona finance assistant that:
//! - Calls a hosted LLM with retry and backoff on transient failures
//! - Splits model output into rationale and final answer
//! - Recovers structured JSON from free-form replies
//! - Routes a human's chat replies against pending decisions
//!
//! FLOW:
//! CHAT → HUMAN INTERFACE → ROUTER → CFO → FINANCE MANAGER / DOC PROCESSOR

pub mod agents;
pub mod api;
pub mod config;
pub mod error;
pub mod extractor;
pub mod feedback;
pub mod llm;
pub mod models;
pub mod reasoning;
pub mod retry;
pub mod router;
pub mod segmenter;
pub mod store;
pub mod telegram;

pub use error::{AgentError, Result};

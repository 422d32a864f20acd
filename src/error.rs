//! Error types for the CFO assistant

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Message fragments that mark a remote failure as worth retrying.
const TRANSIENT_SIGNATURES: &[&str] = &[
    "429",
    "resource exhausted",
    "resource_exhausted",
    "rate limit",
    "too many requests",
    "503",
    "unavailable",
    "overloaded",
];

#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Remote generation (transient)
    // =============================

    #[error("Rate limited by generation API (status {status}): {message}")]
    RateLimited { status: u16, message: String },

    #[error("Generation API temporarily unavailable (status {status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("Generation call timed out: {0}")]
    Timeout(String),

    // =============================
    // Remote generation (permanent)
    // =============================

    #[error("Generation API rejected credentials (status {status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Generation API rejected request (status {status}): {message}")]
    InvalidRequest { status: u16, message: String },

    #[error("Empty response from generation API")]
    EmptyResponse,

    #[error("LLM error: {0}")]
    Llm(String),

    // =============================
    // Collaborators
    // =============================

    #[error("Document error: {0}")]
    Document(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Finance store error: {0}")]
    Store(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Chat transport error: {0}")]
    Transport(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

impl AgentError {
    /// Whether a failed remote call may succeed if repeated.
    ///
    /// Typed rate-limit/unavailable/timeout variants always qualify; untyped
    /// errors qualify when their message carries a known transient signature.
    pub fn is_transient(&self) -> bool {
        match self {
            AgentError::RateLimited { .. }
            | AgentError::Unavailable { .. }
            | AgentError::Timeout(_) => true,
            AgentError::Auth { .. }
            | AgentError::InvalidRequest { .. }
            | AgentError::EmptyResponse => false,
            AgentError::Http(e) => {
                e.is_timeout() || e.is_connect() || has_transient_signature(&e.to_string())
            }
            AgentError::Llm(message) => has_transient_signature(message),
            _ => false,
        }
    }

    /// Map a non-success HTTP status from the generation API to an error.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            429 => AgentError::RateLimited { status, message },
            500 | 502 | 503 | 504 => AgentError::Unavailable { status, message },
            401 | 403 => AgentError::Auth { status, message },
            _ => AgentError::InvalidRequest { status, message },
        }
    }
}

fn has_transient_signature(message: &str) -> bool {
    let lowered = message.to_lowercase();
    TRANSIENT_SIGNATURES.iter().any(|sig| lowered.contains(sig))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            AgentError::from_status(429, "slow down".into()),
            AgentError::RateLimited { .. }
        ));
        assert!(matches!(
            AgentError::from_status(503, "busy".into()),
            AgentError::Unavailable { .. }
        ));
        assert!(matches!(
            AgentError::from_status(403, "bad key".into()),
            AgentError::Auth { .. }
        ));
        assert!(matches!(
            AgentError::from_status(400, "bad body".into()),
            AgentError::InvalidRequest { .. }
        ));
    }

    #[test]
    fn test_transient_classification() {
        assert!(AgentError::from_status(429, String::new()).is_transient());
        assert!(AgentError::from_status(502, String::new()).is_transient());
        assert!(AgentError::Timeout("60s".into()).is_transient());
        assert!(AgentError::Llm("429 Resource exhausted".into()).is_transient());
        assert!(AgentError::Llm("model is overloaded".into()).is_transient());

        assert!(!AgentError::from_status(401, "invalid key".into()).is_transient());
        assert!(!AgentError::from_status(400, "unavailable field".into()).is_transient());
        assert!(!AgentError::EmptyResponse.is_transient());
        assert!(!AgentError::Llm("malformed prompt".into()).is_transient());
        assert!(!AgentError::Document("missing".into()).is_transient());
    }
}

//! Runtime settings loaded from the environment (and `.env`).

use crate::error::AgentError;
use crate::Result;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-flash-latest";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Clone)]
pub struct Settings {
    pub gemini_api_key: String,
    pub model: String,
    pub vision_model: String,
    pub base_url: String,
    pub request_timeout: Duration,
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    /// Character budget for document text inlined into a prompt
    pub document_char_budget: usize,
    /// Upper bound on a single outbound chat message
    pub chat_message_limit: usize,
    pub database_path: PathBuf,
    pub document_dir: PathBuf,
    pub database_url: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub cfo_chat_id: Option<String>,
    pub api_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            vision_model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(60),
            retry_max_attempts: 3,
            retry_base_delay: Duration::from_secs(2),
            document_char_budget: 30_000,
            chat_message_limit: 3_000,
            database_path: PathBuf::from("data/database.json"),
            document_dir: PathBuf::from("data"),
            database_url: None,
            telegram_bot_token: None,
            cfo_chat_id: None,
            api_port: 8080,
        }
    }
}

impl Settings {
    /// Load settings, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let defaults = Settings::default();
        let model = non_empty("GEMINI_MODEL").unwrap_or(defaults.model);
        let vision_model = non_empty("GEMINI_VISION_MODEL").unwrap_or_else(|| model.clone());

        Ok(Self {
            gemini_api_key: non_empty("GEMINI_API_KEY").unwrap_or_default(),
            vision_model,
            model,
            base_url: non_empty("GEMINI_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            request_timeout: Duration::from_secs(parse_or(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            retry_max_attempts: parse_or("RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts)?,
            retry_base_delay: Duration::from_secs(parse_or(
                "RETRY_BASE_DELAY_SECS",
                defaults.retry_base_delay.as_secs(),
            )?),
            document_char_budget: parse_or("DOCUMENT_CHAR_BUDGET", defaults.document_char_budget)?,
            chat_message_limit: parse_or("CHAT_MESSAGE_LIMIT", defaults.chat_message_limit)?,
            database_path: non_empty("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            document_dir: non_empty("DOCUMENT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.document_dir),
            database_url: non_empty("POSTGRES_URL").or_else(|| non_empty("DATABASE_URL")),
            telegram_bot_token: non_empty("TELEGRAM_BOT_TOKEN"),
            cfo_chat_id: non_empty("CFO_CHAT_ID"),
            api_port: match non_empty("PORT").or_else(|| non_empty("API_PORT")) {
                Some(raw) => parse_value("PORT", &raw)?,
                None => defaults.api_port,
            },
        })
    }

    /// Fail early when remote generation is impossible.
    pub fn require_api_key(&self) -> Result<&str> {
        if self.gemini_api_key.is_empty() || self.gemini_api_key == "your_gemini_api_key_here" {
            return Err(AgentError::Config(
                "GEMINI_API_KEY not configured. Set it in the environment or .env".to_string(),
            ));
        }
        Ok(&self.gemini_api_key)
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match non_empty(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AgentError::Config(format!("{} has invalid value '{}'", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.retry_max_attempts, 3);
        assert_eq!(settings.retry_base_delay, Duration::from_secs(2));
        assert_eq!(settings.chat_message_limit, 3_000);
        assert!(settings.require_api_key().is_err());
    }

    #[test]
    fn test_parse_value_rejects_garbage() {
        let parsed: Result<u32> = parse_value("RETRY_MAX_ATTEMPTS", "three");
        assert!(matches!(parsed, Err(AgentError::Config(_))));

        let parsed: Result<u32> = parse_value("RETRY_MAX_ATTEMPTS", " 5 ");
        assert_eq!(parsed.ok(), Some(5));
    }
}

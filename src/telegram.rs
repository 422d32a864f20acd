//! Chat transport
//!
//! Telegram Bot API over plain HTTPS with long polling (`getUpdates`), so no
//! public endpoint is needed. Each update is handled on its own task; the
//! decision router serialises work within one conversation.

use crate::agents::human_interface::{GREETING, UPLOAD_ACK};
use crate::agents::HumanInterface;
use crate::error::AgentError;
use crate::Result;
use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const API_BASE: &str = "https://api.telegram.org";
const POLL_TIMEOUT_SECS: u64 = 30;

/// Outbound side of a chat channel.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, conversation_id: &str, text: &str) -> Result<()>;
}

/// Inbound event extracted from one update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Command {
        conversation_id: String,
        command: String,
    },
    Text {
        conversation_id: String,
        text: String,
    },
    Upload {
        conversation_id: String,
        file_id: String,
        file_name: String,
    },
}

/// Map a raw update to an event; `None` for anything we don't handle.
pub fn parse_update(update: &Value) -> Option<InboundEvent> {
    let message = update.get("message")?;
    let conversation_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)?
        .to_string();

    if let Some(text) = message.get("text").and_then(Value::as_str) {
        if let Some(command) = text.strip_prefix('/') {
            let command = command
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .split('@')
                .next()
                .unwrap_or_default()
                .to_lowercase();
            return Some(InboundEvent::Command {
                conversation_id,
                command,
            });
        }
        return Some(InboundEvent::Text {
            conversation_id,
            text: text.to_string(),
        });
    }

    if let Some(document) = message.get("document") {
        let file_id = document.get("file_id").and_then(Value::as_str)?;
        let file_name = document
            .get("file_name")
            .and_then(Value::as_str)
            .and_then(safe_file_name)
            .unwrap_or_else(|| format!("document_{}", timestamp()));
        return Some(InboundEvent::Upload {
            conversation_id,
            file_id: file_id.to_string(),
            file_name,
        });
    }

    // photo sizes are ordered smallest first
    let largest = message.get("photo").and_then(Value::as_array)?.last()?;
    let file_id = largest.get("file_id").and_then(Value::as_str)?;
    Some(InboundEvent::Upload {
        conversation_id,
        file_id: file_id.to_string(),
        file_name: format!("photo_{}.jpg", timestamp()),
    })
}

fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Final path component only, so uploads cannot escape the document dir.
fn safe_file_name(raw: &str) -> Option<String> {
    Path::new(raw)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty() && n != "." && n != "..")
}

pub struct TelegramClient {
    client: reqwest::Client,
    token: String,
    api_base: String,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(AgentError::Config("TELEGRAM_BOT_TOKEN not configured".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .build()?;
        Ok(Self {
            client,
            token,
            api_base: API_BASE.to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn call(&self, method: &str, body: Value) -> Result<Value> {
        let response: Value = self
            .client
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if response.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = response
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(AgentError::Transport(format!("{} failed: {}", method, description)));
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Bot username, for connectivity checks.
    pub async fn get_me(&self) -> Result<String> {
        let me = self.call("getMe", json!({})).await?;
        Ok(me
            .get("username")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Value>> {
        let result = self
            .call(
                "getUpdates",
                json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message"],
                }),
            )
            .await?;
        Ok(result.as_array().cloned().unwrap_or_default())
    }

    /// Fetch an uploaded file into `dir`.
    pub async fn download_file(&self, file_id: &str, dir: &Path, file_name: &str) -> Result<PathBuf> {
        let file = self.call("getFile", json!({ "file_id": file_id })).await?;
        let remote_path = file
            .get("file_path")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::Transport("getFile returned no file_path".to_string()))?;

        let url = format!("{}/file/bot{}/{}", self.api_base, self.token, remote_path);
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        tokio::fs::create_dir_all(dir).await?;
        let local_path = dir.join(file_name);
        tokio::fs::write(&local_path, &bytes).await?;

        debug!(bytes = bytes.len(), path = %local_path.display(), "Downloaded upload");
        Ok(local_path)
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_text(&self, conversation_id: &str, text: &str) -> Result<()> {
        self.call(
            "sendMessage",
            json!({ "chat_id": conversation_id, "text": text }),
        )
        .await?;
        Ok(())
    }
}

/// Long-polling bot loop in front of the human interface.
pub struct TelegramBot {
    client: Arc<TelegramClient>,
    interface: Arc<HumanInterface>,
    document_dir: PathBuf,
}

impl TelegramBot {
    pub fn new(client: Arc<TelegramClient>, interface: Arc<HumanInterface>, document_dir: PathBuf) -> Self {
        Self {
            client,
            interface,
            document_dir,
        }
    }

    /// Poll forever, one task per update.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        info!("Telegram bot listening (long-polling mode)");
        let mut offset: i64 = 0;

        loop {
            let updates = match self.client.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    warn!("Telegram polling error: {}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            for update in updates {
                if let Some(update_id) = update.get("update_id").and_then(Value::as_i64) {
                    offset = offset.max(update_id + 1);
                }
                let Some(event) = parse_update(&update) else {
                    continue;
                };

                let bot = self.clone();
                tokio::spawn(async move {
                    bot.handle(event).await;
                });
            }
        }
    }

    async fn handle(&self, event: InboundEvent) {
        match event {
            InboundEvent::Command {
                conversation_id,
                command,
            } => {
                if command == "start" {
                    self.reply(&conversation_id, GREETING).await;
                } else {
                    debug!(command = %command, "Ignoring unknown command");
                }
            }
            InboundEvent::Text {
                conversation_id,
                text,
            } => {
                let reply = match self.interface.handle_text(&conversation_id, &text).await {
                    Ok(outcome) => outcome.reply,
                    Err(e) => {
                        error!(conversation_id = %conversation_id, "Message handling failed: {}", e);
                        "Sorry, I couldn't process that just now. Please try again in a minute."
                            .to_string()
                    }
                };
                self.reply(&conversation_id, &reply).await;
            }
            InboundEvent::Upload {
                conversation_id,
                file_id,
                file_name,
            } => {
                self.reply(&conversation_id, UPLOAD_ACK).await;

                let reply = match self
                    .client
                    .download_file(&file_id, &self.document_dir, &file_name)
                    .await
                {
                    Ok(path) => self.interface.handle_upload(&conversation_id, &path).await,
                    Err(e) => {
                        error!(conversation_id = %conversation_id, "Download failed: {}", e);
                        format!("I couldn't download {}. Please send it again.", file_name)
                    }
                };
                self.reply(&conversation_id, &reply).await;
            }
        }
    }

    async fn reply(&self, conversation_id: &str, text: &str) {
        if let Err(e) = self.client.send_text(conversation_id, text).await {
            error!(conversation_id, "Failed to send reply: {}", e);
        }
    }
}

//! Conversation context persistence
//!
//! Contexts are keyed by conversation id. The in-memory backing loses every
//! unresolved pending decision on restart; callers must re-solicit them.

use crate::error::AgentError;
use crate::models::{ConversationContext, Record};
use crate::Result;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};

/// Trait for conversation context persistence
#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationContext>>;
    async fn save(&self, conversation_id: &str, context: &ConversationContext) -> Result<()>;
    async fn remove(&self, conversation_id: &str) -> Result<()>;
}

/// In-memory context store for development and tests
#[derive(Default)]
pub struct InMemoryContextStore {
    contexts: Arc<RwLock<HashMap<String, ConversationContext>>>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationContext>> {
        let contexts = self.contexts.read().await;
        Ok(contexts.get(conversation_id).cloned())
    }

    async fn save(&self, conversation_id: &str, context: &ConversationContext) -> Result<()> {
        let mut contexts = self.contexts.write().await;
        contexts.insert(conversation_id.to_string(), context.clone());
        Ok(())
    }

    async fn remove(&self, conversation_id: &str) -> Result<()> {
        self.contexts.write().await.remove(conversation_id);
        Ok(())
    }
}

/// Postgres-backed store, one row per conversation.
pub struct PostgresContextStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PostgresContextStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS conversation_contexts (
                      conversation_id TEXT PRIMARY KEY,
                      pending_decision TEXT,
                      last_message TEXT,
                      pending TEXT NOT NULL DEFAULT '{}',
                      updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                AgentError::Database(format!(
                    "Failed to initialize conversation context schema: {}",
                    e
                ))
            })?;

        Ok(())
    }
}

#[async_trait]
impl ContextStore for PostgresContextStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationContext>> {
        self.ensure_schema().await?;

        let row = sqlx::query(
            r#"
            SELECT pending_decision, last_message, pending
            FROM conversation_contexts
            WHERE conversation_id = $1
            "#,
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AgentError::Database(format!("Failed to load conversation context: {}", e)))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let pending_raw: String = row.try_get("pending").unwrap_or_else(|_| "{}".to_string());
        let pending: Record = match serde_json::from_str(&pending_raw) {
            Ok(map) => map,
            Err(e) => {
                warn!(conversation_id, "Discarding unreadable pending state: {}", e);
                Record::new()
            }
        };

        Ok(Some(ConversationContext {
            pending_decision: row.try_get::<Option<String>, _>("pending_decision").ok().flatten(),
            last_message: row.try_get::<Option<String>, _>("last_message").ok().flatten(),
            pending,
        }))
    }

    async fn save(&self, conversation_id: &str, context: &ConversationContext) -> Result<()> {
        self.ensure_schema().await?;

        let pending = serde_json::to_string(&context.pending)?;

        sqlx::query(
            r#"
            INSERT INTO conversation_contexts
              (conversation_id, pending_decision, last_message, pending, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (conversation_id) DO UPDATE SET
              pending_decision = EXCLUDED.pending_decision,
              last_message = EXCLUDED.last_message,
              pending = EXCLUDED.pending,
              updated_at = NOW()
            "#,
        )
        .bind(conversation_id)
        .bind(&context.pending_decision)
        .bind(&context.last_message)
        .bind(pending)
        .execute(&self.pool)
        .await
        .map_err(|e| AgentError::Database(format!("Failed to save conversation context: {}", e)))?;

        Ok(())
    }

    async fn remove(&self, conversation_id: &str) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query("DELETE FROM conversation_contexts WHERE conversation_id = $1")
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AgentError::Database(format!("Failed to remove conversation context: {}", e))
            })?;

        Ok(())
    }
}

/// Pick a backing from an optional database URL, falling back to memory.
pub fn build_context_store(database_url: Option<&str>) -> Arc<dyn ContextStore> {
    if let Some(url) = database_url {
        match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(url)
        {
            Ok(pool) => {
                info!("Conversation context backend: postgres");
                return Arc::new(PostgresContextStore::new(pool));
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres context backend, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Conversation context backend: in-memory");
    Arc::new(InMemoryContextStore::new())
}

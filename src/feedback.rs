//! Feedback recording
//!
//! Every resolved human decision produces at most one [`FeedbackEvent`].
//! Events are write-only from the router's point of view.

use crate::models::{FeedbackCategory, FeedbackEvent};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// Destination for feedback events
#[async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn record(&self, event: FeedbackEvent) -> Result<()>;
}

/// In-memory, queryable feedback trail. Also logs each event through
/// [`TracingFeedbackSink`].
pub struct FeedbackLog {
    events: Arc<RwLock<HashMap<Uuid, FeedbackEvent>>>,
}

impl FeedbackLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn get(&self, event_id: Uuid) -> Option<FeedbackEvent> {
        self.events.read().await.get(&event_id).cloned()
    }

    /// All events, oldest first
    pub async fn list(&self) -> Vec<FeedbackEvent> {
        let events = self.events.read().await;
        let mut items: Vec<_> = events.values().cloned().collect();
        items.sort_by_key(|e| e.created_at);
        items
    }

    /// Events for one conversation, oldest first
    pub async fn list_for_conversation(&self, conversation_id: &str) -> Vec<FeedbackEvent> {
        self.list()
            .await
            .into_iter()
            .filter(|e| e.conversation_id == conversation_id)
            .collect()
    }

    /// Count of events per category.
    pub async fn tally(&self) -> HashMap<FeedbackCategory, usize> {
        let events = self.events.read().await;
        let mut counts = HashMap::new();
        for event in events.values() {
            *counts.entry(event.category).or_insert(0) += 1;
        }
        counts
    }
}

impl Default for FeedbackLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedbackSink for FeedbackLog {
    async fn record(&self, event: FeedbackEvent) -> Result<()> {
        TracingFeedbackSink.record(event.clone()).await?;
        self.events.write().await.insert(event.event_id, event);
        Ok(())
    }
}

/// Sink that only emits a structured log line.
pub struct TracingFeedbackSink;

#[async_trait]
impl FeedbackSink for TracingFeedbackSink {
    async fn record(&self, event: FeedbackEvent) -> Result<()> {
        info!(
            target: "human_feedback",
            event_id = %event.event_id,
            conversation_id = %event.conversation_id,
            category = %event.category,
            score = event.score,
            original = %event.original_message,
            "Human feedback"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn event(conversation_id: &str, category: FeedbackCategory, age_secs: i64) -> FeedbackEvent {
        FeedbackEvent {
            event_id: Uuid::new_v4(),
            conversation_id: conversation_id.to_string(),
            category,
            score: 0.5,
            source_text: "noted".to_string(),
            original_message: "ok".to_string(),
            created_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[tokio::test]
    async fn test_log_lists_in_order_and_filters() {
        let log = FeedbackLog::new();
        let newer = event("7", FeedbackCategory::Negative, 1);
        let older = event("7", FeedbackCategory::Positive, 10);
        let other = event("8", FeedbackCategory::Positive, 5);

        log.record(newer.clone()).await.unwrap();
        log.record(older.clone()).await.unwrap();
        log.record(other).await.unwrap();

        let for_seven = log.list_for_conversation("7").await;
        assert_eq!(for_seven.len(), 2);
        assert_eq!(for_seven[0].event_id, older.event_id);
        assert_eq!(for_seven[1].event_id, newer.event_id);

        assert_eq!(log.list().await.len(), 3);
        assert!(log.get(newer.event_id).await.is_some());

        let tally = log.tally().await;
        assert_eq!(tally.get(&FeedbackCategory::Positive), Some(&2));
        assert_eq!(tally.get(&FeedbackCategory::Negative), Some(&1));
    }

    #[tokio::test]
    async fn test_tracing_sink_accepts_events() {
        let sink = TracingFeedbackSink;
        assert!(sink.record(event("1", FeedbackCategory::Neutral, 0)).await.is_ok());
    }
}

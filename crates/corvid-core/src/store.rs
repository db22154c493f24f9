// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

/// One persisted thread message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    pub message_id: String,
    pub thread_id: String,
    /// `user`, `assistant`, `tool`, `browser_state`, `image_context`, ...
    #[serde(rename = "type")]
    pub message_type: String,
    /// Object or JSON-encoded string
    pub content: Value,
    pub created_at: DateTime<Utc>,
}

impl MessageRow {
    /// The content as a JSON object, decoding it first when stored as text.
    pub fn content_object(&self) -> anyhow::Result<Map<String, Value>> {
        let decoded = match &self.content {
            Value::String(s) => serde_json::from_str(s)?,
            other => other.clone(),
        };
        match decoded {
            Value::Object(obj) => Ok(obj),
            other => anyhow::bail!(
                "message {} content is not an object: {}",
                self.message_id,
                other
            ),
        }
    }
}

/// Row store holding thread history.  Rows are written by the thread
/// engine; the run loop only reads the newest row of some types and deletes
/// consumed one-shot rows.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Newest row of the thread whose type is in `types`.
    async fn latest_message(
        &self,
        thread_id: &str,
        types: &[&str],
    ) -> anyhow::Result<Option<MessageRow>>;

    async fn delete_message(&self, message_id: &str) -> anyhow::Result<()>;
}

/// In-process store used by scenario replays and tests.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    rows: RwLock<Vec<MessageRow>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row stamped now; returns its id.
    pub async fn insert(
        &self,
        thread_id: &str,
        message_type: &str,
        content: Value,
    ) -> String {
        let row = MessageRow {
            message_id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.to_string(),
            message_type: message_type.to_string(),
            content,
            created_at: Utc::now(),
        };
        let id = row.message_id.clone();
        self.rows.write().await.push(row);
        id
    }

    pub async fn push(&self, row: MessageRow) {
        self.rows.write().await.push(row);
    }

    /// Rows of a thread in insertion order.
    pub async fn thread(&self, thread_id: &str) -> Vec<MessageRow> {
        self.rows
            .read()
            .await
            .iter()
            .filter(|r| r.thread_id == thread_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn latest_message(
        &self,
        thread_id: &str,
        types: &[&str],
    ) -> anyhow::Result<Option<MessageRow>> {
        let rows = self.rows.read().await;
        // Ties on created_at go to the row inserted last.
        Ok(rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.thread_id == thread_id && types.contains(&r.message_type.as_str()))
            .max_by_key(|(idx, r)| (r.created_at, *idx))
            .map(|(_, r)| r.clone()))
    }

    async fn delete_message(&self, message_id: &str) -> anyhow::Result<()> {
        self.rows.write().await.retain(|r| r.message_id != message_id);
        Ok(())
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, error};

use crate::store::MessageStore;

/// A chat message handed to the thread engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: String,
    /// Plain text or a list of content blocks
    pub content: Value,
}

impl LlmMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: "system".into(), content: Value::String(text.into()) }
    }

    pub fn user_blocks(blocks: Vec<Value>) -> Self {
        Self { role: "user".into(), content: Value::Array(blocks) }
    }

    pub fn text(&self) -> Option<&str> {
        self.content.as_str()
    }

    pub fn blocks(&self) -> &[Value] {
        self.content.as_array().map(Vec::as_slice).unwrap_or(&[])
    }
}

fn text_block(text: String) -> Value {
    json!({ "type": "text", "text": text })
}

/// Model families that accept image blocks.
fn accepts_images(model: &str) -> bool {
    let model = model.to_lowercase();
    ["gemini", "anthropic", "openai"].iter().any(|f| model.contains(f))
}

/// Builds the one-shot context message injected into a single engine call:
/// the latest browser state and any image the model asked to see.
pub struct MessageManager {
    store: Arc<dyn MessageStore>,
    thread_id: String,
    model_name: String,
}

impl MessageManager {
    pub fn new(
        store: Arc<dyn MessageStore>,
        thread_id: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self { store, thread_id: thread_id.into(), model_name: model_name.into() }
    }

    /// `None` when there is nothing to inject.  Read failures are errors;
    /// unparseable rows are logged and skipped.  A parsed `image_context`
    /// row is deleted so it is served only once.
    pub async fn build_temporary_message(&self) -> anyhow::Result<Option<LlmMessage>> {
        let mut blocks = Vec::new();

        if let Some(row) = self.store.latest_message(&self.thread_id, &["browser_state"]).await? {
            match row.content_object() {
                Ok(state) => self.browser_blocks(state, &mut blocks),
                Err(e) => error!(message_id = %row.message_id, error = %e, "error parsing browser state"),
            }
        }

        if let Some(row) = self.store.latest_message(&self.thread_id, &["image_context"]).await? {
            match row.content_object() {
                Ok(ctx) => {
                    image_blocks(&ctx, &mut blocks);
                    match self.store.delete_message(&row.message_id).await {
                        Ok(()) => debug!(message_id = %row.message_id, "consumed image context"),
                        Err(e) => error!(message_id = %row.message_id, error = %e, "error deleting image context"),
                    }
                }
                Err(e) => error!(message_id = %row.message_id, error = %e, "error parsing image context"),
            }
        }

        if blocks.is_empty() {
            return Ok(None);
        }
        Ok(Some(LlmMessage::user_blocks(blocks)))
    }

    fn browser_blocks(&self, mut state: Map<String, Value>, blocks: &mut Vec<Value>) {
        let screenshot_base64 = state.remove("screenshot_base64");
        let screenshot_url = state.remove("image_url");

        if !state.is_empty() {
            let pretty = serde_json::to_string_pretty(&Value::Object(state)).unwrap_or_default();
            blocks.push(text_block(format!(
                "The following is the current state of the browser:\n{pretty}"
            )));
        }

        if !accepts_images(&self.model_name) {
            return;
        }
        let non_empty = |v: Option<Value>| v.and_then(|v| v.as_str().filter(|s| !s.is_empty()).map(str::to_string));
        if let Some(url) = non_empty(screenshot_url) {
            blocks.push(json!({
                "type": "image_url",
                "image_url": { "url": url, "format": "image/png" }
            }));
        } else if let Some(b64) = non_empty(screenshot_base64) {
            blocks.push(json!({
                "type": "image_url",
                "image_url": { "url": format!("data:image/png;base64,{b64}") }
            }));
        }
    }
}

fn image_blocks(ctx: &Map<String, Value>, blocks: &mut Vec<Value>) {
    let field = |k: &str| ctx.get(k).and_then(Value::as_str).filter(|s| !s.is_empty());
    let (Some(b64), Some(mime)) = (field("base64"), field("mime_type")) else {
        return;
    };
    let file_path = field("file_path").unwrap_or("unknown file");
    blocks.push(text_block(format!("Here is the image you requested to see: '{file_path}'")));
    blocks.push(json!({
        "type": "image_url",
        "image_url": { "url": format!("data:{mime};base64,{b64}") }
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryMessageStore;

    async fn manager(model: &str) -> (MessageManager, Arc<InMemoryMessageStore>) {
        let store = Arc::new(InMemoryMessageStore::new());
        (MessageManager::new(store.clone(), "t", model), store)
    }

    #[tokio::test]
    async fn nothing_to_inject_is_none() {
        let (mgr, store) = manager("openai/gpt-5-mini").await;
        store.insert("t", "user", json!({"content": "hi"})).await;
        assert!(mgr.build_temporary_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn browser_state_text_and_hosted_screenshot() {
        let (mgr, store) = manager("anthropic/claude-sonnet-4").await;
        store
            .insert(
                "t",
                "browser_state",
                json!({"url": "https://x", "screenshot_base64": "AAA", "image_url": "https://img/1.png"}),
            )
            .await;
        let msg = mgr.build_temporary_message().await.unwrap().unwrap();
        assert_eq!(msg.role, "user");
        let blocks = msg.blocks();
        assert_eq!(blocks.len(), 2);
        let text = blocks[0]["text"].as_str().unwrap();
        assert!(text.starts_with("The following is the current state of the browser:\n"));
        assert!(text.contains("https://x"));
        assert!(!text.contains("AAA"));
        assert_eq!(blocks[1]["image_url"]["url"], "https://img/1.png");
        assert_eq!(blocks[1]["image_url"]["format"], "image/png");
    }

    #[tokio::test]
    async fn inline_screenshot_used_without_url() {
        let (mgr, store) = manager("gemini-2.5-pro").await;
        store.insert("t", "browser_state", json!({"screenshot_base64": "QUJD"})).await;
        let msg = mgr.build_temporary_message().await.unwrap().unwrap();
        // Only the screenshot field was present, so no text block.
        assert_eq!(msg.blocks().len(), 1);
        assert_eq!(msg.blocks()[0]["image_url"]["url"], "data:image/png;base64,QUJD");
    }

    #[tokio::test]
    async fn screenshot_skipped_for_other_model_families() {
        let (mgr, store) = manager("moonshot/kimi-k2").await;
        store.insert("t", "browser_state", json!({"title": "T", "image_url": "https://img"})).await;
        let msg = mgr.build_temporary_message().await.unwrap().unwrap();
        assert_eq!(msg.blocks().len(), 1);
        assert_eq!(msg.blocks()[0]["type"], "text");
    }

    #[tokio::test]
    async fn image_context_is_served_once() {
        let (mgr, store) = manager("openai/gpt-5-mini").await;
        store
            .insert(
                "t",
                "image_context",
                json!({"base64": "Zm9v", "mime_type": "image/jpeg", "file_path": "shots/a.jpg"}).to_string().into(),
            )
            .await;
        let msg = mgr.build_temporary_message().await.unwrap().unwrap();
        let blocks = msg.blocks();
        assert_eq!(blocks[0]["text"], "Here is the image you requested to see: 'shots/a.jpg'");
        assert_eq!(blocks[1]["image_url"]["url"], "data:image/jpeg;base64,Zm9v");

        assert!(store.thread("t").await.is_empty());
        assert!(mgr.build_temporary_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn browser_and_image_combine() {
        let (mgr, store) = manager("openai/gpt-4o").await;
        store.insert("t", "browser_state", json!({"url": "u"})).await;
        store.insert("t", "image_context", json!({"base64": "x", "mime_type": "image/png"})).await;
        let msg = mgr.build_temporary_message().await.unwrap().unwrap();
        assert_eq!(msg.blocks().len(), 3);
        assert_eq!(msg.blocks()[1]["text"], "Here is the image you requested to see: 'unknown file'");
    }

    #[tokio::test]
    async fn malformed_browser_state_is_skipped() {
        let (mgr, store) = manager("openai/gpt-4o").await;
        store.insert("t", "browser_state", json!("{not json")).await;
        assert!(mgr.build_temporary_message().await.unwrap().is_none());
    }
}

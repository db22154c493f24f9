// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Streamed chunks relayed from the thread engine to the caller.
//!
//! On the wire a chunk is a JSON object discriminated by `type`.  The run
//! loop only inspects `status` and `assistant` chunks; every other type is
//! carried through untouched.  Fields the loop does not look at are kept in
//! `extra` so a chunk serializes back to what the engine produced.
use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Output of a run: every chunk in order, then end of stream.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Chunk> + Send>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Chunk {
    Status(StatusChunk),
    Assistant(AssistantChunk),
    /// Any other chunk type (tool results, content deltas, ...)
    Other(Value),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusChunk {
    /// `error`, `stopped`, `tool_started`, ...
    pub status: Option<String>,
    pub message: Option<String>,
    /// Object or JSON-encoded string
    pub metadata: Option<Value>,
    /// Object or JSON-encoded string
    pub content: Option<Value>,
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantChunk {
    /// Usually a JSON-encoded string of `{"role": "assistant", "content": "..."}`
    pub content: Option<Value>,
    pub extra: Map<String, Value>,
}

/// Decode a field that engines send either as an object or as JSON text.
/// Malformed text is logged and treated as absent.
fn decode_embedded(field: &str, v: &Value) -> Option<Value> {
    match v {
        Value::String(s) => match serde_json::from_str(s) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(field, error = %e, "could not parse embedded chunk JSON");
                None
            }
        },
        other => Some(other.clone()),
    }
}

impl StatusChunk {
    pub fn is_error(&self) -> bool {
        self.status.as_deref() == Some("error")
    }

    /// The engine asks the loop to end the turn.
    pub fn should_terminate(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| decode_embedded("metadata", m))
            .and_then(|m| m.get("agent_should_terminate").and_then(Value::as_bool))
            .unwrap_or(false)
    }

    /// Name of the function or XML tag that triggered termination.
    pub fn triggering_tool(&self) -> Option<String> {
        let content = self.content.as_ref().and_then(|c| decode_embedded("content", c))?;
        let non_empty = |key: &str| {
            content
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        non_empty("function_name").or_else(|| non_empty("xml_tag_name"))
    }
}

impl AssistantChunk {
    /// Visible assistant text carried by this chunk.
    pub fn text(&self) -> Option<String> {
        let content = self.content.as_ref().and_then(|c| decode_embedded("content", c))?;
        content.get("content").and_then(Value::as_str).map(str::to_string)
    }
}

impl Chunk {
    pub fn status(status: impl Into<String>, message: impl Into<String>) -> Self {
        Chunk::Status(StatusChunk {
            status: Some(status.into()),
            message: Some(message.into()),
            ..Default::default()
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::status("error", message)
    }

    pub fn stopped(message: impl Into<String>) -> Self {
        Self::status("stopped", message)
    }

    /// Assistant chunk whose content is the JSON-encoded message `{"content": text}`.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        let body = serde_json::json!({ "content": text.into() });
        Chunk::Assistant(AssistantChunk {
            content: Some(Value::String(body.to_string())),
            extra: Map::new(),
        })
    }

    pub fn kind(&self) -> &str {
        match self {
            Chunk::Status(_) => "status",
            Chunk::Assistant(_) => "assistant",
            Chunk::Other(v) => v.get("type").and_then(Value::as_str).unwrap_or(""),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Chunk::Status(s) if s.is_error())
    }

    pub fn to_value(&self) -> Value {
        self.clone().into()
    }
}

impl From<Value> for Chunk {
    fn from(v: Value) -> Self {
        let mut obj = match v {
            Value::Object(obj) => obj,
            other => return Chunk::Other(other),
        };
        let kind = obj.get("type").and_then(Value::as_str).map(str::to_string);
        match kind.as_deref() {
            Some("status") => {
                obj.remove("type");
                let status = match obj.remove("status") {
                    Some(Value::String(s)) => Some(s),
                    Some(other) => {
                        obj.insert("status".into(), other);
                        None
                    }
                    None => None,
                };
                let message = match obj.remove("message") {
                    Some(Value::String(s)) => Some(s),
                    Some(other) => {
                        obj.insert("message".into(), other);
                        None
                    }
                    None => None,
                };
                Chunk::Status(StatusChunk {
                    status,
                    message,
                    metadata: obj.remove("metadata"),
                    content: obj.remove("content"),
                    extra: obj,
                })
            }
            Some("assistant") => {
                obj.remove("type");
                Chunk::Assistant(AssistantChunk { content: obj.remove("content"), extra: obj })
            }
            _ => Chunk::Other(Value::Object(obj)),
        }
    }
}

impl From<Chunk> for Value {
    fn from(chunk: Chunk) -> Self {
        match chunk {
            Chunk::Status(s) => {
                let mut obj = Map::new();
                obj.insert("type".into(), Value::String("status".into()));
                if let Some(status) = s.status {
                    obj.insert("status".into(), Value::String(status));
                }
                if let Some(message) = s.message {
                    obj.insert("message".into(), Value::String(message));
                }
                if let Some(metadata) = s.metadata {
                    obj.insert("metadata".into(), metadata);
                }
                if let Some(content) = s.content {
                    obj.insert("content".into(), content);
                }
                obj.extend(s.extra);
                Value::Object(obj)
            }
            Chunk::Assistant(a) => {
                let mut obj = Map::new();
                obj.insert("type".into(), Value::String("assistant".into()));
                if let Some(content) = a.content {
                    obj.insert("content".into(), content);
                }
                obj.extend(a.extra);
                Value::Object(obj)
            }
            Chunk::Other(v) => v,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn chunk(v: Value) -> Chunk {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn billing_stop_chunk_serializes_exactly() {
        let v = serde_json::to_value(Chunk::stopped("Billing limit reached: quota exceeded")).unwrap();
        assert_eq!(
            v,
            json!({"type": "status", "status": "stopped", "message": "Billing limit reached: quota exceeded"})
        );
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let raw = json!({"type": "status", "status": "tool_completed", "thread_run_id": "r1", "sequence": 4});
        assert_eq!(chunk(raw.clone()).to_value(), raw);
    }

    #[test]
    fn other_types_pass_through() {
        let raw = json!({"type": "tool", "content": "{\"ok\":true}"});
        let c = chunk(raw.clone());
        assert!(matches!(c, Chunk::Other(_)));
        assert_eq!(c.kind(), "tool");
        assert_eq!(c.to_value(), raw);
    }

    #[test]
    fn assistant_text_from_encoded_content() {
        let c = chunk(json!({"type": "assistant", "content": "{\"content\":\"Hi there</complete>\"}"}));
        match c {
            Chunk::Assistant(a) => assert_eq!(a.text().as_deref(), Some("Hi there</complete>")),
            other => panic!("expected assistant chunk, got {other:?}"),
        }
    }

    #[test]
    fn assistant_text_from_object_content() {
        let c = chunk(json!({"type": "assistant", "content": {"role": "assistant", "content": "plain"}}));
        let Chunk::Assistant(a) = c else { panic!("expected assistant chunk") };
        assert_eq!(a.text().as_deref(), Some("plain"));
    }

    #[test]
    fn malformed_assistant_content_yields_no_text() {
        let c = chunk(json!({"type": "assistant", "content": "not json {"}));
        let Chunk::Assistant(a) = c else { panic!("expected assistant chunk") };
        assert_eq!(a.text(), None);
    }

    #[test]
    fn termination_metadata_as_string() {
        let c = chunk(json!({
            "type": "status",
            "status": "tool_completed",
            "metadata": "{\"agent_should_terminate\": true}",
            "content": "{\"xml_tag_name\": \"ask\"}"
        }));
        let Chunk::Status(s) = c else { panic!("expected status chunk") };
        assert!(s.should_terminate());
        assert_eq!(s.triggering_tool().as_deref(), Some("ask"));
    }

    #[test]
    fn function_name_wins_over_tag_name() {
        let c = chunk(json!({
            "type": "status",
            "metadata": {"agent_should_terminate": true},
            "content": {"function_name": "complete", "xml_tag_name": "ask"}
        }));
        let Chunk::Status(s) = c else { panic!("expected status chunk") };
        assert_eq!(s.triggering_tool().as_deref(), Some("complete"));
    }

    #[test]
    fn malformed_metadata_does_not_terminate() {
        let c = chunk(json!({"type": "status", "metadata": "{broken"}));
        let Chunk::Status(s) = c else { panic!("expected status chunk") };
        assert!(!s.should_terminate());
    }

    #[test]
    fn error_status_is_detected() {
        assert!(chunk(json!({"type": "status", "status": "error", "message": "boom"})).is_error());
        assert!(!chunk(json!({"type": "status", "status": "stopped"})).is_error());
    }
}

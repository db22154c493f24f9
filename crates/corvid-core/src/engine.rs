// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use corvid_config::ReasoningEffort;
use corvid_tools::ToolRegistry;
use futures::{stream, Stream};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::chunk::Chunk;
use crate::message::LlmMessage;
use crate::store::InMemoryMessageStore;
use crate::trace::Generation;

/// Chunks produced by one engine call.  An `Err` item means consumption
/// failed mid-stream.
pub type EngineStream = Pin<Box<dyn Stream<Item = anyhow::Result<Chunk>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    Required,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolExecutionStrategy {
    Sequential,
    Parallel,
}

/// Where tool results of XML calls are written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XmlAddingStrategy {
    UserMessage,
    AssistantMessage,
    InlineEdit,
}

/// How the engine parses and executes tool calls in model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub xml_tool_calling: bool,
    pub native_tool_calling: bool,
    pub execute_tools: bool,
    pub execute_on_stream: bool,
    pub tool_execution_strategy: ToolExecutionStrategy,
    pub xml_adding_strategy: XmlAddingStrategy,
}

impl ProcessorConfig {
    /// XML tool calls only, executed in parallel while the response streams.
    pub fn xml_streaming() -> Self {
        Self {
            xml_tool_calling: true,
            native_tool_calling: false,
            execute_tools: true,
            execute_on_stream: true,
            tool_execution_strategy: ToolExecutionStrategy::Parallel,
            xml_adding_strategy: XmlAddingStrategy::UserMessage,
        }
    }
}

/// Everything the engine needs for one call.
#[derive(Clone)]
pub struct ThreadRunRequest {
    pub thread_id: String,
    pub system_prompt: LlmMessage,
    pub stream: bool,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: Option<u32>,
    pub tool_choice: ToolChoice,
    pub max_xml_tool_calls: u32,
    pub temporary_message: Option<LlmMessage>,
    pub processor_config: ProcessorConfig,
    pub native_max_auto_continues: u32,
    pub include_xml_examples: bool,
    pub enable_thinking: bool,
    pub reasoning_effort: ReasoningEffort,
    pub enable_context_manager: bool,
    pub generation: Option<Arc<dyn Generation>>,
    /// Tools the engine may dispatch to
    pub tools: Arc<ToolRegistry>,
}

impl std::fmt::Debug for ThreadRunRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadRunRequest")
            .field("thread_id", &self.thread_id)
            .field("llm_model", &self.llm_model)
            .field("llm_max_tokens", &self.llm_max_tokens)
            .field("temporary_message", &self.temporary_message.is_some())
            .field("tools", &self.tools.len())
            .finish_non_exhaustive()
    }
}

/// Result of an engine call: a chunk stream, or an error-shaped chunk
/// returned instead of one.
pub enum ThreadRunResponse {
    Stream(EngineStream),
    Error(Chunk),
}

/// The component that calls the LLM, dispatches tools and persists the
/// resulting messages.
#[async_trait]
pub trait ThreadEngine: Send + Sync {
    async fn run_thread(&self, request: ThreadRunRequest) -> anyhow::Result<ThreadRunResponse>;
}

/// One scripted engine call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineScript {
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    /// The stream fails with this message after the chunks
    #[serde(default)]
    pub stream_error: Option<String>,
    /// The call itself fails
    #[serde(default)]
    pub call_error: Option<String>,
    /// The call returns an error-shaped result with this message
    #[serde(default)]
    pub error_result: Option<String>,
}

impl EngineScript {
    pub fn chunks(chunks: Vec<Chunk>) -> Self {
        Self { chunks, ..Default::default() }
    }

    fn assistant_text(&self) -> String {
        self.chunks
            .iter()
            .filter_map(|c| match c {
                Chunk::Assistant(a) => a.text(),
                _ => None,
            })
            .collect()
    }
}

/// Deterministic engine for tests and scenario replays.  Each call pops the
/// next script; with `repeat_last` the final script serves every further
/// call, otherwise further calls stream nothing.
pub struct ScriptedThreadEngine {
    scripts: Mutex<VecDeque<EngineScript>>,
    repeat_last: bool,
    /// When set, each call persists its assistant text as an `assistant` row
    persist: Option<Arc<InMemoryMessageStore>>,
    requests: Mutex<Vec<ThreadRunRequest>>,
}

impl ScriptedThreadEngine {
    pub fn new(scripts: Vec<EngineScript>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            repeat_last: false,
            persist: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every call returns the same chunks.
    pub fn always(chunks: Vec<Chunk>) -> Self {
        Self::new(vec![EngineScript::chunks(chunks)]).repeating()
    }

    pub fn repeating(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    pub fn persisting_to(mut self, store: Arc<InMemoryMessageStore>) -> Self {
        self.persist = Some(store);
        self
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<ThreadRunRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn next_script(&self) -> EngineScript {
        let Ok(mut scripts) = self.scripts.lock() else {
            return EngineScript::default();
        };
        if self.repeat_last && scripts.len() == 1 {
            return scripts.front().cloned().unwrap_or_default();
        }
        scripts.pop_front().unwrap_or_default()
    }
}

#[async_trait]
impl ThreadEngine for ScriptedThreadEngine {
    async fn run_thread(&self, request: ThreadRunRequest) -> anyhow::Result<ThreadRunResponse> {
        let thread_id = request.thread_id.clone();
        if let Ok(mut r) = self.requests.lock() {
            r.push(request);
        }
        let script = self.next_script();

        if let Some(msg) = script.call_error {
            anyhow::bail!(msg);
        }
        if let Some(msg) = script.error_result {
            return Ok(ThreadRunResponse::Error(Chunk::error(msg)));
        }
        if let Some(store) = &self.persist {
            let text = script.assistant_text();
            if !text.is_empty() {
                store
                    .insert(&thread_id, "assistant", json!({ "role": "assistant", "content": text }))
                    .await;
            }
        }

        let mut items: Vec<anyhow::Result<Chunk>> = script.chunks.into_iter().map(Ok).collect();
        if let Some(msg) = script.stream_error {
            items.push(Err(anyhow::anyhow!(msg)));
        }
        Ok(ThreadRunResponse::Stream(Box::pin(stream::iter(items))))
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    fn request() -> ThreadRunRequest {
        ThreadRunRequest {
            thread_id: "t".into(),
            system_prompt: LlmMessage::system("sys"),
            stream: true,
            llm_model: "m".into(),
            llm_temperature: 0.0,
            llm_max_tokens: None,
            tool_choice: ToolChoice::Auto,
            max_xml_tool_calls: 1,
            temporary_message: None,
            processor_config: ProcessorConfig::xml_streaming(),
            native_max_auto_continues: 25,
            include_xml_examples: true,
            enable_thinking: false,
            reasoning_effort: ReasoningEffort::Low,
            enable_context_manager: true,
            generation: None,
            tools: Arc::new(ToolRegistry::default()),
        }
    }

    async fn drain(resp: ThreadRunResponse) -> Vec<anyhow::Result<Chunk>> {
        match resp {
            ThreadRunResponse::Stream(s) => s.collect().await,
            ThreadRunResponse::Error(c) => panic!("unexpected error result {c:?}"),
        }
    }

    #[test]
    fn xml_streaming_processor_config() {
        let v = serde_json::to_value(ProcessorConfig::xml_streaming()).unwrap();
        assert_eq!(v["tool_execution_strategy"], "parallel");
        assert_eq!(v["xml_adding_strategy"], "user_message");
        assert_eq!(v["native_tool_calling"], false);
    }

    #[tokio::test]
    async fn scripts_are_consumed_in_order_then_empty() {
        let engine = ScriptedThreadEngine::new(vec![
            EngineScript::chunks(vec![Chunk::assistant_text("one")]),
            EngineScript::chunks(vec![Chunk::assistant_text("two")]),
        ]);
        for expected in [1, 1, 0] {
            let items = drain(engine.run_thread(request()).await.unwrap()).await;
            assert_eq!(items.len(), expected);
        }
        assert_eq!(engine.calls(), 3);
    }

    #[tokio::test]
    async fn always_repeats() {
        let engine = ScriptedThreadEngine::always(vec![Chunk::assistant_text("x")]);
        for _ in 0..3 {
            assert_eq!(drain(engine.run_thread(request()).await.unwrap()).await.len(), 1);
        }
    }

    #[tokio::test]
    async fn failure_modes() {
        let engine = ScriptedThreadEngine::new(vec![
            EngineScript { call_error: Some("down".into()), ..Default::default() },
            EngineScript { error_result: Some("bad request".into()), ..Default::default() },
            EngineScript {
                chunks: vec![Chunk::assistant_text("partial")],
                stream_error: Some("reset".into()),
                ..Default::default()
            },
        ]);
        assert!(engine.run_thread(request()).await.is_err());
        assert!(matches!(
            engine.run_thread(request()).await.unwrap(),
            ThreadRunResponse::Error(c) if c.is_error()
        ));
        let items = drain(engine.run_thread(request()).await.unwrap()).await;
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn persisting_engine_writes_assistant_row() {
        let store = Arc::new(InMemoryMessageStore::new());
        let engine = ScriptedThreadEngine::always(vec![Chunk::assistant_text("hello")])
            .persisting_to(store.clone());
        engine.run_thread(request()).await.unwrap();
        let rows = store.thread("t").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message_type, "assistant");
        assert_eq!(rows[0].content["content"], "hello");
    }
}

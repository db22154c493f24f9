// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
/// Scenario tests for the agent run loop.
///
/// Every run is driven by `ScriptedThreadEngine` over an in-memory thread,
/// so each scenario is deterministic and needs no network access.
#[cfg(test)]
mod run_loop_tests {
    use std::sync::{Arc, Mutex};

    use corvid_config::{AgentDefinition, McpServerDescriptor, RunDefaults};
    use corvid_mcp::{McpToolInfo, StaticDiscovery};
    use futures::StreamExt;
    use serde_json::{json, Value};

    use crate::{
        run_agent, BillingStatus, Chunk, ChunkStream, EngineScript, Generation,
        InMemoryMessageStore, ProcessorConfig, Project, RunRequest, RunServices, RunTrace,
        ScriptedThreadEngine, SetupError, StaticBilling, StaticProjects, ToolChoice, TraceLevel,
    };

    // ── Helpers ───────────────────────────────────────────────────────────────

    const THREAD: &str = "thread-1";
    const PROJECT: &str = "project-1";

    struct Harness {
        store: Arc<InMemoryMessageStore>,
        engine: Arc<ScriptedThreadEngine>,
        billing: Arc<StaticBilling>,
    }

    impl Harness {
        async fn new(engine: ScriptedThreadEngine) -> Self {
            Self::with_billing(engine, StaticBilling::allow()).await
        }

        async fn with_billing(engine: ScriptedThreadEngine, billing: StaticBilling) -> Self {
            let store = Arc::new(InMemoryMessageStore::new());
            store.insert(THREAD, "user", json!({"role": "user", "content": "hello"})).await;
            Self { store, engine: Arc::new(engine), billing: Arc::new(billing) }
        }

        fn services(&self) -> RunServices {
            let projects = StaticProjects::new()
                .with_thread(THREAD, "account-1")
                .with_project(Project::new(PROJECT));
            RunServices::new(
                self.engine.clone(),
                self.store.clone(),
                self.billing.clone(),
                Arc::new(projects),
            )
        }

        async fn run(&self, request: RunRequest) -> Vec<Chunk> {
            self.run_traced(request, None).await
        }

        async fn run_traced(&self, request: RunRequest, trace: Option<Arc<dyn RunTrace>>) -> Vec<Chunk> {
            let stream = run_agent(request, &RunDefaults::default(), self.services(), trace)
                .await
                .unwrap_or_else(|e| panic!("setup failed: {e}"));
            collect(stream).await
        }
    }

    async fn collect(stream: ChunkStream) -> Vec<Chunk> {
        stream.collect().await
    }

    fn request(max_iterations: u32) -> RunRequest {
        RunRequest { max_iterations: Some(max_iterations), ..RunRequest::new(THREAD, PROJECT) }
    }

    fn chunk(v: Value) -> Chunk {
        serde_json::from_value(v).unwrap()
    }

    #[derive(Default)]
    struct Recorded {
        inputs: Vec<Value>,
        events: Vec<(String, TraceLevel, String)>,
        generations: Vec<(String, Option<String>, TraceLevel)>,
    }

    #[derive(Default)]
    struct RecordingTrace {
        log: Arc<Mutex<Recorded>>,
    }

    struct RecordingGeneration {
        log: Arc<Mutex<Recorded>>,
    }

    impl Generation for RecordingGeneration {
        fn end(&self, output: &str, status: Option<&str>, level: TraceLevel) {
            self.log.lock().unwrap().generations.push((
                output.to_string(),
                status.map(str::to_string),
                level,
            ));
        }
    }

    impl RunTrace for RecordingTrace {
        fn update_input(&self, input: &Value) {
            self.log.lock().unwrap().inputs.push(input.clone());
        }

        fn event(&self, name: &str, level: TraceLevel, message: &str) {
            self.log.lock().unwrap().events.push((name.into(), level, message.into()));
        }

        fn generation(&self, _name: &str) -> Arc<dyn Generation> {
            Arc::new(RecordingGeneration { log: self.log.clone() })
        }
    }

    // ── Normal completion ────────────────────────────────────────────────────

    #[tokio::test]
    async fn complete_marker_ends_run_after_one_iteration() {
        let reply = chunk(json!({"type": "assistant", "content": "{\"content\":\"Hi there</complete>\"}"}));
        let h = Harness::new(ScriptedThreadEngine::always(vec![reply.clone()])).await;

        let chunks = h.run(request(3)).await;

        assert_eq!(chunks, vec![reply]);
        assert_eq!(h.engine.calls(), 1, "no second engine call after </complete>");
    }

    #[tokio::test]
    async fn non_terminal_turn_continues_until_marker() {
        let engine = ScriptedThreadEngine::new(vec![
            EngineScript::chunks(vec![Chunk::assistant_text("Looking into it")]),
            EngineScript::chunks(vec![Chunk::assistant_text("Done <ask>ok?</ask>")]),
            EngineScript::chunks(vec![Chunk::assistant_text("never reached")]),
        ]);
        let h = Harness::new(engine).await;

        let chunks = h.run(request(10)).await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(h.engine.calls(), 2);
    }

    #[tokio::test]
    async fn termination_metadata_ends_run() {
        let status = chunk(json!({
            "type": "status",
            "status": "tool_completed",
            "metadata": "{\"agent_should_terminate\": true}",
            "content": {"function_name": "ask"}
        }));
        let h = Harness::new(ScriptedThreadEngine::always(vec![status.clone()])).await;

        let chunks = h.run(request(5)).await;

        assert_eq!(chunks, vec![status]);
        assert_eq!(h.engine.calls(), 1);
    }

    #[tokio::test]
    async fn pass_through_chunks_are_relayed_in_order() {
        let tool_result = chunk(json!({"type": "tool", "content": {"name": "web_search"}}));
        let done = Chunk::assistant_text("<complete></complete>");
        let h = Harness::new(ScriptedThreadEngine::always(vec![tool_result.clone(), done.clone()])).await;

        let chunks = h.run(request(5)).await;

        assert_eq!(chunks, vec![tool_result, done]);
    }

    // ── Limits ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn iteration_count_never_exceeds_max() {
        let h = Harness::new(ScriptedThreadEngine::always(vec![Chunk::assistant_text("still working")])).await;

        let chunks = h.run(request(3)).await;

        assert_eq!(h.engine.calls(), 3);
        assert_eq!(h.billing.checks(), 3);
        // No synthetic limit chunk.
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.kind() == "assistant"));
    }

    #[tokio::test]
    async fn latest_assistant_message_stops_without_engine_call() {
        let h = Harness::new(ScriptedThreadEngine::always(vec![Chunk::assistant_text("x")])).await;
        h.store.insert(THREAD, "assistant", json!({"role": "assistant", "content": "earlier"})).await;

        let chunks = h.run(request(3)).await;

        assert!(chunks.is_empty());
        assert_eq!(h.engine.calls(), 0);
    }

    #[tokio::test]
    async fn persisted_assistant_reply_stops_next_iteration() {
        let engine = ScriptedThreadEngine::always(vec![Chunk::assistant_text("partial answer")]);
        let store = Arc::new(InMemoryMessageStore::new());
        let engine = engine.persisting_to(store.clone());
        let mut h = Harness::new(engine).await;
        store.insert(THREAD, "user", json!({"role": "user", "content": "hello"})).await;
        h.store = store;

        let chunks = h.run(request(5)).await;

        assert_eq!(chunks.len(), 1);
        assert_eq!(h.engine.calls(), 1);
    }

    // ── Billing ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn billing_rejection_yields_single_stopped_chunk() {
        let h = Harness::with_billing(
            ScriptedThreadEngine::always(vec![Chunk::assistant_text("x")]),
            StaticBilling::deny("quota exceeded"),
        )
        .await;

        let chunks = h.run(request(3)).await;

        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].to_value(),
            json!({"type": "status", "status": "stopped", "message": "Billing limit reached: quota exceeded"})
        );
        assert_eq!(h.engine.calls(), 0);
    }

    #[tokio::test]
    async fn billing_rejection_on_second_iteration() {
        let h = Harness::with_billing(
            ScriptedThreadEngine::always(vec![Chunk::assistant_text("working")]),
            StaticBilling::new(vec![BillingStatus::allowed(), BillingStatus::denied("out of credits")]),
        )
        .await;

        let chunks = h.run(request(5)).await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].to_value()["message"], "Billing limit reached: out of credits");
        assert_eq!(h.engine.calls(), 1);
    }

    // ── Errors ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn error_chunk_is_relayed_then_run_stops_after_stream() {
        let err = Chunk::error("model overloaded");
        let after = Chunk::assistant_text("trailing text");
        let h = Harness::new(ScriptedThreadEngine::always(vec![err.clone(), after.clone()])).await;

        let chunks = h.run(request(5)).await;

        assert_eq!(chunks, vec![err, after]);
        assert_eq!(h.engine.calls(), 1);
    }

    #[tokio::test]
    async fn engine_call_failure_becomes_error_chunk() {
        let h = Harness::new(ScriptedThreadEngine::new(vec![EngineScript {
            call_error: Some("connection refused".into()),
            ..Default::default()
        }]))
        .await;

        let chunks = h.run(request(5)).await;

        assert_eq!(
            chunks,
            vec![Chunk::error("Error running thread: connection refused")]
        );
    }

    #[tokio::test]
    async fn engine_error_result_is_yielded_and_stops() {
        let h = Harness::new(
            ScriptedThreadEngine::new(vec![EngineScript {
                error_result: Some("context too long".into()),
                ..Default::default()
            }])
            .repeating(),
        )
        .await;

        let chunks = h.run(request(5)).await;

        assert_eq!(chunks, vec![Chunk::error("context too long")]);
        assert_eq!(h.engine.calls(), 1);
    }

    #[tokio::test]
    async fn stream_failure_becomes_error_chunk() {
        let h = Harness::new(ScriptedThreadEngine::new(vec![EngineScript {
            chunks: vec![Chunk::assistant_text("partial")],
            stream_error: Some("connection reset".into()),
            ..Default::default()
        }]))
        .await;

        let chunks = h.run(request(5)).await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1], Chunk::error("Error during response streaming: connection reset"));
    }

    #[tokio::test]
    async fn malformed_chunk_json_is_not_fatal() {
        let bad = chunk(json!({"type": "assistant", "content": "{not json"}));
        let bad_status = chunk(json!({"type": "status", "status": "x", "metadata": "{oops"}));
        let done = Chunk::assistant_text("</complete>");
        let h = Harness::new(ScriptedThreadEngine::always(vec![bad.clone(), bad_status.clone(), done.clone()])).await;

        let chunks = h.run(request(5)).await;

        assert_eq!(chunks, vec![bad, bad_status, done]);
    }

    // ── Setup ─────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn unknown_account_fails_setup() {
        let h = Harness::new(ScriptedThreadEngine::new(vec![])).await;
        let req = RunRequest::new("other-thread", PROJECT);
        let res = run_agent(req, &RunDefaults::default(), h.services(), None).await;
        assert!(matches!(res, Err(SetupError::AccountNotFound)));
        assert_eq!(h.engine.calls(), 0);
    }

    #[tokio::test]
    async fn unknown_project_fails_setup() {
        let h = Harness::new(ScriptedThreadEngine::new(vec![])).await;
        let req = RunRequest::new(THREAD, "missing");
        match run_agent(req, &RunDefaults::default(), h.services(), None).await {
            Err(e) => assert_eq!(e.to_string(), "Project missing not found"),
            Ok(_) => panic!("setup should fail"),
        }
    }

    // ── Engine request ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn engine_request_carries_generation_settings() {
        let h = Harness::new(ScriptedThreadEngine::always(vec![Chunk::assistant_text("</complete>")])).await;
        let req = RunRequest {
            model_name: Some("anthropic/claude-sonnet-4".into()),
            native_max_auto_continues: Some(7),
            enable_thinking: Some(true),
            ..request(3)
        };

        h.run(req).await;

        let requests = h.engine.requests();
        let sent = &requests[0];
        assert_eq!(sent.thread_id, THREAD);
        assert_eq!(sent.llm_model, "anthropic/claude-sonnet-4");
        assert_eq!(sent.llm_temperature, 0.0);
        assert_eq!(sent.llm_max_tokens, Some(8192));
        assert_eq!(sent.tool_choice, ToolChoice::Auto);
        assert_eq!(sent.max_xml_tool_calls, 1);
        assert_eq!(sent.processor_config, ProcessorConfig::xml_streaming());
        assert_eq!(sent.native_max_auto_continues, 7);
        assert!(sent.enable_thinking);
        assert!(sent.include_xml_examples);
        assert!(sent.temporary_message.is_none());
        assert_eq!(sent.system_prompt.role, "system");
        assert!(sent.tools.get("complete").is_some());
        assert!(sent.generation.is_none());
    }

    #[tokio::test]
    async fn default_model_has_no_token_override() {
        let h = Harness::new(ScriptedThreadEngine::always(vec![Chunk::assistant_text("</complete>")])).await;
        h.run(request(1)).await;
        assert_eq!(h.engine.requests()[0].llm_max_tokens, None);
    }

    #[tokio::test]
    async fn browser_state_is_injected_as_temporary_message() {
        let h = Harness::new(ScriptedThreadEngine::always(vec![Chunk::assistant_text("</complete>")])).await;
        h.store.insert(THREAD, "browser_state", json!({"url": "https://example.com"})).await;

        h.run(request(1)).await;

        let temp = h.engine.requests()[0].temporary_message.clone().unwrap();
        assert_eq!(temp.role, "user");
        assert!(temp.blocks()[0]["text"].as_str().unwrap().contains("https://example.com"));
    }

    #[tokio::test]
    async fn mcp_tools_reach_registry_and_prompt() {
        let h = Harness::new(ScriptedThreadEngine::always(vec![Chunk::assistant_text("</complete>")])).await;
        let agent = AgentDefinition {
            configured_mcps: vec![McpServerDescriptor {
                name: "Exa".into(),
                qualified_name: "exa".into(),
                config: json!({}),
                enabled_tools: vec![],
                instructions: String::new(),
                is_custom: false,
                custom_type: None,
            }],
            ..Default::default()
        };
        let discovery = StaticDiscovery::new().with_server(
            "exa",
            vec![McpToolInfo { name: "search".into(), description: "Web search".into(), input_schema: json!({}) }],
        );
        let services = h.services().with_mcp_discovery(Arc::new(discovery));
        let req = RunRequest { agent: Some(agent), ..request(1) };

        let stream = run_agent(req, &RunDefaults::default(), services, None).await.unwrap();
        collect(stream).await;

        let requests = h.engine.requests();
        let sent = &requests[0];
        assert!(sent.tools.get("mcp_exa_search").is_some());
        assert!(sent.system_prompt.text().unwrap().contains("- **mcp_exa_search**: Web search (MCP Server: Exa)"));
    }

    // ── Tracing ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn trace_records_input_events_and_generation() {
        let h = Harness::new(ScriptedThreadEngine::always(vec![Chunk::assistant_text("Bye</complete>")])).await;
        let trace = Arc::new(RecordingTrace::default());

        h.run_traced(request(3), Some(trace.clone())).await;

        let log = trace.log.lock().unwrap();
        assert_eq!(log.inputs, vec![json!("hello")]);
        assert!(log.events.iter().any(|(name, _, msg)| name == "agent_used_xml_tool" && msg.contains("complete")));
        assert_eq!(
            log.generations,
            vec![("Bye</complete>".to_string(), Some("agent_stopped".to_string()), TraceLevel::Default)]
        );
        assert!(h.engine.requests()[0].generation.is_some());
    }

    #[tokio::test]
    async fn trace_records_billing_stop() {
        let h = Harness::with_billing(ScriptedThreadEngine::new(vec![]), StaticBilling::deny("quota exceeded")).await;
        let trace = Arc::new(RecordingTrace::default());

        h.run_traced(request(3), Some(trace.clone())).await;

        let log = trace.log.lock().unwrap();
        assert_eq!(
            log.events,
            vec![(
                "billing_limit_reached".to_string(),
                TraceLevel::Error,
                "Billing limit reached: quota exceeded".to_string()
            )]
        );
        assert!(log.generations.is_empty());
    }

    #[tokio::test]
    async fn trace_marks_error_detected_generation() {
        let h = Harness::new(ScriptedThreadEngine::always(vec![Chunk::error("boom")])).await;
        let trace = Arc::new(RecordingTrace::default());

        h.run_traced(request(3), Some(trace.clone())).await;

        let log = trace.log.lock().unwrap();
        assert!(log.events.iter().any(|(name, level, _)| name == "error_chunk_detected" && *level == TraceLevel::Error));
        assert_eq!(log.generations[0].1.as_deref(), Some("error_detected"));
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_stream::stream;
use corvid_config::{AgentDefinition, ReasoningEffort, RunDefaults, DEFAULT_MODEL};
use corvid_mcp::{CredentialProfiles, McpDiscovery, McpManager, McpSchemaCache, McpToolWrapper, StaticDiscovery};
use corvid_tools::{disabled_tools_from_config, EmptyCatalog, ToolCatalog, ToolManager, ToolRegistry, ToolRegistryBuilder};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::chunk::{Chunk, ChunkStream};
use crate::engine::{ProcessorConfig, ThreadEngine, ThreadRunRequest, ThreadRunResponse, ToolChoice};
use crate::message::{LlmMessage, MessageManager};
use crate::prompt::PromptManager;
use crate::services::{BillingService, KnowledgeBase, Project, ProjectDirectory};
use crate::signals::{max_tokens_for_model, IterationState, Signal};
use crate::store::MessageStore;
use crate::trace::{RunTrace, TraceLevel};

/// Message types that decide whether the turn is already over.
const CONVERSATION_TYPES: [&str; 3] = ["assistant", "tool", "user"];

/// Immutable parameters of one run.
#[derive(Clone)]
pub struct AgentConfig {
    pub thread_id: String,
    pub project_id: String,
    pub stream: bool,
    pub native_max_auto_continues: u32,
    pub max_iterations: u32,
    pub model_name: String,
    pub enable_thinking: bool,
    pub reasoning_effort: ReasoningEffort,
    pub enable_context_manager: bool,
    pub agent: Option<AgentDefinition>,
    pub trace: Option<Arc<dyn RunTrace>>,
    pub is_agent_builder: bool,
    pub target_agent_id: Option<String>,
}

impl AgentConfig {
    /// Agent id the agent-builder tools operate on, if any.
    ///
    /// The stock default agent configures itself; in agent-builder mode the
    /// target agent is configured.
    pub fn builder_agent_id(&self) -> Option<&str> {
        match &self.agent {
            Some(agent) if agent.is_default_agent => agent.agent_id.as_deref(),
            _ if self.is_agent_builder => self.target_agent_id.as_deref(),
            _ => None,
        }
    }
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("thread_id", &self.thread_id)
            .field("project_id", &self.project_id)
            .field("model_name", &self.model_name)
            .field("max_iterations", &self.max_iterations)
            .field("is_agent_builder", &self.is_agent_builder)
            .field("trace", &self.trace.is_some())
            .finish_non_exhaustive()
    }
}

/// Caller-supplied run parameters.  Unset fields fall back to
/// [`RunDefaults`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRequest {
    pub thread_id: String,
    pub project_id: String,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub native_max_auto_continues: Option<u32>,
    #[serde(default)]
    pub max_iterations: Option<u32>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub enable_thinking: Option<bool>,
    #[serde(default)]
    pub reasoning_effort: Option<ReasoningEffort>,
    #[serde(default)]
    pub enable_context_manager: Option<bool>,
    #[serde(default, alias = "agent_config")]
    pub agent: Option<AgentDefinition>,
    #[serde(default)]
    pub is_agent_builder: bool,
    #[serde(default)]
    pub target_agent_id: Option<String>,
}

impl RunRequest {
    pub fn new(thread_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self { thread_id: thread_id.into(), project_id: project_id.into(), ..Default::default() }
    }

    /// Resolve against `defaults`.  When the model is the built-in default
    /// and the agent names its own model, the agent's model is used.
    pub fn into_config(self, defaults: &RunDefaults, trace: Option<Arc<dyn RunTrace>>) -> AgentConfig {
        let mut model_name = self.model_name.unwrap_or_else(|| defaults.model_name.clone());
        if model_name == DEFAULT_MODEL {
            if let Some(agent_model) = self
                .agent
                .as_ref()
                .and_then(|a| a.model.as_deref())
                .filter(|m| !m.is_empty())
            {
                debug!(model = agent_model, "using agent model");
                model_name = agent_model.to_string();
            }
        }

        AgentConfig {
            thread_id: self.thread_id,
            project_id: self.project_id,
            stream: self.stream.unwrap_or(defaults.stream),
            native_max_auto_continues: self
                .native_max_auto_continues
                .unwrap_or(defaults.native_max_auto_continues),
            max_iterations: self.max_iterations.unwrap_or(defaults.max_iterations),
            model_name,
            enable_thinking: self.enable_thinking.unwrap_or(defaults.enable_thinking),
            reasoning_effort: self.reasoning_effort.unwrap_or(defaults.reasoning_effort),
            enable_context_manager: self
                .enable_context_manager
                .unwrap_or(defaults.enable_context_manager),
            agent: self.agent,
            trace,
            is_agent_builder: self.is_agent_builder,
            target_agent_id: self.target_agent_id,
        }
    }
}

/// Backends a run talks to.
#[derive(Clone)]
pub struct RunServices {
    pub engine: Arc<dyn ThreadEngine>,
    pub store: Arc<dyn MessageStore>,
    pub billing: Arc<dyn BillingService>,
    pub projects: Arc<dyn ProjectDirectory>,
    pub knowledge: Option<Arc<dyn KnowledgeBase>>,
    pub catalog: Arc<dyn ToolCatalog>,
    pub mcp_discovery: Arc<dyn McpDiscovery>,
    pub credential_profiles: Option<Arc<dyn CredentialProfiles>>,
    pub mcp_cache: Option<Arc<McpSchemaCache>>,
    /// A data-provider API key is configured
    pub data_provider_key: bool,
}

impl RunServices {
    pub fn new(
        engine: Arc<dyn ThreadEngine>,
        store: Arc<dyn MessageStore>,
        billing: Arc<dyn BillingService>,
        projects: Arc<dyn ProjectDirectory>,
    ) -> Self {
        Self {
            engine,
            store,
            billing,
            projects,
            knowledge: None,
            catalog: Arc::new(EmptyCatalog),
            mcp_discovery: Arc::new(StaticDiscovery::new()),
            credential_profiles: None,
            mcp_cache: None,
            data_provider_key: false,
        }
    }

    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeBase>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn ToolCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_mcp_discovery(mut self, discovery: Arc<dyn McpDiscovery>) -> Self {
        self.mcp_discovery = discovery;
        self
    }

    pub fn with_credential_profiles(mut self, profiles: Arc<dyn CredentialProfiles>) -> Self {
        self.credential_profiles = Some(profiles);
        self
    }

    pub fn with_mcp_cache(mut self, cache: Arc<McpSchemaCache>) -> Self {
        self.mcp_cache = Some(cache);
        self
    }

    pub fn with_data_provider_key(mut self, available: bool) -> Self {
        self.data_provider_key = available;
        self
    }
}

/// Failures that prevent a run from starting.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Could not determine account ID for thread")]
    AccountNotFound,
    #[error("Project {0} not found")]
    ProjectNotFound(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Drives one agent run.
pub struct AgentRunner {
    config: AgentConfig,
    services: RunServices,
}

impl AgentRunner {
    pub fn new(config: AgentConfig, services: RunServices) -> Self {
        Self { config, services }
    }

    /// Resolve the account and project, register tools, and build the
    /// system prompt.
    pub async fn setup(self) -> Result<PreparedRun, SetupError> {
        let Self { config, services } = self;

        let account_id = services
            .projects
            .account_id_for_thread(&config.thread_id)
            .await?
            .ok_or(SetupError::AccountNotFound)?;
        let project = services
            .projects
            .project(&config.project_id)
            .await?
            .ok_or_else(|| SetupError::ProjectNotFound(config.project_id.clone()))?;
        if project.sandbox_id().is_none() {
            debug!(project_id = %project.project_id, "no sandbox yet, it is created on first use");
        }

        let mut builder = ToolRegistryBuilder::new();
        let disabled = disabled_tools_from_config(config.agent.as_ref());
        ToolManager::new(
            Arc::clone(&services.catalog),
            &config.project_id,
            &config.thread_id,
            services.data_provider_key,
        )
        .register_all_tools(&mut builder, config.builder_agent_id(), &disabled);

        let mcp = match &config.agent {
            Some(agent) => {
                let mut manager = McpManager::new(&account_id, Arc::clone(&services.mcp_discovery));
                if let Some(profiles) = &services.credential_profiles {
                    manager = manager.with_profiles(Arc::clone(profiles));
                }
                if let Some(cache) = &services.mcp_cache {
                    manager = manager.with_cache(Arc::clone(cache));
                }
                manager.register_mcp_tools(agent, &mut builder).await
            }
            None => None,
        };

        let tools = Arc::new(builder.build());
        debug!(tools = ?tools.names(), "tool registry ready");

        let system_prompt = PromptManager::new(services.knowledge.clone())
            .build_system_prompt(
                &config.model_name,
                config.agent.as_ref(),
                config.is_agent_builder,
                &config.thread_id,
                mcp.as_deref(),
            )
            .await;

        Ok(PreparedRun { config, services, account_id, project, tools, mcp, system_prompt })
    }

    pub async fn run(self) -> Result<ChunkStream, SetupError> {
        Ok(self.setup().await?.into_stream())
    }
}

/// A run whose setup succeeded; iterating it starts the loop.
pub struct PreparedRun {
    config: AgentConfig,
    services: RunServices,
    account_id: String,
    project: Project,
    tools: Arc<ToolRegistry>,
    mcp: Option<Arc<McpToolWrapper>>,
    system_prompt: LlmMessage,
}

impl PreparedRun {
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn mcp_wrapper(&self) -> Option<&McpToolWrapper> {
        self.mcp.as_deref()
    }

    pub fn system_prompt(&self) -> &LlmMessage {
        &self.system_prompt
    }

    fn thread_request(&self, temporary_message: Option<LlmMessage>) -> ThreadRunRequest {
        let cfg = &self.config;
        ThreadRunRequest {
            thread_id: cfg.thread_id.clone(),
            system_prompt: self.system_prompt.clone(),
            stream: cfg.stream,
            llm_model: cfg.model_name.clone(),
            llm_temperature: 0.0,
            llm_max_tokens: max_tokens_for_model(&cfg.model_name),
            tool_choice: ToolChoice::Auto,
            max_xml_tool_calls: 1,
            temporary_message,
            processor_config: ProcessorConfig::xml_streaming(),
            native_max_auto_continues: cfg.native_max_auto_continues,
            include_xml_examples: true,
            enable_thinking: cfg.enable_thinking,
            reasoning_effort: cfg.reasoning_effort,
            enable_context_manager: cfg.enable_context_manager,
            generation: None,
            tools: Arc::clone(&self.tools),
        }
    }

    /// Record the latest user message as the trace input.
    async fn record_trace_input(&self, trace: &dyn RunTrace) {
        let row = match self.services.store.latest_message(&self.config.thread_id, &["user"]).await {
            Ok(Some(row)) => row,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "could not read latest user message for trace");
                return;
            }
        };
        match row.content_object() {
            Ok(content) => trace.update_input(content.get("content").unwrap_or(&Value::Null)),
            Err(e) => warn!(message_id = %row.message_id, error = %e, "could not parse user message"),
        }
    }

    /// Run the loop.  Every engine chunk is relayed in order; the loop adds
    /// its own `status` chunks for billing stops and errors.  Dropping the
    /// stream cancels the run at the pending await.
    pub fn into_stream(self) -> ChunkStream {
        let run = self;
        Box::pin(stream! {
            let trace = run.config.trace.clone();
            if let Some(trace) = &trace {
                run.record_trace_input(trace.as_ref()).await;
            }
            let thread_id = run.config.thread_id.clone();
            let max_iterations = run.config.max_iterations;
            let messages = MessageManager::new(
                Arc::clone(&run.services.store),
                &thread_id,
                &run.config.model_name,
            );

            let mut iteration = 0u32;
            while iteration < max_iterations {
                iteration += 1;
                info!(thread_id = %thread_id, "running iteration {iteration} of {max_iterations}");

                match run.services.billing.check_billing_status(&run.account_id).await {
                    Ok(status) if !status.can_run => {
                        let msg = format!("Billing limit reached: {}", status.message);
                        if let Some(trace) = &trace {
                            trace.event("billing_limit_reached", TraceLevel::Error, &msg);
                        }
                        yield Chunk::stopped(msg);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "billing check failed");
                        yield Chunk::error(format!("Error checking billing status: {e}"));
                        break;
                    }
                }

                match run.services.store.latest_message(&thread_id, &CONVERSATION_TYPES).await {
                    Ok(Some(row)) if row.message_type == "assistant" => {
                        info!(thread_id = %thread_id, "last message was from assistant, stopping execution");
                        if let Some(trace) = &trace {
                            trace.event(
                                "last_message_from_assistant",
                                TraceLevel::Default,
                                "Last message was from assistant, stopping execution",
                            );
                        }
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "could not read thread messages");
                        yield Chunk::error(format!("Error reading thread messages: {e}"));
                        break;
                    }
                }

                let temporary_message = match messages.build_temporary_message().await {
                    Ok(m) => m,
                    Err(e) => {
                        error!(error = %e, "could not build temporary message");
                        yield Chunk::error(format!("Error building temporary message: {e}"));
                        break;
                    }
                };

                let generation = trace.as_ref().map(|t| t.generation("thread_manager.run_thread"));
                let mut request = run.thread_request(temporary_message);
                request.generation = generation.clone();

                let response = match run.services.engine.run_thread(request).await {
                    Ok(r) => r,
                    Err(e) => {
                        error!(error = %e, "error running thread");
                        yield Chunk::error(format!("Error running thread: {e}"));
                        break;
                    }
                };
                let mut chunks = match response {
                    ThreadRunResponse::Stream(s) => s,
                    ThreadRunResponse::Error(chunk) => {
                        error!(chunk = ?chunk, "thread engine returned an error");
                        if let Some(g) = &generation {
                            g.end("", Some("error"), TraceLevel::Error);
                        }
                        yield chunk;
                        break;
                    }
                };

                let mut state = IterationState::default();
                let mut stream_error = None;
                while let Some(item) = chunks.next().await {
                    let chunk = match item {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            stream_error = Some(format!("Error during response streaming: {e}"));
                            break;
                        }
                    };
                    match state.observe(&chunk) {
                        Some(Signal::ErrorChunk(msg)) => {
                            error!(detail = %msg, "error chunk detected");
                            if let Some(trace) = &trace {
                                trace.event("error_chunk_detected", TraceLevel::Error, &msg);
                            }
                        }
                        Some(Signal::TerminationRequested(tool)) => {
                            info!(tool = ?tool, "agent termination signal detected");
                            if let Some(trace) = &trace {
                                trace.event(
                                    "agent_termination_signal_detected",
                                    TraceLevel::Default,
                                    "Agent termination signal detected in status message",
                                );
                            }
                        }
                        Some(Signal::TerminalMarker(tool)) => {
                            info!(tool = %tool, "agent used terminal tool");
                            if let Some(trace) = &trace {
                                trace.event(
                                    "agent_used_xml_tool",
                                    TraceLevel::Default,
                                    &format!("Agent used XML tool: {tool}"),
                                );
                            }
                        }
                        None => {}
                    }
                    yield chunk;
                }

                if let Some(msg) = stream_error {
                    error!(detail = %msg, "stream consumption failed");
                    if let Some(g) = &generation {
                        g.end(&state.full_response, Some(&msg), TraceLevel::Error);
                    }
                    yield Chunk::error(msg);
                    break;
                }
                if state.error_detected {
                    info!("stopping after error chunk");
                    if let Some(g) = &generation {
                        g.end(&state.full_response, Some("error_detected"), TraceLevel::Error);
                    }
                    break;
                }
                if state.turn_finished() {
                    info!(tool = ?state.last_tool_call, "agent finished the turn");
                    if let Some(g) = &generation {
                        g.end(&state.full_response, Some("agent_stopped"), TraceLevel::Default);
                    }
                    break;
                }
                if let Some(g) = &generation {
                    g.end(&state.full_response, None, TraceLevel::Default);
                }
            }
            debug!(thread_id = %thread_id, iterations = iteration, "agent run finished");
        })
    }
}

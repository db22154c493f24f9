// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod chunk;
mod engine;
mod message;
mod prompt;
mod runner;
mod scenario;
mod services;
mod signals;
mod store;
mod trace;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use corvid_config::RunDefaults;
use tracing::info;

pub use chunk::{AssistantChunk, Chunk, ChunkStream, StatusChunk};
pub use engine::{
    EngineScript, EngineStream, ProcessorConfig, ScriptedThreadEngine, ThreadEngine,
    ThreadRunRequest, ThreadRunResponse, ToolChoice, ToolExecutionStrategy, XmlAddingStrategy,
};
pub use message::{LlmMessage, MessageManager};
pub use prompt::{datetime_block, PromptManager, AGENT_BUILDER_PROMPT, DEFAULT_SYSTEM_PROMPT};
pub use runner::{AgentConfig, AgentRunner, PreparedRun, RunRequest, RunServices, SetupError};
pub use scenario::{Scenario, ScenarioRun, SeedMessage};
pub use services::{
    BillingService, BillingStatus, KnowledgeBase, Project, ProjectDirectory, StaticBilling,
    StaticKnowledgeBase, StaticProjects,
};
pub use signals::{detect_terminal_marker, max_tokens_for_model, IterationState, Signal, TerminalTool};
pub use store::{InMemoryMessageStore, MessageRow, MessageStore};
pub use trace::{Generation, RunTrace, TraceLevel, TracingRunTrace};

/// Start an agent run on a thread.
///
/// Setup failures (unknown account or project, backend errors) are returned
/// before any chunk is produced.  Everything after that arrives as chunks.
pub async fn run_agent(
    request: RunRequest,
    defaults: &RunDefaults,
    services: RunServices,
    trace: Option<Arc<dyn RunTrace>>,
) -> Result<ChunkStream, SetupError> {
    let config = request.into_config(defaults, trace);
    info!(
        thread_id = %config.thread_id,
        project_id = %config.project_id,
        model = %config.model_name,
        max_iterations = config.max_iterations,
        "starting agent run"
    );
    AgentRunner::new(config, services).run().await
}

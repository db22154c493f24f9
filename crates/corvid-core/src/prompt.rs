// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use corvid_config::AgentDefinition;
use corvid_mcp::McpToolWrapper;
use corvid_tools::SchemaType;
use tracing::{debug, error};

use crate::message::LlmMessage;
use crate::services::KnowledgeBase;

const SAMPLE_RESPONSE: &str = include_str!("assets/sample_response.txt");

/// Base instructions for ordinary task runs.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are Corvid, an autonomous agent that completes tasks for the user inside a
sandboxed workspace.

# Working style
- Break the task into steps and keep the task list current.
- Use tools to act; report only what the tools actually returned.
- Invoke tools with the XML function-call format.  Make at most one tool call
  per reply and wait for its result before continuing.

# Ending a turn
- Use `ask` when you need input from the user.
- Use `complete` when every task is finished, attaching any deliverables.
- Use `web-browser-takeover` when the user must act in the browser.
Never end a turn without one of these three tools.";

/// Base instructions when the run configures an agent instead of doing
/// user work.
pub const AGENT_BUILDER_PROMPT: &str = "\
You are the Corvid agent builder.  You help the user design and configure
an agent: its name, its system prompt, the tools it may use, the MCP servers
it connects to, its workflows and its triggers.

- Ask clarifying questions before changing the configuration.
- Apply changes with the agent configuration tools and confirm each change.
- Use `ask` to request input and `complete` when the agent is configured.";

const MCP_RESULT_RULES: &str = "\
\n🚨 CRITICAL MCP TOOL RESULT INSTRUCTIONS 🚨\n\
When you use ANY MCP (Model Context Protocol) tools:\n\
1. ALWAYS read and use the EXACT results returned by the MCP tool\n\
2. For search tools: ONLY cite URLs, sources, and information from the actual search results\n\
3. For any tool: Base your response entirely on the tool's output - do NOT add external information\n\
4. DO NOT fabricate, invent, hallucinate, or make up any sources, URLs, or data\n\
5. If you need more information, call the MCP tool again with different parameters\n\
6. When writing reports/summaries: Reference ONLY the data from MCP tool results\n\
7. If the MCP tool doesn't return enough information, explicitly state this limitation\n\
8. Always double-check that every fact, URL, and reference comes from the MCP tool output\n\
\nIMPORTANT: MCP tool results are your PRIMARY and ONLY source of truth for external data!\n\
NEVER supplement MCP results with your training data or make assumptions beyond what the tools provide.\n";

/// Assembles the system prompt of a run.
#[derive(Default)]
pub struct PromptManager {
    knowledge: Option<Arc<dyn KnowledgeBase>>,
}

impl PromptManager {
    pub fn new(knowledge: Option<Arc<dyn KnowledgeBase>>) -> Self {
        Self { knowledge }
    }

    pub async fn build_system_prompt(
        &self,
        model_name: &str,
        agent: Option<&AgentDefinition>,
        is_agent_builder: bool,
        thread_id: &str,
        mcp: Option<&McpToolWrapper>,
    ) -> LlmMessage {
        self.build_system_prompt_at(model_name, agent, is_agent_builder, thread_id, mcp, Utc::now())
            .await
    }

    /// As [`build_system_prompt`](Self::build_system_prompt) with a fixed
    /// clock.
    pub async fn build_system_prompt_at(
        &self,
        model_name: &str,
        agent: Option<&AgentDefinition>,
        is_agent_builder: bool,
        thread_id: &str,
        mcp: Option<&McpToolWrapper>,
        now: DateTime<Utc>,
    ) -> LlmMessage {
        let custom = agent
            .and_then(|a| a.system_prompt.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty());

        let mut content = if is_agent_builder {
            debug!(thread_id, "using agent builder system prompt");
            AGENT_BUILDER_PROMPT.to_string()
        } else if let Some(custom) = custom {
            debug!(thread_id, "using custom agent system prompt");
            custom.to_string()
        } else {
            let mut base = DEFAULT_SYSTEM_PROMPT.to_string();
            if !model_name.to_lowercase().contains("anthropic") {
                base.push_str("\n\n <sample_assistant_response>");
                base.push_str(SAMPLE_RESPONSE);
                base.push_str("</sample_assistant_response>");
            }
            base
        };

        if let Some(agent_id) = agent.and_then(|a| a.agent_id.as_deref()) {
            if let Some(section) = self.knowledge_section(agent_id).await {
                content.push_str(&section);
            }
        }

        if let (Some(agent), Some(mcp)) = (agent, mcp) {
            if agent.has_mcp_servers() && mcp.is_initialized() {
                content.push_str(&mcp_section(mcp));
            }
        }

        content.push_str(&datetime_block(now));
        LlmMessage::system(content)
    }

    async fn knowledge_section(&self, agent_id: &str) -> Option<String> {
        let kb = self.knowledge.as_ref()?;
        match kb.agent_context(agent_id).await {
            Ok(Some(data)) if !data.trim().is_empty() => {
                debug!(agent_id, len = data.len(), "adding agent knowledge base to system prompt");
                Some(format!(
                    "\n\n=== AGENT KNOWLEDGE BASE ===\n\
                     NOTICE: The following is your specialized knowledge base. This information should be considered authoritative for your responses and should take precedence over general knowledge when relevant.\n\n\
                     {data}\n\n\
                     === END AGENT KNOWLEDGE BASE ===\n\n\
                     IMPORTANT: Always reference and utilize the knowledge base information above when it's relevant to user queries. This knowledge is specific to your role and capabilities."
                ))
            }
            Ok(_) => {
                debug!(agent_id, "no knowledge base context for agent");
                None
            }
            Err(e) => {
                error!(agent_id, error = %e, "error retrieving knowledge base context");
                None
            }
        }
    }
}

/// Documentation of the MCP tools discovered for this run.
fn mcp_section(mcp: &McpToolWrapper) -> String {
    let mut s = String::from("\n\n--- MCP Tools Available ---\n");
    s.push_str("You have access to external MCP (Model Context Protocol) server tools.\n");
    s.push_str(
        "MCP tools can be called directly using their native function names in the standard function calling format:\n",
    );
    s.push_str("<function_calls>\n");
    s.push_str("<invoke name=\"{tool_name}\">\n");
    s.push_str("<parameter name=\"param1\">value1</parameter>\n");
    s.push_str("<parameter name=\"param2\">value2</parameter>\n");
    s.push_str("</invoke>\n");
    s.push_str("</function_calls>\n\n");

    s.push_str("Available MCP tools:\n");
    for (method, schema) in mcp.schema_map() {
        if schema.schema_type != SchemaType::OpenApi {
            continue;
        }
        let description = if schema.description.is_empty() {
            "No description available"
        } else {
            schema.description.as_str()
        };
        let _ = writeln!(s, "- **{method}**: {description}");
        let params = schema.parameter_names();
        if !params.is_empty() {
            let _ = writeln!(s, "  Parameters: {}", params.join(", "));
        }
    }

    s.push_str(MCP_RESULT_RULES);
    s
}

/// Current date and time, spelled out for the model.
pub fn datetime_block(now: DateTime<Utc>) -> String {
    format!(
        "\n\n=== CURRENT DATE/TIME INFORMATION ===\n\
         Today's date: {}\n\
         Current UTC time: {}\n\
         Current year: {}\n\
         Current month: {}\n\
         Current day: {}\n\
         Use this information for any time-sensitive tasks, research, or when current date/time context is needed.\n",
        now.format("%A, %B %d, %Y"),
        now.format("%H:%M:%S UTC"),
        now.format("%Y"),
        now.format("%B"),
        now.format("%A"),
    )
}

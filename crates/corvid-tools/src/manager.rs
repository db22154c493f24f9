// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use corvid_config::AgentDefinition;
use serde_json::Value;
use tracing::debug;

use crate::{names, MessageTool, ToolCatalog, ToolContext, ToolRegistryBuilder};

/// Derive the list of switched-off tools from an agent definition.
///
/// Each entry of the enablement map is either a bare bool or an object with
/// an `enabled` bool.  Absent or malformed entries count as enabled, as does
/// a tool configuration that is not an object at all.  The stock default
/// agent with an empty map gets every tool.
pub fn disabled_tools_from_config(agent: Option<&AgentDefinition>) -> Vec<String> {
    let Some(agent) = agent else {
        return Vec::new();
    };
    let Some(Value::Object(raw)) = agent.tool_config.as_ref() else {
        return Vec::new();
    };
    if agent.is_default_agent && raw.is_empty() {
        return Vec::new();
    }

    let is_enabled = |tool: &str| match raw.get(tool) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Object(o)) => o.get("enabled").and_then(Value::as_bool).unwrap_or(true),
        _ => true,
    };

    let mut disabled: Vec<String> = names::KNOWN_TOOLS
        .iter()
        .filter(|t| !is_enabled(t))
        .map(|t| t.to_string())
        .collect();

    if disabled.iter().any(|t| t == names::PRESENTATION) {
        disabled.push(names::PRESENTATION_OUTLINE.to_string());
        disabled.push(names::PRESENTATION_V2.to_string());
    }

    debug!(?disabled, "disabled tools from agent config");
    disabled
}

/// Decides which tools a run gets and registers them in a fixed order.
pub struct ToolManager {
    catalog: Arc<dyn ToolCatalog>,
    project_id: String,
    thread_id: String,
    /// Whether a data-provider API key is available
    data_provider_key: bool,
}

impl ToolManager {
    pub fn new(
        catalog: Arc<dyn ToolCatalog>,
        project_id: impl Into<String>,
        thread_id: impl Into<String>,
        data_provider_key: bool,
    ) -> Self {
        Self {
            catalog,
            project_id: project_id.into(),
            thread_id: thread_id.into(),
            data_provider_key,
        }
    }

    fn context(&self, agent_id: Option<&str>) -> ToolContext {
        ToolContext {
            project_id: self.project_id.clone(),
            thread_id: self.thread_id.clone(),
            agent_id: agent_id.map(str::to_string),
        }
    }

    /// Instantiate `name` from the catalogue and register it; returns whether
    /// anything was registered.
    fn add(&self, builder: &mut ToolRegistryBuilder, name: &str, ctx: &ToolContext) -> bool {
        match self.catalog.instantiate(name, ctx) {
            Some(tool) => {
                builder.register(tool);
                debug!(tool = name, "registered tool");
                true
            }
            None => {
                debug!(tool = name, "tool not provided by catalog, skipping");
                false
            }
        }
    }

    /// Register the run's tool set: core tools, then the sandbox family,
    /// the data-provider tool, agent-builder tools (only with an agent id)
    /// and finally the browser tool.  Names in `disabled` are skipped.
    pub fn register_all_tools(
        &self,
        builder: &mut ToolRegistryBuilder,
        agent_id: Option<&str>,
        disabled: &[String],
    ) {
        debug!(?disabled, "registering tools");
        let is_disabled = |name: &str| disabled.iter().any(|d| d == name);
        let ctx = self.context(None);

        // Core tools are always on; the message tool is built in.
        for name in names::CORE {
            if name == names::MESSAGE {
                builder.register(Arc::new(MessageTool));
                debug!(tool = name, "registered tool");
            } else {
                self.add(builder, name, &ctx);
            }
        }

        for name in names::SANDBOX {
            if is_disabled(name) {
                debug!(tool = name, "tool disabled by agent config");
                continue;
            }
            self.add(builder, name, &ctx);
        }

        if !self.data_provider_key {
            debug!(tool = names::DATA_PROVIDERS, "no data provider key, skipping");
        } else if !is_disabled(names::DATA_PROVIDERS) {
            self.add(builder, names::DATA_PROVIDERS, &ctx);
        }

        if let Some(agent_id) = agent_id {
            let builder_ctx = self.context(Some(agent_id));
            for name in names::AGENT_BUILDER {
                if !is_disabled(name) {
                    self.add(builder, name, &builder_ctx);
                }
            }
        }

        if !is_disabled(names::BROWSER) {
            self.add(builder, names::BROWSER, &ctx);
        }

        debug!(tools = ?builder.tool_names(), "tool registration complete");
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

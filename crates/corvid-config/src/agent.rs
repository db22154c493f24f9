// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Agent definitions as stored by the agent catalogue.
//!
//! An agent definition is read-only input to a run.  It selects the system
//! prompt, the default model, which built-in tools are switched off, and the
//! external MCP tool servers to splice into the tool registry.
//!
//! ```json
//! {
//!   "agent_id": "a-42",
//!   "system_prompt": "You are a release manager.",
//!   "agentpress_tools": { "sb_shell_tool": { "enabled": false }, "browser_tool": true },
//!   "configured_mcps": [ { "name": "Exa", "qualifiedName": "exa", "config": {} } ],
//!   "custom_mcps": [ { "name": "Linear", "customType": "composio", "config": {} } ],
//!   "is_suna_default": false
//! }
//! ```
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentDefinition {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Replaces the default system prompt when present and non-blank
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Model preferred by this agent; used only when the caller did not
    /// pick one explicitly
    #[serde(default)]
    pub model: Option<String>,
    /// Raw tool enablement map: tool name → `bool` or `{ "enabled": bool }`.
    ///
    /// Kept as a raw value because stored definitions are not always
    /// well-formed; interpretation lives in the tool manager.
    #[serde(default, rename = "agentpress_tools", alias = "tools")]
    pub tool_config: Option<Value>,
    /// Tool servers already in normalized form
    #[serde(default)]
    pub configured_mcps: Vec<McpServerDescriptor>,
    /// User-defined tool servers, normalized at run setup
    #[serde(default)]
    pub custom_mcps: Vec<CustomMcp>,
    /// Marks the stock default agent
    #[serde(default, rename = "is_suna_default")]
    pub is_default_agent: bool,
}

impl AgentDefinition {
    /// `true` when the definition declares at least one MCP tool server.
    pub fn has_mcp_servers(&self) -> bool {
        !self.configured_mcps.is_empty() || !self.custom_mcps.is_empty()
    }
}

/// Normalized MCP tool-server descriptor.
///
/// `qualified_name` is the stable key of a server; it is unique across the
/// merged list a run works with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerDescriptor {
    pub name: String,
    pub qualified_name: String,
    #[serde(default = "empty_object")]
    pub config: Value,
    /// Tool names to expose; empty means every tool the server offers
    #[serde(default)]
    pub enabled_tools: Vec<String>,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub is_custom: bool,
    #[serde(default)]
    pub custom_type: Option<String>,
}

/// Pipedream-hosted server.  The config blob must end up carrying an
/// `external_user_id`; when it does not, setup resolves one from the
/// stored credential profile named by `profile_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct PipedreamMcp {
    pub name: String,
    pub config: Map<String, Value>,
    pub enabled_tools: Vec<String>,
    pub instructions: String,
}

impl PipedreamMcp {
    pub fn profile_id(&self) -> Option<&str> {
        self.config.get("profile_id").and_then(Value::as_str)
    }

    pub fn external_user_id(&self) -> Option<&str> {
        self.config
            .get("external_user_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// App slug carried in the `x-pd-app-slug` request header, if any.
    pub fn header_app_slug(&self) -> Option<&Value> {
        self.config
            .get("headers")
            .and_then(Value::as_object)
            .and_then(|h| h.get("x-pd-app-slug"))
    }
}

/// Composio-hosted server.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposioMcp {
    pub name: String,
    pub qualified_name: Option<String>,
    pub config: Value,
    pub enabled_tools: Vec<String>,
    pub instructions: String,
}

/// Any directly reachable server (`sse` unless the definition says otherwise).
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteMcp {
    pub transport: String,
    pub name: String,
    pub config: Value,
    pub enabled_tools: Vec<String>,
    pub instructions: String,
}

/// A user-defined tool server, discriminated by its `customType`
/// (falling back to `type`, then `sse`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCustomMcp", into = "RawCustomMcp")]
pub enum CustomMcp {
    Pipedream(PipedreamMcp),
    Composio(ComposioMcp),
    Remote(RemoteMcp),
}

impl CustomMcp {
    pub fn name(&self) -> &str {
        match self {
            CustomMcp::Pipedream(p) => &p.name,
            CustomMcp::Composio(c) => &c.name,
            CustomMcp::Remote(r) => &r.name,
        }
    }

    pub fn type_tag(&self) -> &str {
        match self {
            CustomMcp::Pipedream(_) => "pipedream",
            CustomMcp::Composio(_) => "composio",
            CustomMcp::Remote(r) => &r.transport,
        }
    }
}

/// Wire shape of a custom MCP entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCustomMcp {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom_type: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    qualified_name: Option<String>,
    #[serde(default)]
    config: Value,
    #[serde(default)]
    enabled_tools: Vec<String>,
    #[serde(default)]
    instructions: String,
}

impl From<RawCustomMcp> for CustomMcp {
    fn from(raw: RawCustomMcp) -> Self {
        let tag = raw
            .custom_type
            .or(raw.kind)
            .unwrap_or_else(|| "sse".to_string());
        let config = if raw.config.is_null() { empty_object() } else { raw.config };
        match tag.as_str() {
            "pipedream" => CustomMcp::Pipedream(PipedreamMcp {
                name: raw.name,
                config: match config {
                    Value::Object(m) => m,
                    _ => Map::new(),
                },
                enabled_tools: raw.enabled_tools,
                instructions: raw.instructions,
            }),
            "composio" => CustomMcp::Composio(ComposioMcp {
                name: raw.name,
                qualified_name: raw.qualified_name.filter(|q| !q.is_empty()),
                config,
                enabled_tools: raw.enabled_tools,
                instructions: raw.instructions,
            }),
            _ => CustomMcp::Remote(RemoteMcp {
                transport: tag,
                name: raw.name,
                config,
                enabled_tools: raw.enabled_tools,
                instructions: raw.instructions,
            }),
        }
    }
}

impl From<CustomMcp> for RawCustomMcp {
    fn from(mcp: CustomMcp) -> Self {
        match mcp {
            CustomMcp::Pipedream(p) => RawCustomMcp {
                name: p.name,
                custom_type: Some("pipedream".into()),
                kind: None,
                qualified_name: None,
                config: Value::Object(p.config),
                enabled_tools: p.enabled_tools,
                instructions: p.instructions,
            },
            CustomMcp::Composio(c) => RawCustomMcp {
                name: c.name,
                custom_type: Some("composio".into()),
                kind: None,
                qualified_name: c.qualified_name,
                config: c.config,
                enabled_tools: c.enabled_tools,
                instructions: c.instructions,
            },
            CustomMcp::Remote(r) => RawCustomMcp {
                name: r.name,
                custom_type: Some(r.transport),
                kind: None,
                qualified_name: None,
                config: r.config,
                enabled_tools: r.enabled_tools,
                instructions: r.instructions,
            },
        }
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use corvid_config::McpServerDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

fn empty_schema() -> Value {
    Value::Object(Map::new())
}

/// One tool as advertised by an MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_schema", rename = "inputSchema", alias = "input_schema")]
    pub input_schema: Value,
}

/// Network side of MCP: listing a server's tools and calling one.
#[async_trait]
pub trait McpDiscovery: Send + Sync {
    async fn list_tools(&self, server: &McpServerDescriptor) -> anyhow::Result<Vec<McpToolInfo>>;

    async fn call_tool(
        &self,
        server: &McpServerDescriptor,
        tool: &str,
        args: Value,
    ) -> anyhow::Result<String>;
}

/// Stored credential profiles (Pipedream connections).
#[async_trait]
pub trait CredentialProfiles: Send + Sync {
    /// `external_user_id` of the profile, `None` when the profile is unknown.
    async fn external_user_id(&self, account_id: Uuid, profile_id: Uuid)
        -> anyhow::Result<Option<String>>;
}

/// Discovery backend with a fixed tool list per qualified server name.
///
/// Used by scenario replays and tests.  Calls return the canned response
/// registered under `"<qualified_name>/<tool>"`, or echo the arguments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticDiscovery {
    #[serde(default)]
    pub servers: HashMap<String, Vec<McpToolInfo>>,
    /// Qualified names whose discovery fails
    #[serde(default)]
    pub unreachable: HashSet<String>,
    #[serde(default)]
    pub responses: HashMap<String, String>,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(mut self, qualified_name: impl Into<String>, tools: Vec<McpToolInfo>) -> Self {
        self.servers.insert(qualified_name.into(), tools);
        self
    }

    pub fn with_unreachable(mut self, qualified_name: impl Into<String>) -> Self {
        self.unreachable.insert(qualified_name.into());
        self
    }

    pub fn with_response(
        mut self,
        qualified_name: &str,
        tool: &str,
        response: impl Into<String>,
    ) -> Self {
        self.responses.insert(format!("{qualified_name}/{tool}"), response.into());
        self
    }
}

#[async_trait]
impl McpDiscovery for StaticDiscovery {
    async fn list_tools(&self, server: &McpServerDescriptor) -> anyhow::Result<Vec<McpToolInfo>> {
        if self.unreachable.contains(&server.qualified_name) {
            anyhow::bail!("MCP server {} is unreachable", server.qualified_name);
        }
        Ok(self.servers.get(&server.qualified_name).cloned().unwrap_or_default())
    }

    async fn call_tool(
        &self,
        server: &McpServerDescriptor,
        tool: &str,
        args: Value,
    ) -> anyhow::Result<String> {
        if self.unreachable.contains(&server.qualified_name) {
            anyhow::bail!("MCP server {} is unreachable", server.qualified_name);
        }
        match self.responses.get(&format!("{}/{tool}", server.qualified_name)) {
            Some(r) => Ok(r.clone()),
            None => Ok(serde_json::to_string(&args)?),
        }
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use corvid_config::McpServerDescriptor;
use corvid_tools::{Tool, ToolCall, ToolOutput, ToolSchema};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::{slugify, McpDiscovery, McpSchemaCache, McpToolInfo};

pub const MCP_WRAPPER_NAME: &str = "mcp_tool_wrapper";

/// A discovered MCP tool exposed as a registry method.
#[derive(Debug, Clone)]
struct McpMethod {
    server: usize,
    tool: String,
    schema: ToolSchema,
}

/// Single tool instance that fronts every MCP server of a run.
///
/// Discovery happens once in [`initialize_and_register_tools`]; afterwards
/// the wrapper serves each discovered tool as an OpenAPI-shaped method named
/// `mcp_<server>_<tool>` and routes calls back to the owning server.
///
/// [`initialize_and_register_tools`]: Self::initialize_and_register_tools
pub struct McpToolWrapper {
    servers: Vec<McpServerDescriptor>,
    discovery: Arc<dyn McpDiscovery>,
    cache: Option<Arc<McpSchemaCache>>,
    methods: OnceCell<BTreeMap<String, McpMethod>>,
}

impl McpToolWrapper {
    pub fn new(
        servers: Vec<McpServerDescriptor>,
        discovery: Arc<dyn McpDiscovery>,
        cache: Option<Arc<McpSchemaCache>>,
    ) -> Self {
        Self { servers, discovery, cache, methods: OnceCell::new() }
    }

    pub fn servers(&self) -> &[McpServerDescriptor] {
        &self.servers
    }

    pub fn is_initialized(&self) -> bool {
        self.methods.initialized()
    }

    /// Discover the tools of every server.  A server that cannot be reached
    /// is logged and left out; initialization fails only when no server
    /// answers at all.  Calling this again after success is a no-op.
    pub async fn initialize_and_register_tools(&self) -> anyhow::Result<()> {
        self.methods
            .get_or_try_init(|| self.discover())
            .await
            .map(|methods| info!(methods = methods.len(), "MCP tools initialized"))
    }

    async fn tools_for(&self, server: &McpServerDescriptor) -> anyhow::Result<Vec<McpToolInfo>> {
        if let Some(cache) = &self.cache {
            if let Some(tools) = cache.get(&server.qualified_name).await {
                debug!(server = %server.qualified_name, "MCP tool list served from cache");
                return Ok(tools);
            }
        }
        let tools = self.discovery.list_tools(server).await?;
        if let Some(cache) = &self.cache {
            cache.put(&server.qualified_name, tools.clone()).await;
        }
        Ok(tools)
    }

    async fn discover(&self) -> anyhow::Result<BTreeMap<String, McpMethod>> {
        let mut methods = BTreeMap::new();
        let mut reachable = 0usize;

        for (idx, server) in self.servers.iter().enumerate() {
            let tools = match self.tools_for(server).await {
                Ok(tools) => tools,
                Err(e) => {
                    error!(server = %server.qualified_name, error = %e, "MCP discovery failed");
                    continue;
                }
            };
            reachable += 1;

            let server_slug = slugify(&server.name);
            for t in tools {
                if !server.enabled_tools.is_empty() && !server.enabled_tools.contains(&t.name) {
                    continue;
                }
                let mut method = format!("mcp_{server_slug}_{}", t.name);
                if methods.contains_key(&method) {
                    // Display names may repeat; qualified names do not.
                    method = format!("mcp_{}_{}", slugify(&server.qualified_name), t.name);
                }
                if methods.contains_key(&method) {
                    warn!(server = %server.qualified_name, method = %method, "duplicate MCP method skipped");
                    continue;
                }
                let description = if t.description.is_empty() {
                    format!("(MCP Server: {})", server.name)
                } else {
                    format!("{} (MCP Server: {})", t.description, server.name)
                };
                let schema = ToolSchema::openapi(method.clone(), description, t.input_schema);
                methods.insert(method, McpMethod { server: idx, tool: t.name, schema });
            }
        }

        if reachable == 0 && !self.servers.is_empty() {
            anyhow::bail!("none of the {} MCP servers could be reached", self.servers.len());
        }
        Ok(methods)
    }

    /// Method name → schema for every discovered tool; empty before
    /// initialization.
    pub fn schema_map(&self) -> BTreeMap<String, ToolSchema> {
        self.methods
            .get()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.schema.clone())).collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for McpToolWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpToolWrapper")
            .field("servers", &self.servers.len())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[async_trait]
impl Tool for McpToolWrapper {
    fn name(&self) -> &str {
        MCP_WRAPPER_NAME
    }

    fn schemas(&self) -> Vec<ToolSchema> {
        self.schema_map().into_values().collect()
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(method) = self.methods.get().and_then(|m| m.get(&call.name)) else {
            return ToolOutput::err(&call.id, format!("unknown MCP tool: {}", call.name));
        };
        let server = &self.servers[method.server];
        match self.discovery.call_tool(server, &method.tool, call.args.clone()).await {
            Ok(out) => ToolOutput::ok(&call.id, out),
            Err(e) => ToolOutput::err(
                &call.id,
                format!("MCP tool {} on {} failed: {e}", method.tool, server.name),
            ),
        }
    }
}

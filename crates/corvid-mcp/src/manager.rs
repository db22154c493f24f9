// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use corvid_config::AgentDefinition;
use corvid_tools::{Tool, ToolRegistryBuilder};
use tracing::{debug, error, info};

use crate::{normalize_servers, CredentialProfiles, McpDiscovery, McpSchemaCache, McpToolWrapper};

/// Builds the run's MCP wrapper from an agent definition and splices the
/// discovered methods into the tool registry.
pub struct McpManager {
    account_id: String,
    discovery: Arc<dyn McpDiscovery>,
    profiles: Option<Arc<dyn CredentialProfiles>>,
    cache: Option<Arc<McpSchemaCache>>,
}

impl McpManager {
    pub fn new(account_id: impl Into<String>, discovery: Arc<dyn McpDiscovery>) -> Self {
        Self { account_id: account_id.into(), discovery, profiles: None, cache: None }
    }

    pub fn with_profiles(mut self, profiles: Arc<dyn CredentialProfiles>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn with_cache(mut self, cache: Arc<McpSchemaCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Returns `None` when the agent declares no servers or when
    /// initialization fails; the run then proceeds without MCP tools.
    pub async fn register_mcp_tools(
        &self,
        agent: &AgentDefinition,
        builder: &mut ToolRegistryBuilder,
    ) -> Option<Arc<McpToolWrapper>> {
        let servers = normalize_servers(agent, &self.account_id, self.profiles.as_deref()).await;
        if servers.is_empty() {
            debug!("agent declares no MCP servers");
            return None;
        }

        let wrapper = Arc::new(McpToolWrapper::new(
            servers,
            Arc::clone(&self.discovery),
            self.cache.clone(),
        ));
        if let Err(e) = wrapper.initialize_and_register_tools().await {
            error!(error = %e, "failed to initialize MCP tools, continuing without them");
            return None;
        }

        let instance: Arc<dyn Tool> = wrapper.clone();
        for (method, schema) in wrapper.schema_map() {
            debug!(method = %method, "registered dynamic MCP tool");
            builder.insert(method, Arc::clone(&instance), schema);
        }
        info!(servers = wrapper.servers().len(), "MCP tools registered");
        Some(wrapper)
    }
}

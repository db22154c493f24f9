// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashSet;

use corvid_config::{AgentDefinition, CustomMcp, McpServerDescriptor, PipedreamMcp};
use serde_json::Value;
use tracing::{error, warn};
use uuid::Uuid;

use crate::CredentialProfiles;

/// Lowercase `name` and replace spaces with underscores.
pub fn slugify(name: &str) -> String {
    name.replace(' ', "_").to_lowercase()
}

/// Stable key of a custom server.
///
/// Composio servers keep an explicit qualified name when they carry one and
/// otherwise become `composio.<slug>`; everything else is
/// `custom_<type>_<slug>`.
pub fn qualified_name_for(mcp: &CustomMcp) -> String {
    match mcp {
        CustomMcp::Composio(c) => c
            .qualified_name
            .clone()
            .unwrap_or_else(|| format!("composio.{}", slugify(&c.name))),
        other => format!("custom_{}_{}", other.type_tag(), slugify(other.name())),
    }
}

/// Fill in the Pipedream config: resolve `external_user_id` from the stored
/// credential profile when missing and surface the header app slug.
async fn prepare_pipedream(
    mut pd: PipedreamMcp,
    account_id: &str,
    profiles: Option<&dyn CredentialProfiles>,
) -> PipedreamMcp {
    if pd.external_user_id().is_none() {
        if let (Some(profile_id), Some(profiles)) = (pd.profile_id().map(str::to_string), profiles) {
            match lookup_external_user_id(profiles, account_id, &profile_id).await {
                Ok(Some(ext)) => {
                    pd.config.insert("external_user_id".into(), Value::String(ext));
                }
                Ok(None) => warn!(profile_id = %profile_id, "credential profile not found"),
                Err(e) => error!(
                    profile_id = %profile_id,
                    error = %e,
                    "error retrieving external_user_id from profile"
                ),
            }
        }
    }
    if let Some(slug) = pd.header_app_slug().cloned() {
        pd.config.insert("app_slug".into(), slug);
    }
    pd
}

async fn lookup_external_user_id(
    profiles: &dyn CredentialProfiles,
    account_id: &str,
    profile_id: &str,
) -> anyhow::Result<Option<String>> {
    let account = Uuid::parse_str(account_id)?;
    let profile = Uuid::parse_str(profile_id)?;
    profiles.external_user_id(account, profile).await
}

fn descriptor(mcp: CustomMcp) -> McpServerDescriptor {
    let qualified_name = qualified_name_for(&mcp);
    let custom_type = mcp.type_tag().to_string();
    let (name, config, enabled_tools, instructions) = match mcp {
        CustomMcp::Pipedream(p) => (p.name, Value::Object(p.config), p.enabled_tools, p.instructions),
        CustomMcp::Composio(c) => (c.name, c.config, c.enabled_tools, c.instructions),
        CustomMcp::Remote(r) => (r.name, r.config, r.enabled_tools, r.instructions),
    };
    McpServerDescriptor {
        name,
        qualified_name,
        config,
        enabled_tools,
        instructions,
        is_custom: true,
        custom_type: Some(custom_type),
    }
}

/// Merge the agent's configured and custom servers into one normalized
/// list.  Qualified names are unique in the result; a later entry that
/// repeats one is dropped.
pub async fn normalize_servers(
    agent: &AgentDefinition,
    account_id: &str,
    profiles: Option<&dyn CredentialProfiles>,
) -> Vec<McpServerDescriptor> {
    let mut all: Vec<McpServerDescriptor> = agent.configured_mcps.clone();

    for custom in agent.custom_mcps.iter().cloned() {
        let custom = match custom {
            CustomMcp::Pipedream(pd) => {
                CustomMcp::Pipedream(prepare_pipedream(pd, account_id, profiles).await)
            }
            other => other,
        };
        all.push(descriptor(custom));
    }

    let mut seen = HashSet::new();
    all.retain(|d| {
        let fresh = seen.insert(d.qualified_name.clone());
        if !fresh {
            warn!(qualified_name = %d.qualified_name, "duplicate MCP server, keeping the first");
        }
        fresh
    });
    all
}

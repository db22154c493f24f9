// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Scripted run environments loaded from YAML.
//!
//! A scenario stands in for every backend of a run: the account and project
//! directory, billing answers, the seeded thread, the knowledge base, MCP
//! servers and one engine script per iteration.
//!
//! ```yaml
//! account_id: acc-1
//! projects:
//!   - project_id: proj-1
//! messages:
//!   - type: user
//!     content: { role: user, content: "hello" }
//! engine:
//!   - chunks:
//!       - type: assistant
//!         content: '{"content": "Hi there</complete>"}'
//! ```
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use corvid_mcp::StaticDiscovery;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::{EngineScript, ScriptedThreadEngine};
use crate::runner::RunServices;
use crate::services::{BillingStatus, Project, StaticBilling, StaticKnowledgeBase, StaticProjects};
use crate::store::InMemoryMessageStore;

/// A message written to the thread before the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub content: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    /// Account owning the run's thread; unset makes setup fail
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub projects: Vec<Project>,
    /// One answer per iteration, the last repeating; empty allows every run
    #[serde(default)]
    pub billing: Vec<BillingStatus>,
    #[serde(default)]
    pub messages: Vec<SeedMessage>,
    /// Agent id → knowledge base text
    #[serde(default)]
    pub knowledge_base: StaticKnowledgeBase,
    #[serde(default)]
    pub mcp: StaticDiscovery,
    #[serde(default)]
    pub data_provider_key: bool,
    /// One script per engine call
    #[serde(default)]
    pub engine: Vec<EngineScript>,
    /// Serve the last engine script for every further call
    #[serde(default)]
    pub repeat_last: bool,
    /// Write each call's assistant text back to the thread, as a real
    /// engine does
    #[serde(default)]
    pub persist_assistant: bool,
}

/// Backends built from a scenario, with handles for inspection.
pub struct ScenarioRun {
    pub services: RunServices,
    pub store: Arc<InMemoryMessageStore>,
    pub engine: Arc<ScriptedThreadEngine>,
    pub billing: Arc<StaticBilling>,
}

impl Scenario {
    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(text).context("parsing scenario")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Build the backends for a run on `thread_id`, seeding its messages.
    pub async fn build(self, thread_id: &str) -> ScenarioRun {
        let store = Arc::new(InMemoryMessageStore::new());
        for m in self.messages {
            store.insert(thread_id, &m.message_type, m.content).await;
        }

        let mut engine = ScriptedThreadEngine::new(self.engine);
        if self.repeat_last {
            engine = engine.repeating();
        }
        if self.persist_assistant {
            engine = engine.persisting_to(Arc::clone(&store));
        }
        let engine = Arc::new(engine);

        let mut projects = StaticProjects::new();
        if let Some(account_id) = self.account_id {
            projects = projects.with_thread(thread_id, account_id);
        }
        for p in self.projects {
            projects = projects.with_project(p);
        }

        let billing = Arc::new(StaticBilling::new(self.billing));
        let services = RunServices::new(engine.clone(), store.clone(), billing.clone(), Arc::new(projects))
            .with_knowledge(Arc::new(self.knowledge_base))
            .with_mcp_discovery(Arc::new(self.mcp))
            .with_data_provider_key(self.data_provider_key);

        ScenarioRun { services, store, engine, billing }
    }
}

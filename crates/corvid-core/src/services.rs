// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Backend services the runner consumes, and fixed in-process versions of
//! them for scenario replays and tests.
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Answer of a billing check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingStatus {
    pub can_run: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub subscription: Option<Value>,
}

impl BillingStatus {
    pub fn allowed() -> Self {
        Self { can_run: true, message: "OK".into(), subscription: None }
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self { can_run: false, message: message.into(), subscription: None }
    }
}

#[async_trait]
pub trait BillingService: Send + Sync {
    async fn check_billing_status(&self, account_id: &str) -> anyhow::Result<BillingStatus>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    #[serde(default)]
    pub sandbox: Value,
}

impl Project {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self { project_id: project_id.into(), sandbox: Value::Null }
    }

    pub fn sandbox_id(&self) -> Option<&str> {
        self.sandbox.get("id").and_then(Value::as_str).filter(|s| !s.is_empty())
    }
}

/// Account and project lookup.
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    async fn account_id_for_thread(&self, thread_id: &str) -> anyhow::Result<Option<String>>;
    async fn project(&self, project_id: &str) -> anyhow::Result<Option<Project>>;
}

/// Agent-scoped knowledge base.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn agent_context(&self, agent_id: &str) -> anyhow::Result<Option<String>>;
}

/// Billing service with scripted answers.  Answers are consumed one per
/// check; the last one repeats.  With no answers every check passes.
#[derive(Debug, Default)]
pub struct StaticBilling {
    answers: Mutex<VecDeque<BillingStatus>>,
    checks: AtomicUsize,
}

impl StaticBilling {
    pub fn new(answers: Vec<BillingStatus>) -> Self {
        Self { answers: Mutex::new(answers.into()), checks: AtomicUsize::new(0) }
    }

    pub fn allow() -> Self {
        Self::default()
    }

    pub fn deny(message: impl Into<String>) -> Self {
        Self::new(vec![BillingStatus::denied(message)])
    }

    /// Number of checks performed so far.
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BillingService for StaticBilling {
    async fn check_billing_status(&self, _account_id: &str) -> anyhow::Result<BillingStatus> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        let mut answers = self
            .answers
            .lock()
            .map_err(|_| anyhow::anyhow!("billing answers lock poisoned"))?;
        let answer = if answers.len() > 1 { answers.pop_front() } else { answers.front().cloned() };
        Ok(answer.unwrap_or_else(BillingStatus::allowed))
    }
}

/// Fixed thread → account and project tables.
#[derive(Debug, Clone, Default)]
pub struct StaticProjects {
    accounts: HashMap<String, String>,
    projects: HashMap<String, Project>,
}

impl StaticProjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thread(mut self, thread_id: impl Into<String>, account_id: impl Into<String>) -> Self {
        self.accounts.insert(thread_id.into(), account_id.into());
        self
    }

    pub fn with_project(mut self, project: Project) -> Self {
        self.projects.insert(project.project_id.clone(), project);
        self
    }
}

#[async_trait]
impl ProjectDirectory for StaticProjects {
    async fn account_id_for_thread(&self, thread_id: &str) -> anyhow::Result<Option<String>> {
        Ok(self.accounts.get(thread_id).cloned())
    }

    async fn project(&self, project_id: &str) -> anyhow::Result<Option<Project>> {
        Ok(self.projects.get(project_id).cloned())
    }
}

/// Knowledge base backed by a map of agent id → context text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticKnowledgeBase {
    entries: HashMap<String, String>,
}

impl StaticKnowledgeBase {
    pub fn with_entry(mut self, agent_id: impl Into<String>, context: impl Into<String>) -> Self {
        self.entries.insert(agent_id.into(), context.into());
        self
    }
}

#[async_trait]
impl KnowledgeBase for StaticKnowledgeBase {
    async fn agent_context(&self, agent_id: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.get(agent_id).cloned())
    }
}

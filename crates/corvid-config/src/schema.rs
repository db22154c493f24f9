// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

/// Model used when neither the caller nor the agent definition picks one.
pub const DEFAULT_MODEL: &str = "openai/gpt-5-mini";

/// Environment variable consulted for the data-provider API key when no
/// explicit key or override variable is configured.
pub const DEFAULT_RAPID_API_KEY_ENV: &str = "RAPID_API_KEY";

/// Serde default helper, returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `false`, so fields
/// that are on unless switched off need a named function.
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub run: RunDefaults,
    #[serde(default)]
    pub providers: ProviderKeys,
    #[serde(default)]
    pub mcp: McpConfig,
}

/// Reasoning budget forwarded to providers that support extended thinking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    #[default]
    Low,
    Medium,
    High,
}

impl std::fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReasoningEffort::Low => write!(f, "low"),
            ReasoningEffort::Medium => write!(f, "medium"),
            ReasoningEffort::High => write!(f, "high"),
        }
    }
}

fn default_model_name() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_max_iterations() -> u32 {
    100
}
fn default_native_max_auto_continues() -> u32 {
    25
}

/// Defaults applied to every run unless the caller overrides them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDefaults {
    /// Model identifier forwarded to the thread engine
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// Upper bound on loop iterations (thread-engine calls) per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Budget of automatic continuations the thread engine may perform
    /// inside a single iteration
    #[serde(default = "default_native_max_auto_continues")]
    pub native_max_auto_continues: u32,
    #[serde(default)]
    pub enable_thinking: bool,
    #[serde(default)]
    pub reasoning_effort: ReasoningEffort,
    /// Let the thread engine summarise long histories before the LLM call
    #[serde(default = "default_true")]
    pub enable_context_manager: bool,
    /// Stream chunks as they are produced rather than one final batch
    #[serde(default = "default_true")]
    pub stream: bool,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            max_iterations: default_max_iterations(),
            native_max_auto_continues: default_native_max_auto_continues(),
            enable_thinking: false,
            reasoning_effort: ReasoningEffort::Low,
            enable_context_manager: true,
            stream: true,
        }
    }
}

/// API keys for optional tool providers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderKeys {
    /// Explicit data-provider key; prefer `rapid_api_key_env` in files that
    /// end up under version control
    pub rapid_api_key: Option<String>,
    /// Environment variable holding the data-provider key
    pub rapid_api_key_env: Option<String>,
}

impl ProviderKeys {
    /// Resolve the data-provider key: explicit value, then the configured
    /// environment variable, then `RAPID_API_KEY`.  Empty values count as
    /// absent.
    pub fn rapid_api_key(&self) -> Option<String> {
        if let Some(k) = self.rapid_api_key.as_ref().filter(|k| !k.is_empty()) {
            return Some(k.clone());
        }
        let env = self
            .rapid_api_key_env
            .as_deref()
            .unwrap_or(DEFAULT_RAPID_API_KEY_ENV);
        std::env::var(env).ok().filter(|k| !k.is_empty())
    }
}

fn default_schema_cache_ttl_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    /// Seconds a discovered MCP tool list stays valid in the shared cache
    /// (0 disables caching)
    #[serde(default = "default_schema_cache_ttl_secs")]
    pub schema_cache_ttl_secs: u64,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            schema_cache_ttl_secs: default_schema_cache_ttl_secs(),
        }
    }
}

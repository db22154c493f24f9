// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use crate::Tool;

/// Stable tool names.  These are the keys used in agent tool-enablement maps
/// and the names the [`crate::ToolManager`] asks the catalogue for.
pub mod names {
    pub const EXPAND_MESSAGE: &str = "expand_msg_tool";
    pub const MESSAGE: &str = "message_tool";
    pub const TASK_LIST: &str = "task_list_tool";

    pub const SHELL: &str = "sb_shell_tool";
    pub const FILES: &str = "sb_files_tool";
    pub const DEPLOY: &str = "sb_deploy_tool";
    pub const EXPOSE: &str = "sb_expose_tool";
    pub const WEB_SEARCH: &str = "web_search_tool";
    pub const VISION: &str = "sb_vision_tool";
    pub const IMAGE_EDIT: &str = "sb_image_edit_tool";
    pub const SHEETS: &str = "sb_sheets_tool";
    pub const WEB_DEV: &str = "sb_web_dev_tool";

    /// Umbrella name; disabling it disables both concrete presentation tools.
    pub const PRESENTATION: &str = "sb_presentation_tool";
    pub const PRESENTATION_OUTLINE: &str = "sb_presentation_outline_tool";
    pub const PRESENTATION_V2: &str = "sb_presentation_tool_v2";

    pub const DATA_PROVIDERS: &str = "data_providers_tool";
    pub const BROWSER: &str = "browser_tool";

    pub const AGENT_CONFIG: &str = "agent_config_tool";
    pub const MCP_SEARCH: &str = "mcp_search_tool";
    pub const CREDENTIAL_PROFILE: &str = "credential_profile_tool";
    pub const WORKFLOW: &str = "workflow_tool";
    pub const TRIGGER: &str = "trigger_tool";

    /// Always registered, in this order.
    pub const CORE: [&str; 3] = [EXPAND_MESSAGE, MESSAGE, TASK_LIST];

    /// Sandbox family, in registration order.
    pub const SANDBOX: [&str; 11] = [
        SHELL,
        FILES,
        DEPLOY,
        EXPOSE,
        WEB_SEARCH,
        VISION,
        IMAGE_EDIT,
        PRESENTATION_OUTLINE,
        PRESENTATION_V2,
        SHEETS,
        WEB_DEV,
    ];

    /// Registered only when the run is bound to an agent id.
    pub const AGENT_BUILDER: [&str; 5] =
        [AGENT_CONFIG, MCP_SEARCH, CREDENTIAL_PROFILE, WORKFLOW, TRIGGER];

    /// Tools an agent definition may switch off.
    pub const KNOWN_TOOLS: [&str; 17] = [
        SHELL,
        FILES,
        DEPLOY,
        EXPOSE,
        WEB_SEARCH,
        VISION,
        PRESENTATION,
        IMAGE_EDIT,
        SHEETS,
        WEB_DEV,
        DATA_PROVIDERS,
        BROWSER,
        AGENT_CONFIG,
        MCP_SEARCH,
        CREDENTIAL_PROFILE,
        WORKFLOW,
        TRIGGER,
    ];
}

/// Identifiers a tool may bind to when it is instantiated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolContext {
    pub project_id: String,
    pub thread_id: String,
    /// Set only for agent-builder tools
    pub agent_id: Option<String>,
}

/// Source of concrete tool implementations.
///
/// The sandbox, browser and agent-builder tools live outside this crate;
/// the runtime asks the catalogue for each name it wants to register and
/// skips names the catalogue cannot provide.
pub trait ToolCatalog: Send + Sync {
    fn instantiate(&self, name: &str, ctx: &ToolContext) -> Option<Arc<dyn Tool>>;
}

/// Catalogue that provides nothing; only built-in tools get registered.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyCatalog;

impl ToolCatalog for EmptyCatalog {
    fn instantiate(&self, _name: &str, _ctx: &ToolContext) -> Option<Arc<dyn Tool>> {
        None
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod registry;
mod tool;
mod catalog;
mod manager;
mod builtin;

pub use registry::{RegistryEntry, ToolRegistry, ToolRegistryBuilder};
pub use tool::{SchemaType, Tool, ToolCall, ToolOutput, ToolSchema};
pub use catalog::{names, EmptyCatalog, ToolCatalog, ToolContext};
pub use manager::{disabled_tools_from_config, ToolManager};
pub use builtin::message::{MessageTool, TERMINAL_TOOL_NAMES};

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! External MCP tool servers.
//!
//! Agent definitions declare tool servers in two shapes: already-normalized
//! `configured_mcps` and heterogeneous `custom_mcps`.  This crate folds both
//! into one list of [`McpServerDescriptor`]s, discovers each server's tools
//! through an [`McpDiscovery`] backend and splices them into the run's tool
//! registry behind a single [`McpToolWrapper`].
//!
//! [`McpServerDescriptor`]: corvid_config::McpServerDescriptor

mod cache;
mod discovery;
mod manager;
mod normalize;
mod wrapper;

pub use cache::McpSchemaCache;
pub use discovery::{CredentialProfiles, McpDiscovery, McpToolInfo, StaticDiscovery};
pub use manager::McpManager;
pub use normalize::{normalize_servers, qualified_name_for, slugify};
pub use wrapper::{McpToolWrapper, MCP_WRAPPER_NAME};

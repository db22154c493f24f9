// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::{SchemaType, Tool, ToolCall, ToolOutput, ToolSchema};

/// One callable method: the instance that serves it plus its schema.
#[derive(Clone)]
pub struct RegistryEntry {
    pub instance: Arc<dyn Tool>,
    pub schema: ToolSchema,
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("instance", &self.instance.name())
            .field("schema", &self.schema.name)
            .finish()
    }
}

/// Mutable registry used during run setup.
///
/// Registration happens only here; [`build`](Self::build) freezes the
/// result into a [`ToolRegistry`] that the run loop shares read-only.
#[derive(Default)]
pub struct ToolRegistryBuilder {
    entries: HashMap<String, RegistryEntry>,
    /// Instances keyed by tool name, in registration order
    instances: Vec<(String, Arc<dyn Tool>)>,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every method of `tool`.  A tool registered under a name that
    /// is already present replaces the previous instance and its methods.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if let Some(pos) = self.instances.iter().position(|(n, _)| *n == name) {
            let (_, old) = self.instances.remove(pos);
            self.entries.retain(|_, e| !Arc::ptr_eq(&e.instance, &old));
            debug!(tool = %name, "replacing previously registered tool");
        }
        for schema in tool.schemas() {
            self.entries.insert(
                schema.name.clone(),
                RegistryEntry { instance: Arc::clone(&tool), schema },
            );
        }
        self.instances.push((name, tool));
    }

    /// Insert a single method entry, overwriting any entry with the same
    /// method name.  Used to splice dynamically discovered methods.
    pub fn insert(&mut self, method: impl Into<String>, instance: Arc<dyn Tool>, schema: ToolSchema) {
        self.entries.insert(method.into(), RegistryEntry { instance, schema });
    }

    pub fn contains_tool(&self, name: &str) -> bool {
        self.instances.iter().any(|(n, _)| n == name)
    }

    pub fn contains_method(&self, method: &str) -> bool {
        self.entries.contains_key(method)
    }

    /// Tool names in registration order.
    pub fn tool_names(&self) -> Vec<&str> {
        self.instances.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry { entries: self.entries }
    }
}

/// Immutable method-name → (instance, schema) map handed to the thread
/// engine for the lifetime of a run.
#[derive(Default)]
pub struct ToolRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl ToolRegistry {
    pub fn get(&self, method: &str) -> Option<&RegistryEntry> {
        self.entries.get(method)
    }

    /// Schemas of every method, sorted by name.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> =
            self.entries.values().map(|e| e.schema.clone()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Schemas of a given presentation type, sorted by name.
    pub fn schemas_of_type(&self, schema_type: SchemaType) -> Vec<ToolSchema> {
        self.schemas()
            .into_iter()
            .filter(|s| s.schema_type == schema_type)
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match self.entries.get(&call.name) {
            Some(entry) => entry.instance.execute(call).await,
            None => ToolOutput::err(&call.id, format!("unknown tool: {}", call.name)),
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("methods", &self.names()).finish()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

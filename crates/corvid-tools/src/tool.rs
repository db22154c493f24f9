// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier assigned by the caller (forwarded verbatim)
    pub id: String,
    /// Method name as registered in the [`crate::ToolRegistry`]
    pub name: String,
    /// Parsed JSON arguments
    pub args: Value,
}

/// The result of executing a tool.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    /// If true, the tool execution failed non-fatally (returned error message).
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), content: content.into(), is_error: false }
    }

    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), content: msg.into(), is_error: true }
    }
}

/// How a method is presented to the model.
///
/// `OpenApi` methods are function-calling schemas; `Xml` methods are invoked
/// through inline XML tags in the assistant text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaType {
    OpenApi,
    Xml,
}

/// Schema of one callable method.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema for the parameters object
    pub parameters: Value,
    pub schema_type: SchemaType,
}

impl ToolSchema {
    pub fn openapi(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            schema_type: SchemaType::OpenApi,
        }
    }

    pub fn xml(tag: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: tag.into(),
            description: description.into(),
            parameters,
            schema_type: SchemaType::Xml,
        }
    }

    /// Names of the top-level parameters declared under `properties`.
    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// OpenAI-style function envelope.
    pub fn to_openapi(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Trait every registered tool implements.
///
/// A tool exposes one or more methods; each method's schema becomes one
/// entry in the registry, all pointing back at the same instance.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn schemas(&self) -> Vec<ToolSchema>;
    /// Execute one method.  Errors should be wrapped in [`ToolOutput::err`].
    async fn execute(&self, call: &ToolCall) -> ToolOutput;
}

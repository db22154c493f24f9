// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{names, Tool, ToolCall, ToolOutput, ToolSchema};

/// Methods that end the agent's turn when the model invokes them.
pub const TERMINAL_TOOL_NAMES: [&str; 3] = ["ask", "complete", "web-browser-takeover"];

/// The user-communication tool.  Every method is XML-invoked and terminal:
/// the run loop stops once the model emits one of them.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageTool;

fn text_with_attachments(text_description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "text": { "type": "string", "description": text_description },
            "attachments": {
                "anyOf": [
                    { "type": "string" },
                    { "type": "array", "items": { "type": "string" } }
                ],
                "description": "File paths or URLs to attach"
            }
        },
        "required": ["text"]
    })
}

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str {
        names::MESSAGE
    }

    fn schemas(&self) -> Vec<ToolSchema> {
        vec![
            ToolSchema::xml(
                "ask",
                "Ask the user a question and wait for the reply.",
                text_with_attachments("Question or information for the user"),
            ),
            ToolSchema::xml(
                "complete",
                "Signal that every task is finished and the agent is idle.",
                json!({ "type": "object", "properties": {} }),
            ),
            ToolSchema::xml(
                "web-browser-takeover",
                "Hand the browser to the user for a step the agent cannot perform \
                 (captcha, login, payment).",
                text_with_attachments("Instructions for the user"),
            ),
        ]
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match call.name.as_str() {
            "ask" | "web-browser-takeover" => {
                let text = call.args.get("text").and_then(Value::as_str).unwrap_or_default();
                ToolOutput::ok(&call.id, format!("Awaiting user response: {text}"))
            }
            "complete" => ToolOutput::ok(&call.id, "Entering complete state"),
            other => ToolOutput::err(&call.id, format!("message_tool has no method {other}")),
        }
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Pure decisions the run loop makes about model output.
use crate::chunk::Chunk;

/// Model-invoked tools that end the agent's turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalTool {
    Ask,
    Complete,
    WebBrowserTakeover,
}

impl TerminalTool {
    /// Checked in this order when a fragment carries several markers.
    pub const PRIORITY: [TerminalTool; 3] =
        [TerminalTool::Ask, TerminalTool::Complete, TerminalTool::WebBrowserTakeover];

    pub fn name(self) -> &'static str {
        match self {
            TerminalTool::Ask => "ask",
            TerminalTool::Complete => "complete",
            TerminalTool::WebBrowserTakeover => "web-browser-takeover",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::PRIORITY.into_iter().find(|t| t.name() == name)
    }

    fn closing_tag(self) -> &'static str {
        match self {
            TerminalTool::Ask => "</ask>",
            TerminalTool::Complete => "</complete>",
            TerminalTool::WebBrowserTakeover => "</web-browser-takeover>",
        }
    }
}

impl std::fmt::Display for TerminalTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Scan assistant text for a terminal tool's closing tag.
///
/// Plain substring search: a marker quoted inside prose still counts.
pub fn detect_terminal_marker(text: &str) -> Option<TerminalTool> {
    TerminalTool::PRIORITY
        .into_iter()
        .find(|t| text.contains(t.closing_tag()))
}

/// Output-token cap for models whose provider default is too small or too
/// large.  Case-insensitive substring match; first rule wins.
pub fn max_tokens_for_model(model: &str) -> Option<u32> {
    const RULES: [(&str, u32); 4] = [
        ("sonnet", 8192),
        ("gpt-4", 4096),
        ("gemini-2.5-pro", 64000),
        ("kimi-k2", 8192),
    ];
    let model = model.to_lowercase();
    RULES
        .iter()
        .find(|(needle, _)| model.contains(needle))
        .map(|(_, tokens)| *tokens)
}

/// What a single chunk told the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    ErrorChunk(String),
    /// Status metadata asked for termination; carries the triggering tool
    TerminationRequested(Option<String>),
    /// Assistant text closed a terminal tool tag
    TerminalMarker(TerminalTool),
}

/// Per-iteration bookkeeping; a fresh value is used for every engine call.
#[derive(Debug, Default, Clone)]
pub struct IterationState {
    pub last_tool_call: Option<String>,
    pub agent_should_terminate: bool,
    pub error_detected: bool,
    /// Assistant text seen so far, for the generation span
    pub full_response: String,
}

impl IterationState {
    /// Update the state from one relayed chunk.
    pub fn observe(&mut self, chunk: &Chunk) -> Option<Signal> {
        match chunk {
            Chunk::Status(s) if s.is_error() => {
                self.error_detected = true;
                Some(Signal::ErrorChunk(
                    s.message.clone().unwrap_or_else(|| "Unknown error".to_string()),
                ))
            }
            Chunk::Status(s) if s.should_terminate() => {
                self.agent_should_terminate = true;
                let tool = s.triggering_tool();
                if tool.is_some() {
                    self.last_tool_call = tool.clone();
                }
                Some(Signal::TerminationRequested(tool))
            }
            Chunk::Assistant(a) => {
                let text = a.text()?;
                self.full_response.push_str(&text);
                let tool = detect_terminal_marker(&text)?;
                self.last_tool_call = Some(tool.name().to_string());
                Some(Signal::TerminalMarker(tool))
            }
            _ => None,
        }
    }

    /// The turn ended normally: termination was requested or the last tool
    /// call was a terminal tool.
    pub fn turn_finished(&self) -> bool {
        self.agent_should_terminate
            || self
                .last_tool_call
                .as_deref()
                .and_then(TerminalTool::from_name)
                .is_some()
    }
}

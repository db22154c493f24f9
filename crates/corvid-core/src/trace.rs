// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Optional observability handle for a run.
//!
//! A trace is injected per run; when absent nothing is recorded and control
//! flow is unchanged.  [`TracingRunTrace`] records into the process-wide
//! `tracing` subscriber.
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{error, info, info_span, warn, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceLevel {
    Default,
    Warning,
    Error,
}

/// One engine call within a run.
pub trait Generation: Send + Sync {
    /// Close the span with the assistant output and an optional status.
    fn end(&self, output: &str, status: Option<&str>, level: TraceLevel);
}

/// Run-level trace.
pub trait RunTrace: Send + Sync {
    fn update_input(&self, input: &Value);
    fn event(&self, name: &str, level: TraceLevel, message: &str);
    fn generation(&self, name: &str) -> Arc<dyn Generation>;
}

/// [`RunTrace`] that writes spans and events through `tracing`.
#[derive(Debug)]
pub struct TracingRunTrace {
    span: Span,
}

impl TracingRunTrace {
    pub fn new(thread_id: &str, project_id: &str) -> Self {
        Self { span: info_span!("run_agent", thread_id = %thread_id, project_id = %project_id) }
    }
}

impl RunTrace for TracingRunTrace {
    fn update_input(&self, input: &Value) {
        let _g = self.span.enter();
        info!(input = %input, "trace input");
    }

    fn event(&self, name: &str, level: TraceLevel, message: &str) {
        let _g = self.span.enter();
        match level {
            TraceLevel::Default => info!(event = name, "{message}"),
            TraceLevel::Warning => warn!(event = name, "{message}"),
            TraceLevel::Error => error!(event = name, "{message}"),
        }
    }

    fn generation(&self, name: &str) -> Arc<dyn Generation> {
        let span = info_span!(parent: &self.span, "generation", name = %name);
        Arc::new(TracingGeneration { span, started: Instant::now() })
    }
}

struct TracingGeneration {
    span: Span,
    started: Instant,
}

impl Generation for TracingGeneration {
    fn end(&self, output: &str, status: Option<&str>, level: TraceLevel) {
        let _g = self.span.enter();
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let status = status.unwrap_or("completed");
        match level {
            TraceLevel::Error => error!(status, elapsed_ms, output_len = output.len(), "generation ended"),
            _ => info!(status, elapsed_ms, output_len = output.len(), "generation ended"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn tracing_trace_is_usable_without_subscriber() {
        let trace = TracingRunTrace::new("t", "p");
        trace.update_input(&json!("hello"));
        trace.event("billing_limit_reached", TraceLevel::Error, "quota");
        let g = trace.generation("thread_manager.run_thread");
        g.end("out", Some("agent_stopped"), TraceLevel::Default);
    }
}

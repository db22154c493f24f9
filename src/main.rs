// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands, OutputFormatArg};
use corvid_config::Config;
use corvid_core::{run_agent, Chunk, RunRequest, RunTrace, Scenario, TracingRunTrace};
use corvid_mcp::McpSchemaCache;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match &cli.command {
        Commands::Completions { shell } => {
            cli::print_completions(*shell);
            Ok(())
        }
        Commands::ShowConfig => {
            let config = corvid_config::load(cli.config.as_deref())?;
            println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
            Ok(())
        }
        Commands::Run { request, scenario, model, max_iterations, output_format } => {
            let config = corvid_config::load(cli.config.as_deref())?;
            let mut request = load_request(request)?;
            if let Some(m) = model {
                request.model_name = Some(m.clone());
            }
            if let Some(n) = max_iterations {
                request.max_iterations = Some(*n);
            }
            let scenario = Scenario::load(scenario)?;
            run_scenario(&config, request, scenario, *output_format).await
        }
    }
}

fn load_request(path: &Path) -> anyhow::Result<RunRequest> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading run request {}", path.display()))?;
    // YAML is a superset of JSON, so both formats parse here.
    serde_yaml::from_str(&text).with_context(|| format!("parsing run request {}", path.display()))
}

async fn run_scenario(
    config: &Config,
    request: RunRequest,
    scenario: Scenario,
    format: OutputFormatArg,
) -> anyhow::Result<()> {
    let data_provider_key = scenario.data_provider_key || config.providers.rapid_api_key().is_some();
    let run = scenario.build(&request.thread_id).await;
    let mut services = run.services.with_data_provider_key(data_provider_key);
    if config.mcp.schema_cache_ttl_secs > 0 {
        services = services.with_mcp_cache(Arc::new(McpSchemaCache::from_secs(
            config.mcp.schema_cache_ttl_secs,
        )));
    }

    let trace: Arc<dyn RunTrace> = Arc::new(TracingRunTrace::new(&request.thread_id, &request.project_id));
    let mut chunks = run_agent(request, &config.run, services, Some(trace))
        .await
        .context("agent run setup failed")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut count = 0usize;
    while let Some(chunk) = chunks.next().await {
        write_chunk(&mut out, &chunk, format)?;
        count += 1;
    }
    out.flush()?;
    info!(chunks = count, engine_calls = run.engine.calls(), "run finished");
    Ok(())
}

fn write_chunk(out: &mut impl Write, chunk: &Chunk, format: OutputFormatArg) -> anyhow::Result<()> {
    let value = chunk.to_value();
    match format {
        OutputFormatArg::Jsonl => writeln!(out, "{}", serde_json::to_string(&value)?)?,
        OutputFormatArg::Pretty => writeln!(out, "{}\n", serde_json::to_string_pretty(&value)?)?,
    }
    Ok(())
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonl_output_is_one_line_per_chunk() {
        let mut buf = Vec::new();
        write_chunk(&mut buf, &Chunk::stopped("Billing limit reached: x"), OutputFormatArg::Jsonl).unwrap();
        write_chunk(&mut buf, &Chunk::assistant_text("hi"), OutputFormatArg::Jsonl).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["status"], "stopped");
    }

    #[test]
    fn request_loads_from_json_and_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("run.json");
        std::fs::write(&json_path, r#"{"thread_id": "t", "project_id": "p", "max_iterations": 2}"#).unwrap();
        let req = load_request(&json_path).unwrap();
        assert_eq!(req.max_iterations, Some(2));

        let yaml_path = dir.path().join("run.yaml");
        std::fs::write(&yaml_path, "thread_id: t\nproject_id: p\nis_agent_builder: true\n").unwrap();
        assert!(load_request(&yaml_path).unwrap().is_agent_builder);
    }
}

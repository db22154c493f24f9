// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use std::path::PathBuf;

/// How `corvid run` prints chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormatArg {
    /// One compact JSON object per line.
    #[default]
    Jsonl,
    /// Pretty-printed JSON objects separated by blank lines.
    Pretty,
}

#[derive(Parser, Debug)]
#[command(
    name = "corvid",
    about = "Autonomous agent runtime: drives an LLM thread engine until the turn completes",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file (overrides auto-discovery)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a scripted scenario through the agent run loop and print every
    /// chunk to stdout
    Run {
        /// Run request (thread, project, limits, agent definition), YAML or JSON
        #[arg(long, short = 'r')]
        request: PathBuf,
        /// Scenario providing the thread, backends and engine scripts
        #[arg(long, short = 's')]
        scenario: PathBuf,
        /// Model to use, overriding the request and config
        #[arg(long, short = 'M', env = "CORVID_MODEL")]
        model: Option<String>,
        /// Maximum loop iterations, overriding the request and config
        #[arg(long)]
        max_iterations: Option<u32>,
        #[arg(long, value_enum, default_value = "jsonl")]
        output_format: OutputFormatArg,
    },
    /// Print the effective configuration and exit
    ShowConfig,
    /// Generate shell completion script
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "corvid", &mut std::io::stdout());
}

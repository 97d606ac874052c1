//! Command-line arguments for `agentrt-run`.

use std::path::PathBuf;

use clap::Parser;

/// Runs one agent program and prints its `RunResult` as JSON.
#[derive(Debug, Parser)]
#[command(name = "agentrt-run", version, about = "Runs a structured agent program")]
pub struct RunArgs {
    /// Path to a JSON program file. Reads stdin when omitted.
    pub file: Option<PathBuf>,

    /// Starting fuel budget. Defaults to the process-wide config value.
    #[arg(long)]
    pub fuel: Option<f64>,

    /// Records and prints a step-by-step execution trace.
    #[arg(long)]
    pub trace: bool,

    /// Adds a domain to the `httpFetch` allowlist. Repeatable.
    #[arg(long = "fetch-domain")]
    pub fetch_domains: Vec<String>,

    /// Binds a top-level program argument as `key=value` (value parsed as
    /// JSON if possible, else kept as a string). Repeatable.
    #[arg(long = "arg", value_parser = parse_arg)]
    pub args: Vec<(String, String)>,

    /// Path to a `VmConfig` JSON file.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

fn parse_arg(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    Ok((key.to_string(), value.to_string()))
}

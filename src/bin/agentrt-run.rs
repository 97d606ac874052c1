//! Thin runnable harness for the engine. Reads a JSON
//! program from a file or stdin, runs it, prints the `RunResult`.

use clap::Parser;

use agentrt::cli::args::RunArgs;

#[tokio::main]
async fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = RunArgs::parse();
    agentrt::cli::run(args).await
}

//! Binary crate for the `weather-snapshot` job.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Logging setup
//! - Resolving configuration once at process entry
//! - Interactive configuration

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stderr keeps `show` output pipeable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cmd = cli::Cli::parse();
    cmd.run().await
}

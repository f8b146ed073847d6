//! fanout CLI: concurrent CSV enrichment.
//!
//! Partitions an input CSV across workers, enriches each record through an
//! HTTP service, and merges the per-worker results into combined success and
//! error files.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}

//! Binary crate for the `weather` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments and applying them over the stored configuration
//! - Logging setup
//! - One-shot lookups and the HTTP server with its metrics

use clap::Parser;

mod cli;
mod logging;
mod metrics;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();
    logging::init(cmd.options.log_format, cmd.options.debug);
    cmd.run().await
}

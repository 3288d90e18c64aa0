//! poolctl (rp) - operator CLI for the rulepool scheduler
//!
//! Lists the bus inventory, schedules rules and triggers collection of
//! drained buses through the scheduler's HTTP API.

use anyhow::Result;
use clap::Parser;

mod client;
mod commands;
mod error;
mod output;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}

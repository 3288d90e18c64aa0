//! CLI commands.

mod buses;
mod rules;
mod sweep;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::client::ApiClient;
use crate::output::OutputFormat;

/// rulepool CLI - inspect and operate a rule placement pool.
#[derive(Debug, Parser)]
#[command(name = "rp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Scheduler API base URL.
    #[arg(
        long,
        global = true,
        env = "RULEPOOL_API_URL",
        default_value = "http://127.0.0.1:8080"
    )]
    api_url: String,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Inspect the bus inventory.
    Buses(buses::BusesCommand),

    /// Schedule rules onto the pool.
    Rules(rules::RulesCommand),

    /// Collect buses that no longer hold any rules.
    Sweep,

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let ctx = CommandContext {
            api_url: self.api_url,
            format: self.format,
        };

        match self.command {
            Commands::Buses(cmd) => cmd.run(ctx).await,
            Commands::Rules(cmd) => cmd.run(ctx).await,
            Commands::Sweep => sweep::sweep(ctx).await,
            Commands::Version => {
                println!("rp {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub api_url: String,
    pub format: OutputFormat,
}

impl CommandContext {
    /// Get an API client for the configured scheduler.
    pub fn client(&self) -> Result<ApiClient> {
        ApiClient::new(&self.api_url)
    }
}

//! Collect drained buses.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::output::{print_info, print_single, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Serialize, Deserialize)]
struct SweepResponse {
    collected_buses: Vec<String>,
}

pub async fn sweep(ctx: CommandContext) -> Result<()> {
    let client = ctx.client()?;

    let response: SweepResponse = client.post_empty("/v1/sweep").await?;

    match ctx.format {
        OutputFormat::Json => print_single(&response),
        OutputFormat::Table if response.collected_buses.is_empty() => {
            print_info("No empty buses to collect.");
        }
        OutputFormat::Table => {
            print_success(&format!(
                "Collected {} bus(es): {}",
                response.collected_buses.len(),
                response.collected_buses.join(", ")
            ));
        }
    }
    Ok(())
}

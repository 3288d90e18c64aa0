//! Bus inventory commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::output::print_output;

use super::CommandContext;

/// Bus commands.
#[derive(Debug, Args)]
pub struct BusesCommand {
    #[command(subcommand)]
    command: BusesSubcommand,
}

#[derive(Debug, Subcommand)]
enum BusesSubcommand {
    /// List every bus in the pool with its rule count.
    List,
}

impl BusesCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            BusesSubcommand::List => list_buses(ctx).await,
        }
    }
}

/// Bus entry from the inventory response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct BusResponse {
    name: String,
    index: u32,
    rule_count: usize,
    #[serde(default)]
    rules: Vec<String>,
}

/// Inventory response from API.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct InventoryResponse {
    rule_limit: usize,
    max_buses: usize,
    stamp: String,
    items: Vec<BusResponse>,
}

/// Table row for a bus.
#[derive(Debug, Tabled)]
struct BusRow {
    #[tabled(rename = "Index")]
    index: u32,

    #[tabled(rename = "Bus")]
    name: String,

    #[tabled(rename = "Rules")]
    rules: String,

    #[tabled(rename = "Free")]
    free: usize,
}

fn bus_rows(inventory: &InventoryResponse) -> Vec<BusRow> {
    inventory
        .items
        .iter()
        .map(|bus| BusRow {
            index: bus.index,
            name: bus.name.clone(),
            rules: format!("{}/{}", bus.rule_count, inventory.rule_limit),
            free: inventory.rule_limit.saturating_sub(bus.rule_count),
        })
        .collect()
}

/// List all buses.
async fn list_buses(ctx: CommandContext) -> Result<()> {
    let client = ctx.client()?;

    let response: InventoryResponse = client.get("/v1/buses").await?;

    print_output(&bus_rows(&response), &response, ctx.format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiClient;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_inventory_rows_show_fill_level() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/buses"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rule_limit": 3,
                "max_buses": 10,
                "stamp": "9f2c",
                "items": [
                    {"name": "default", "index": 0, "rule_count": 1, "rules": ["a"]},
                    {"name": "pool-1", "index": 1, "rule_count": 3, "rules": ["b", "c", "d"]},
                ],
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let inventory: InventoryResponse = client.get("/v1/buses").await.unwrap();
        let rows = bus_rows(&inventory);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "default");
        assert_eq!(rows[0].rules, "1/3");
        assert_eq!(rows[0].free, 2);
        assert_eq!(rows[1].rules, "3/3");
        assert_eq!(rows[1].free, 0);
    }
}

//! Rule commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use rulepool_id::RuleName;
use serde::{Deserialize, Serialize};

use crate::output::{print_info, print_single, print_success, OutputFormat};

use super::CommandContext;

/// Rule commands.
#[derive(Debug, Args)]
pub struct RulesCommand {
    #[command(subcommand)]
    command: RulesSubcommand,
}

#[derive(Debug, Subcommand)]
enum RulesSubcommand {
    /// Place a one-shot rule on the first bus with room.
    Schedule(ScheduleRuleArgs),
}

#[derive(Debug, Args)]
struct ScheduleRuleArgs {
    /// Trigger expression, e.g. `at(2030-01-01T09:00:00)`.
    #[arg(long)]
    schedule: String,

    /// Compute target the rule invokes.
    #[arg(long)]
    target: String,

    /// JSON payload delivered to the target when the rule fires.
    #[arg(long)]
    payload: Option<String>,

    /// The target's policy already allows the bus to invoke it.
    #[arg(long)]
    grants_invoke: bool,

    /// Rule name; generated from the bus name if omitted.
    #[arg(long)]
    name: Option<RuleName>,
}

impl RulesCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            RulesSubcommand::Schedule(args) => schedule_rule(ctx, args).await,
        }
    }
}

#[derive(Debug, Serialize)]
struct TargetRequest {
    target_ref: String,
    payload: serde_json::Value,
    grants_invoke: bool,
}

#[derive(Debug, Serialize)]
struct ScheduleRuleRequest {
    schedule_expression: String,
    target: TargetRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ScheduleRuleResponse {
    rule_name: String,
    bus_name: String,
    bus_index: u32,
    created_bus: bool,
    #[serde(default)]
    collected_buses: Vec<String>,
}

impl TryFrom<ScheduleRuleArgs> for ScheduleRuleRequest {
    type Error = anyhow::Error;

    fn try_from(args: ScheduleRuleArgs) -> Result<Self> {
        let payload = match args.payload.as_deref() {
            Some(raw) => serde_json::from_str(raw).context("--payload is not valid JSON")?,
            None => serde_json::Value::Null,
        };

        Ok(Self {
            schedule_expression: args.schedule,
            target: TargetRequest {
                target_ref: args.target,
                payload,
                grants_invoke: args.grants_invoke,
            },
            name: args.name.map(|n| n.to_string()),
        })
    }
}

/// Schedule a rule.
async fn schedule_rule(ctx: CommandContext, args: ScheduleRuleArgs) -> Result<()> {
    let client = ctx.client()?;
    let request = ScheduleRuleRequest::try_from(args)?;

    let response: ScheduleRuleResponse = client.post("/v1/rules", &request).await?;

    match ctx.format {
        OutputFormat::Json => print_single(&response),
        OutputFormat::Table => {
            print_success(&format!(
                "Scheduled rule {} on bus {} (index {})",
                response.rule_name, response.bus_name, response.bus_index
            ));
            if response.created_bus {
                print_info(&format!("Created bus {}", response.bus_name));
            }
            if !response.collected_buses.is_empty() {
                print_info(&format!(
                    "Collected empty bus(es): {}",
                    response.collected_buses.join(", ")
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiClient;
    use crate::error::CliError;
    use clap::Parser;
    use rstest::rstest;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn args(payload: Option<&str>, name: Option<&str>) -> ScheduleRuleArgs {
        ScheduleRuleArgs {
            schedule: "at(2030-01-01T09:00:00)".to_string(),
            target: "fn:signature-reminders".to_string(),
            payload: payload.map(str::to_string),
            grants_invoke: false,
            name: name.map(|n| RuleName::existing(n).unwrap()),
        }
    }

    #[rstest]
    #[case(None, serde_json::Value::Null)]
    #[case(Some(r#"{"envelope":"env-17"}"#), json!({"envelope": "env-17"}))]
    #[case(Some("42"), json!(42))]
    fn payload_is_parsed_as_json(
        #[case] raw: Option<&str>,
        #[case] expected: serde_json::Value,
    ) {
        let request = ScheduleRuleRequest::try_from(args(raw, None)).unwrap();
        assert_eq!(request.target.payload, expected);
    }

    #[test]
    fn invalid_payload_is_rejected_locally() {
        let err = ScheduleRuleRequest::try_from(args(Some("{not json"), None)).unwrap_err();
        assert!(err.to_string().contains("--payload"));
    }

    #[test]
    fn name_with_whitespace_is_rejected_by_parser() {
        let parsed = crate::commands::Cli::try_parse_from([
            "rp",
            "rules",
            "schedule",
            "--schedule",
            "rate(5 minutes)",
            "--target",
            "fn:x",
            "--name",
            "two words",
        ]);
        assert!(parsed.is_err());
    }

    #[tokio::test]
    async fn test_schedule_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/rules"))
            .and(body_json(json!({
                "schedule_expression": "at(2030-01-01T09:00:00)",
                "target": {
                    "target_ref": "fn:signature-reminders",
                    "payload": {"envelope": "env-17"},
                    "grants_invoke": false,
                },
                "name": "envelope-17-reminder",
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "rule_name": "envelope-17-reminder",
                "bus_name": "pool-2",
                "bus_index": 2,
                "created_bus": true,
                "collected_buses": ["pool-1"],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let request = ScheduleRuleRequest::try_from(args(
            Some(r#"{"envelope":"env-17"}"#),
            Some("envelope-17-reminder"),
        ))
        .unwrap();
        let response: ScheduleRuleResponse = client.post("/v1/rules", &request).await.unwrap();

        assert_eq!(response.bus_name, "pool-2");
        assert!(response.created_bus);
        assert_eq!(response.collected_buses, vec!["pool-1".to_string()]);
    }

    #[tokio::test]
    async fn test_capacity_exhausted_surfaces_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/rules"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({
                "type": "about:blank",
                "title": "Service Unavailable",
                "status": 503,
                "detail": "pool is at its ceiling of 4 buses",
                "code": "capacity_exhausted",
                "request_id": "req_01J0000000000000000000000",
                "retryable": false,
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let request = ScheduleRuleRequest::try_from(args(None, None)).unwrap();
        let err = client
            .post::<ScheduleRuleResponse, _>("/v1/rules", &request)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CliError::Api { status: 503, ref code, .. } if code == "capacity_exhausted"
        ));
    }
}

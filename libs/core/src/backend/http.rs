//! HTTP client for the scheduling gateway.
//!
//! The gateway exposes the scheduling service as a small JSON API:
//! - `GET    /buses?prefix=&next_token=`
//! - `GET    /buses/{bus}/rules?prefix=&next_token=`
//! - `PUT    /buses/{bus}` and `DELETE /buses/{bus}`
//! - `PUT    /buses/{bus}/rules/{rule}` and `DELETE /buses/{bus}/rules/{rule}`
//! - `PUT    /buses/{bus}/rules/{rule}/targets`
//! - `DELETE /buses/{bus}/rules/{rule}/targets/{target_id}`
//! - `POST   /permissions`
//!
//! Errors come back as `{code, message}` and are mapped onto [`BackendError`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use rulepool_id::TargetId;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    BackendError, BackendResult, BusSummary, Page, RuleHandle, RuleSummary, SchedulerBackend,
    TargetAttachment,
};

/// Scheduling gateway client.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
}

#[derive(Debug, Serialize)]
struct PutRuleRequest<'a> {
    schedule_expression: &'a str,
}

#[derive(Debug, Deserialize)]
struct PutRuleResponse {
    handle: RuleHandle,
}

#[derive(Debug, Serialize)]
struct PermissionRequest<'a> {
    target_ref: &'a str,
    rule_handle: &'a RuleHandle,
}

#[derive(Debug, Deserialize)]
struct GatewayError {
    code: String,
    #[serde(default)]
    message: String,
}

impl HttpBackend {
    /// Create a client for the gateway at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> BackendResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Transport(format!("failed to build HTTP client: {e}")))?;

        let base_url = base_url.into();
        let base_url = Url::parse(&base_url)
            .map_err(|e| BackendError::Protocol(format!("invalid gateway URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::Protocol(format!(
                "gateway URL '{base_url}' cannot carry a path"
            )));
        }

        Ok(Self { client, base_url })
    }

    /// Append `segments` to the base URL, percent-encoding each one.
    ///
    /// `.` and `..` would be dropped by the URL serializer and retarget the
    /// request, so they are refused along with empty segments.
    fn url(&self, segments: &[&str]) -> BackendResult<Url> {
        if let Some(bad) = segments
            .iter()
            .find(|s| s.is_empty() || **s == "." || **s == "..")
        {
            return Err(BackendError::Protocol(format!(
                "'{bad}' is not a valid path segment"
            )));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| BackendError::Protocol("gateway URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> BackendResult<reqwest::Response> {
        let response = request.send().await.map_err(transport_error)?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let err = map_error(status, &body);
        debug!(status = %status, error = %err, "Gateway returned an error");
        Err(err)
    }

    async fn json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> BackendResult<T> {
        let response = self.send(request).await?;
        response
            .json()
            .await
            .map_err(|e| BackendError::Protocol(format!("invalid response body: {e}")))
    }

    fn listing_query<'a>(
        prefix: Option<&'a str>,
        next_token: Option<&'a str>,
    ) -> Vec<(&'static str, &'a str)> {
        let mut query = Vec::new();
        if let Some(prefix) = prefix {
            query.push(("prefix", prefix));
        }
        if let Some(token) = next_token {
            query.push(("next_token", token));
        }
        query
    }
}

fn transport_error(e: reqwest::Error) -> BackendError {
    BackendError::Transport(e.to_string())
}

/// Map a non-success gateway response onto a backend error.
fn map_error(status: StatusCode, body: &str) -> BackendError {
    let parsed: Option<GatewayError> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .map(|e| e.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("{status}: {body}"));

    if let Some(err) = parsed {
        match err.code.as_str() {
            "already_exists" => return BackendError::AlreadyExists(message),
            "still_in_use" => return BackendError::StillInUse(message),
            "not_found" => return BackendError::NotFound(message),
            "limit_exceeded" => return BackendError::LimitExceeded(message),
            "throttled" => return BackendError::Throttled(message),
            "access_denied" => return BackendError::Permission(message),
            other => warn!(code = other, "Unknown gateway error code"),
        }
    }

    match status {
        StatusCode::NOT_FOUND => BackendError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => BackendError::Throttled(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Permission(message),
        s if s.is_server_error() => BackendError::Transport(message),
        _ => BackendError::Protocol(message),
    }
}

#[async_trait]
impl SchedulerBackend for HttpBackend {
    async fn list_buses(
        &self,
        name_prefix: &str,
        next_token: Option<&str>,
    ) -> BackendResult<Page<BusSummary>> {
        let request = self
            .client
            .get(self.url(&["buses"])?)
            .query(&Self::listing_query(Some(name_prefix), next_token));
        self.json(request).await
    }

    async fn list_rules(
        &self,
        bus: &str,
        name_prefix: Option<&str>,
        next_token: Option<&str>,
    ) -> BackendResult<Page<RuleSummary>> {
        let request = self
            .client
            .get(self.url(&["buses", bus, "rules"])?)
            .query(&Self::listing_query(name_prefix, next_token));
        self.json(request).await
    }

    async fn create_bus(&self, bus: &str) -> BackendResult<()> {
        let request = self.client.put(self.url(&["buses", bus])?);
        self.send(request).await.map(|_| ())
    }

    async fn delete_bus(&self, bus: &str) -> BackendResult<()> {
        let request = self.client.delete(self.url(&["buses", bus])?);
        self.send(request).await.map(|_| ())
    }

    async fn put_rule(
        &self,
        bus: &str,
        rule: &str,
        schedule_expression: &str,
    ) -> BackendResult<RuleHandle> {
        let request = self
            .client
            .put(self.url(&["buses", bus, "rules", rule])?)
            .json(&PutRuleRequest {
                schedule_expression,
            });
        let response: PutRuleResponse = self.json(request).await?;
        Ok(response.handle)
    }

    async fn put_target(
        &self,
        bus: &str,
        rule: &str,
        target: &TargetAttachment,
    ) -> BackendResult<()> {
        let request = self
            .client
            .put(self.url(&["buses", bus, "rules", rule, "targets"])?)
            .json(target);
        self.send(request).await.map(|_| ())
    }

    async fn grant_invoke_permission(
        &self,
        target_ref: &str,
        rule: &RuleHandle,
    ) -> BackendResult<()> {
        let request = self
            .client
            .post(self.url(&["permissions"])?)
            .json(&PermissionRequest {
                target_ref,
                rule_handle: rule,
            });
        match self.send(request).await {
            Ok(_) => Ok(()),
            // A statement for this rule is already in the target's policy.
            Err(BackendError::AlreadyExists(message)) => {
                debug!(target_ref, message = %message, "Invoke permission already granted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn remove_targets(
        &self,
        bus: &str,
        rule: &str,
        target_ids: &[TargetId],
    ) -> BackendResult<()> {
        for target_id in target_ids {
            let target_id = target_id.to_string();
            let request = self
                .client
                .delete(self.url(&["buses", bus, "rules", rule, "targets", &target_id])?);
            self.send(request).await?;
        }
        Ok(())
    }

    async fn delete_rule(&self, bus: &str, rule: &str) -> BackendResult<()> {
        let request = self
            .client
            .delete(self.url(&["buses", bus, "rules", rule])?);
        self.send(request).await.map(|_| ())
    }
}

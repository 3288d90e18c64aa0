use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rulepool_core::{BackendError, PoolError};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub code: String,
    pub request_id: String,
    pub retryable: bool,
}

impl ProblemDetails {
    fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        let code = code.into();
        let title = status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string();
        Self {
            r#type: format!("https://rulepool.dev/problems/{code}"),
            title,
            status: status.as_u16(),
            detail: detail.into(),
            instance: None,
            code,
            request_id: "unknown".to_string(),
            retryable: false,
        }
    }

    fn set_request_id(&mut self, request_id: impl Into<String>) {
        let request_id = request_id.into();
        self.request_id = request_id.clone();
        if self.instance.is_none() {
            self.instance = Some(request_id);
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub problem: Box<ProblemDetails>,
}

impl ApiError {
    fn with_status(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        let problem = Box::new(ProblemDetails::new(status, code, message));
        Self { status, problem }
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, code, message)
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CONFLICT, code, message).retryable()
    }

    pub fn bad_gateway(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_GATEWAY, code, message)
    }

    pub fn service_unavailable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::SERVICE_UNAVAILABLE, code, message)
    }

    pub fn too_many_requests(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::TOO_MANY_REQUESTS, code, message).retryable()
    }

    pub fn retryable(mut self) -> Self {
        self.problem.retryable = true;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.problem.set_request_id(request_id);
        self
    }
}

impl From<PoolError> for ApiError {
    fn from(err: PoolError) -> Self {
        let detail = err.to_string();
        match err {
            PoolError::InvalidRule(_) => Self::bad_request("invalid_rule", detail),
            PoolError::Id(_) => Self::bad_request("invalid_name", detail),
            PoolError::Conflict { .. } => Self::conflict("placement_conflict", detail),
            PoolError::CapacityExhausted { .. } => {
                Self::service_unavailable("capacity_exhausted", detail)
            }
            PoolError::Task(_) => Self::internal("task_failed", detail).retryable(),
            PoolError::InvalidConfig(_) => {
                error!(error = %detail, "Pool configuration rejected at request time");
                Self::internal("internal_error", detail)
            }
            PoolError::Backend(backend) => match backend {
                BackendError::Throttled(_) => Self::too_many_requests("backend_throttled", detail),
                BackendError::Transport(_) => {
                    Self::bad_gateway("backend_unavailable", detail).retryable()
                }
                BackendError::NotFound(_) => Self::not_found("not_found", detail),
                BackendError::Permission(_) => Self::bad_gateway("backend_permission_denied", detail),
                _ => Self::bad_gateway("backend_error", detail),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.problem)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_map_to_status() {
        let cases = [
            (PoolError::InvalidRule("empty".into()), StatusCode::BAD_REQUEST),
            (
                PoolError::Conflict {
                    bus: "pool-1".into(),
                    reason: "full".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                PoolError::CapacityExhausted { max_buses: 2 },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                PoolError::Backend(BackendError::Throttled("slow".into())),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                PoolError::Backend(BackendError::Transport("reset".into())),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn test_conflict_is_retryable() {
        let err = ApiError::from(PoolError::Conflict {
            bus: "pool-1".into(),
            reason: "full".into(),
        })
        .with_request_id("req_1");
        assert!(err.problem.retryable);
        assert_eq!(err.problem.code, "placement_conflict");
        assert_eq!(err.problem.instance.as_deref(), Some("req_1"));
    }

    #[test]
    fn test_response_is_problem_json() {
        let response = ApiError::bad_request("invalid_rule", "nope").into_response();
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );
    }
}

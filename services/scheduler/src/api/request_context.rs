//! Request-scoped context extracted from HTTP requests.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Request};
use rulepool_id::RequestId;
use tower_http::request_id::{self, MakeRequestId};

use crate::api::error::ApiError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(request_id) = header_string(&parts.headers, REQUEST_ID_HEADER) else {
            return Ok(Self {
                request_id: RequestId::new().to_string(),
            });
        };

        if !(1..=128).contains(&request_id.len()) {
            return Err(ApiError::bad_request(
                "invalid_request_id",
                "x-request-id must be between 1 and 128 characters",
            ));
        }

        Ok(Self { request_id })
    }
}

/// Assigns `req_`-prefixed ULIDs to requests that arrive without an id.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUlid;

impl MakeRequestId for MakeRequestUlid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<request_id::RequestId> {
        HeaderValue::from_str(&RequestId::new().to_string())
            .ok()
            .map(request_id::RequestId::new)
    }
}

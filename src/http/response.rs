//! Response finishing.
//!
//! # Responsibilities
//! - Echo the correlation id on every response
//! - Attach rate-limit headers to admitted and rejected requests
//! - Turn any error response into the standard error envelope
//!
//! # Design Decisions
//! - Typed failures carry their `ApiError` in the response extensions and
//!   are re-rendered with path and request id filled in
//! - Bare error statuses (extractor rejections, unmatched routes, timeouts)
//!   are mapped through `ErrorCode::from_status`
//! - Server-side bodies are never leaked unless debug is on

use std::any::Any;

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};

use crate::errors::{ApiError, ErrorCode, GENERIC_INTERNAL_MESSAGE};
use crate::http::request::X_REQUEST_ID;
use crate::security::rate_limit::RateLimitStatus;

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// Largest bare error body read back when building an envelope.
const MAX_ERROR_BODY: usize = 16 * 1024;

pub fn set_request_id(headers: &mut HeaderMap, request_id: &str) {
    match HeaderValue::from_str(request_id) {
        Ok(value) => {
            headers.insert(X_REQUEST_ID, value);
        }
        Err(_) => tracing::warn!(request_id, "Request id is not a valid header value"),
    }
}

pub fn set_rate_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset_secs: u64) {
    headers.insert(HeaderName::from_static(X_RATELIMIT_LIMIT), HeaderValue::from(limit));
    headers.insert(
        HeaderName::from_static(X_RATELIMIT_REMAINING),
        HeaderValue::from(remaining),
    );
    headers.insert(HeaderName::from_static(X_RATELIMIT_RESET), HeaderValue::from(reset_secs));
}

pub fn apply_rate_limit_status(headers: &mut HeaderMap, status: &RateLimitStatus) {
    set_rate_limit_headers(headers, status.limit, status.remaining, status.reset_secs());
}

/// Normalize an error response into the envelope format. Successful
/// responses pass through untouched.
pub async fn into_envelope(
    response: Response,
    path: &str,
    request_id: &str,
    expose_internal: bool,
) -> Response {
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }

    let (parts, body) = response.into_parts();

    let error = match parts.extensions.get::<ApiError>() {
        Some(error) => error.clone(),
        None => {
            let text = match to_bytes(body, MAX_ERROR_BODY).await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
                Err(_) => String::new(),
            };
            bare_status_error(status, text)
        }
    };

    let mut rendered = error.render(Some(path), Some(request_id), expose_internal);
    for (name, value) in parts.headers.iter() {
        if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
            rendered.headers_mut().entry(name).or_insert_with(|| value.clone());
        }
    }
    rendered
}

fn bare_status_error(status: axum::http::StatusCode, body: String) -> ApiError {
    let code = ErrorCode::from_status(status);
    if status.is_server_error() {
        let error = ApiError::new(code, server_message(code), status);
        return if body.is_empty() {
            error
        } else {
            error.with_internal_detail(body)
        };
    }
    let message = if body.is_empty() {
        status.canonical_reason().unwrap_or("Request failed").to_string()
    } else {
        body
    };
    ApiError::new(code, message, status)
}

fn server_message(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
        _ => GENERIC_INTERNAL_MESSAGE,
    }
}

/// Response for a handler panic caught by `CatchPanicLayer`.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    ApiError::internal(detail).into_response()
}

//! Typed error raised by handlers instead of generic failures.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::fmt::Display;

use super::code::ErrorCode;
use super::envelope::{ErrorDetail, ErrorEnvelope};

/// Message shown for internal faults outside debug mode.
pub const GENERIC_INTERNAL_MESSAGE: &str = "An internal error occurred";

pub type ApiResult<T> = Result<T, ApiError>;

/// A request failure that carries everything needed to build an
/// [`ErrorEnvelope`] at the boundary.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    status: StatusCode,
    details: Vec<ErrorDetail>,
    /// Underlying cause of an internal fault. Only rendered in debug mode.
    internal_detail: Option<String>,
    /// Seconds until the client may retry (rate limiting).
    retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>, status: StatusCode) -> Self {
        Self {
            code,
            message: message.into(),
            status,
            details: Vec::new(),
            internal_detail: None,
            retry_after: None,
        }
    }

    fn of(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message, code.status())
    }

    pub fn validation(message: impl Into<String>, details: Vec<ErrorDetail>) -> Self {
        Self::of(ErrorCode::ValidationError, message).with_details(details)
    }

    pub fn not_found(resource: impl Display) -> Self {
        Self::of(ErrorCode::NotFound, format!("{} not found", resource))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::of(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::of(ErrorCode::Forbidden, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::of(ErrorCode::Conflict, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::of(ErrorCode::BadRequest, message)
    }

    pub fn resource_locked(message: impl Into<String>) -> Self {
        Self::of(ErrorCode::ResourceLocked, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::of(ErrorCode::ServiceUnavailable, message)
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        let mut err = Self::of(
            ErrorCode::RateLimited,
            format!("Rate limit exceeded. Retry after {} seconds", retry_after_secs),
        );
        err.retry_after = Some(retry_after_secs);
        err
    }

    /// Internal fault. `detail` is kept for logs and debug-mode responses only.
    pub fn internal(detail: impl Into<String>) -> Self {
        let mut err = Self::of(ErrorCode::InternalError, GENERIC_INTERNAL_MESSAGE);
        err.internal_detail = Some(detail.into());
        err
    }

    /// Wrap any unexpected error as `INTERNAL_ERROR`.
    pub fn from_fault<E: std::error::Error + ?Sized>(err: &E) -> Self {
        Self::internal(err.to_string())
    }

    pub fn with_details(mut self, details: Vec<ErrorDetail>) -> Self {
        self.details.extend(details);
        self
    }

    pub fn with_detail(mut self, detail: ErrorDetail) -> Self {
        self.details.push(detail);
        self
    }

    pub fn with_internal_detail(mut self, detail: impl Into<String>) -> Self {
        self.internal_detail = Some(detail.into());
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn details(&self) -> &[ErrorDetail] {
        &self.details
    }

    pub fn internal_detail(&self) -> Option<&str> {
        self.internal_detail.as_deref()
    }

    pub fn retry_after(&self) -> Option<u64> {
        self.retry_after
    }

    /// Build the envelope for this error.
    pub fn to_envelope(
        &self,
        path: Option<&str>,
        request_id: Option<&str>,
        expose_internal: bool,
    ) -> ErrorEnvelope {
        let mut details = self.details.clone();
        if expose_internal {
            if let Some(detail) = &self.internal_detail {
                details.push(ErrorDetail::new(detail.clone()).with_code("internal"));
            }
        }
        ErrorEnvelope::new(
            self.code,
            self.message.clone(),
            path.map(str::to_string),
            request_id.map(str::to_string),
            details,
        )
    }

    /// Render the final response: envelope body, status, and `Retry-After`
    /// when present. The error itself rides along in the response extensions
    /// so outer layers can tell a typed failure from a bare status.
    pub fn render(
        &self,
        path: Option<&str>,
        request_id: Option<&str>,
        expose_internal: bool,
    ) -> Response {
        if self.code == ErrorCode::InternalError {
            tracing::error!(
                request_id = request_id.unwrap_or("-"),
                path = path.unwrap_or("-"),
                detail = self.internal_detail.as_deref().unwrap_or("-"),
                "Internal error"
            );
        }

        let mut response = self
            .to_envelope(path, request_id, expose_internal)
            .into_response_with(self.status);
        if let Some(secs) = self.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response.extensions_mut().insert(self.clone());
        response
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Path and request id are filled in by the pipeline when it re-renders.
        let mut response = self
            .to_envelope(None, None, false)
            .into_response_with(self.status);
        if let Some(secs) = self.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response.extensions_mut().insert(self);
        response
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::bad_request(format!("Malformed JSON: {}", err))
    }
}

//! Canonical error body returned for every failed request.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::code::ErrorCode;

/// A single field-level problem attached to an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Offending field, if the problem is tied to one.
    pub field: Option<String>,
    pub message: String,
    /// Machine-readable sub-code (e.g. `required`, `too_long`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorDetail {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
            code: None,
        }
    }

    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// The error body. Built once at the boundary and never modified afterwards,
/// so its fields are only readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    error_code: ErrorCode,
    message: String,
    timestamp: DateTime<Utc>,
    path: Option<String>,
    request_id: Option<String>,
    details: Vec<ErrorDetail>,
}

impl ErrorEnvelope {
    pub fn new(
        error_code: ErrorCode,
        message: impl Into<String>,
        path: Option<String>,
        request_id: Option<String>,
        details: Vec<ErrorDetail>,
    ) -> Self {
        Self {
            error_code,
            message: message.into(),
            timestamp: Utc::now(),
            path,
            request_id,
            details,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        self.error_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn details(&self) -> &[ErrorDetail] {
        &self.details
    }

    /// Render as a JSON response with the given status.
    pub fn into_response_with(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

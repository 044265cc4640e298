//! Error taxonomy.
//!
//! # Data Flow
//! ```text
//! handler raises ApiError ─┐
//! panic / bare 4xx-5xx ────┼─→ pipeline boundary
//!                          │      → ErrorEnvelope (code, message, timestamp,
//!                          │                       path, request_id, details)
//!                          └─→ JSON body + matching HTTP status
//! ```
//!
//! # Design Decisions
//! - Closed enumeration of codes; unknown faults collapse to `INTERNAL_ERROR`
//! - Internal detail only leaves the process in debug mode
//! - One envelope per failed request, built at the boundary

pub mod api_error;
pub mod code;
pub mod envelope;

pub use api_error::{ApiError, ApiResult, GENERIC_INTERNAL_MESSAGE};
pub use code::ErrorCode;
pub use envelope::{ErrorDetail, ErrorEnvelope};

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Structured error response.
/// Every error carries enough information for a client to understand what
/// went wrong and how to fix the request.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Machine-readable error code (e.g. "validation_failed", "not_found")
    pub error: String,
    /// Human-readable description of what went wrong
    pub message: String,
    /// Which field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The value that was received (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<serde_json::Value>,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

/// Error codes used across the API
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const NOT_FOUND: &str = "not_found";
    pub const INTERNAL_ERROR: &str = "internal_error";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const UPSTREAM_UNAVAILABLE: &str = "upstream_unavailable";
}

/// Failure talking to one of the external services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("could not decode upstream response: {0}")]
    Decode(String),
    #[error("upstream call timed out")]
    Timeout,
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
}

/// Something that went wrong during a turn without failing it.
///
/// Turns always produce a reply; issues are reported next to the reply for
/// logging and never shown to the customer verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnIssue {
    /// The ticket exists but cannot be upgraded, or does not exist
    ValidationRejected { ticket_id: String, reason: String },
    /// A collaborator timed out, failed, or returned unusable output
    UpstreamUnavailable { operation: &'static str, reason: String },
    /// A selection named an option that was never disclosed
    MalformedSelection,
    /// The message looked like a ticket id but was not one
    MalformedTicketReference,
}

impl TurnIssue {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ValidationRejected { .. } => "validation_rejected",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::MalformedSelection => "malformed_selection",
            Self::MalformedTicketReference => "malformed_ticket_reference",
        }
    }
}

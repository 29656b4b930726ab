// errors.rs - Structured error handling for experiment analysis
//
// Expected data conditions (no events, a missing variant, a malformed record) are
// reported to callers as values rather than faults. Every error carries a domain,
// a stable code and an optional recovery hint so the API layer can turn it into a
// `{status: "error", message}` body without inspecting strings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error domains categorize errors by the component that raised them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorDomain {
    /// Event store failures (database unreachable, query failed)
    Store,

    /// Dataset loading failures (unparsable timestamp, invalid record shape)
    Dataset,

    /// Analysis preconditions not met (no data, a variant missing)
    Analysis,

    /// Invalid caller input (unknown variant, non-finite time)
    Configuration,

    /// Internal errors (numeric routine rejected its parameters)
    Internal,
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorDomain::Store => write!(f, "store"),
            ErrorDomain::Dataset => write!(f, "dataset"),
            ErrorDomain::Analysis => write!(f, "analysis"),
            ErrorDomain::Configuration => write!(f, "configuration"),
            ErrorDomain::Internal => write!(f, "internal"),
        }
    }
}

/// Stable error codes for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCode(pub String);

impl ErrorCode {
    // Store error codes
    pub const STORE_QUERY_FAILED: &'static str = "STORE_QUERY_FAILED";

    // Dataset error codes
    pub const MALFORMED_TIMESTAMP: &'static str = "MALFORMED_TIMESTAMP";
    pub const MALFORMED_RECORD: &'static str = "MALFORMED_RECORD";

    // Analysis error codes
    pub const NO_DATA: &'static str = "NO_DATA";
    pub const INSUFFICIENT_VARIANT_DATA: &'static str = "INSUFFICIENT_VARIANT_DATA";
    pub const INSUFFICIENT_SAMPLES: &'static str = "INSUFFICIENT_SAMPLES";

    // Configuration error codes
    pub const INVALID_VARIANT: &'static str = "INVALID_VARIANT";
    pub const INVALID_VALUE: &'static str = "INVALID_VALUE";

    // Internal error codes
    pub const NUMERIC_FAILURE: &'static str = "NUMERIC_FAILURE";

    /// Creates a new error code
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ErrorCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Structured analysis error that serializes cleanly into API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisError {
    /// The error domain
    pub domain: ErrorDomain,

    /// Stable error code
    pub code: ErrorCode,

    /// Human-readable error message, surfaced verbatim as the response `message`
    pub message: String,

    /// Optional additional context (experiment id, offending value)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Optional hint for recovery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_hint: Option<String>,
}

impl AnalysisError {
    #[must_use]
    pub fn new(domain: ErrorDomain, code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self {
            domain,
            code: code.into(),
            message: message.into(),
            details: None,
            recovery_hint: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub fn with_recovery_hint(mut self, hint: impl Into<String>) -> Self {
        self.recovery_hint = Some(hint.into());
        self
    }

    /// True when the error code matches `code`
    #[must_use]
    pub fn is(&self, code: &str) -> bool {
        self.code.0 == code
    }

    // =========================================================================
    // Factory methods
    // =========================================================================

    /// The experiment has no events at all
    #[must_use]
    pub fn no_data() -> Self {
        Self::new(ErrorDomain::Analysis, ErrorCode::NO_DATA, "No data available")
            .with_recovery_hint("Record events for this experiment before requesting analysis.")
    }

    /// One or both variants have no rows
    #[must_use]
    pub fn insufficient_variant_data(n_a: usize, n_b: usize) -> Self {
        Self::new(
            ErrorDomain::Analysis,
            ErrorCode::INSUFFICIENT_VARIANT_DATA,
            "Need data from both variants",
        )
        .with_details(serde_json::json!({ "n_a": n_a, "n_b": n_b }))
    }

    /// No qualifying completion-time samples for a percentile query
    #[must_use]
    pub fn insufficient_samples(variant: &str) -> Self {
        Self::new(
            ErrorDomain::Analysis,
            ErrorCode::INSUFFICIENT_SAMPLES,
            "Not enough data for percentile calculation",
        )
        .with_details(serde_json::json!({ "variant": variant }))
    }

    /// A timestamp could not be parsed; the date range cannot be established
    #[must_use]
    pub fn malformed_timestamp(raw: &str) -> Self {
        Self::new(
            ErrorDomain::Dataset,
            ErrorCode::MALFORMED_TIMESTAMP,
            format!("Unparsable event timestamp '{raw}'"),
        )
        .with_details(serde_json::json!({ "timestamp": raw }))
    }

    /// A stored record does not have the shape of an event
    #[must_use]
    pub fn malformed_record(reason: &str) -> Self {
        Self::new(
            ErrorDomain::Dataset,
            ErrorCode::MALFORMED_RECORD,
            format!("Malformed event record: {reason}"),
        )
    }

    /// A variant label other than A or B was requested
    #[must_use]
    pub fn invalid_variant(raw: &str) -> Self {
        Self::new(
            ErrorDomain::Configuration,
            ErrorCode::INVALID_VARIANT,
            format!("Unknown variant '{raw}', expected 'A' or 'B'"),
        )
        .with_details(serde_json::json!({ "variant": raw }))
    }

    /// A caller-supplied number was not usable
    #[must_use]
    pub fn invalid_value(field: &str, reason: &str) -> Self {
        Self::new(
            ErrorDomain::Configuration,
            ErrorCode::INVALID_VALUE,
            format!("Invalid {field}: {reason}"),
        )
    }

    /// The event store could not be queried
    #[must_use]
    pub fn store_query_failed(experiment_id: &str, error: &str) -> Self {
        Self::new(
            ErrorDomain::Store,
            ErrorCode::STORE_QUERY_FAILED,
            format!("Failed to fetch events: {error}"),
        )
        .with_details(serde_json::json!({
            "experiment_id": experiment_id,
            "error": error
        }))
    }

    /// A distribution constructor rejected its parameters
    #[must_use]
    pub fn numeric_failure(routine: &str, error: &str) -> Self {
        Self::new(
            ErrorDomain::Internal,
            ErrorCode::NUMERIC_FAILURE,
            format!("{routine} failed: {error}"),
        )
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}] {}", self.domain, self.code, self.message)
    }
}

impl std::error::Error for AnalysisError {}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

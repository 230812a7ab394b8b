//! Error taxonomy: §7 of the design.
//!
//! Retries and fallback are local to C1 and the retrieval pipeline; everything
//! else surfaces. `Degraded` is not a failure — it is a successful result
//! carrying warnings, returned with a 200/`result` on both transports.

use std::fmt;

#[derive(Debug, Clone)]
pub enum CoreError {
    /// Malformed input: empty query, non-UTF-8 content, negative limit, etc.
    Validation(String),
    /// A requested capability (model, provider) is absent from configuration.
    NotConfigured(String),
    /// Network, 5xx, 429, or timeout on C1/C2/C3, retried and exhausted.
    TransientExternal(String),
    /// An operation exceeded its caller-imposed deadline.
    DeadlineExceeded,
    /// Invariant violation: dimensionality mismatch, corrupted row.
    Fatal(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Validation(msg) => write!(f, "validation error: {msg}"),
            CoreError::NotConfigured(msg) => write!(f, "not configured: {msg}"),
            CoreError::TransientExternal(msg) => write!(f, "transient external error: {msg}"),
            CoreError::DeadlineExceeded => write!(f, "deadline exceeded"),
            CoreError::Fatal(msg) => write!(f, "fatal: {msg}"),
        }
    }
}

impl std::error::Error for CoreError {}

pub type Result<T> = std::result::Result<T, CoreError>;

/// A successful-but-reduced-quality result. Never an error on the wire; the
/// orchestrator and transports turn this into a 200 with `warnings`.
#[derive(Debug, Clone, Default)]
pub struct Warnings(pub Vec<String>);

impl Warnings {
    pub fn push(&mut self, warning: impl Into<String>) {
        self.0.push(warning.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

/// The wire-level error shape for both transports: `{code, message, detail?}`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<&CoreError> for ErrorPayload {
    fn from(e: &CoreError) -> Self {
        let code = match e {
            CoreError::Validation(_) => "validation_error",
            CoreError::NotConfigured(_) => "not_configured",
            CoreError::TransientExternal(_) => "transient_external_error",
            CoreError::DeadlineExceeded => "deadline_exceeded",
            CoreError::Fatal(_) => "fatal",
        };
        ErrorPayload {
            code: code.to_string(),
            message: e.to_string(),
            detail: None,
        }
    }
}

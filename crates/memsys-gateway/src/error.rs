use std::fmt;

#[derive(Debug)]
pub enum GatewayError {
    NotConfigured(String),
    AllProvidersExhausted { operation: &'static str, model: String },
    Transient(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::NotConfigured(what) => write!(f, "not configured: {what}"),
            GatewayError::AllProvidersExhausted { operation, model } => {
                write!(f, "all providers exhausted for {operation} model={model}")
            }
            GatewayError::Transient(msg) => write!(f, "transient provider error: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<GatewayError> for memsys_core::CoreError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::NotConfigured(what) => memsys_core::CoreError::NotConfigured(what),
            other => memsys_core::CoreError::TransientExternal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

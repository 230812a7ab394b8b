use std::fmt;

#[derive(Debug)]
pub enum VectorError {
    Client(String),
    InvalidPayload(String),
}

impl fmt::Display for VectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorError::Client(msg) => write!(f, "qdrant client error: {msg}"),
            VectorError::InvalidPayload(msg) => write!(f, "invalid vector payload: {msg}"),
        }
    }
}

impl std::error::Error for VectorError {}

impl From<qdrant_client::QdrantError> for VectorError {
    fn from(e: qdrant_client::QdrantError) -> Self {
        VectorError::Client(e.to_string())
    }
}

impl From<VectorError> for memsys_core::CoreError {
    fn from(e: VectorError) -> Self {
        memsys_core::CoreError::TransientExternal(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VectorError>;

use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    InvalidData(String),
    PoolTimeout(String),
    NotFound,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "SQLite error: {e}"),
            StoreError::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            StoreError::PoolTimeout(msg) => write!(f, "pool acquire timed out: {msg}"),
            StoreError::NotFound => write!(f, "record not found"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<StoreError> for memsys_core::CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::PoolTimeout(msg) => memsys_core::CoreError::TransientExternal(msg),
            StoreError::NotFound => memsys_core::CoreError::Validation("not found".into()),
            other => memsys_core::CoreError::Fatal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WikiError {
    #[error("VALIDATION: {0}")]
    Validation(String),
    #[error("PERMISSION_DENIED: {0}")]
    Permission(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("STORAGE_FAILURE: {0}")]
    Storage(String),
    #[error("CHANNEL_FAILURE: {0}")]
    Channel(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for WikiError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type WikiResult<T> = Result<T, WikiError>;

use thiserror::Error;

/// Stored values the domain layer refuses to interpret.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("unknown content status `{value}`")]
    UnknownStatus { value: String },
    #[error("timestamp `{value}` is not a valid stored timestamp")]
    Timestamp { value: String },
}

impl DomainError {
    pub fn unknown_status(value: impl Into<String>) -> Self {
        Self::UnknownStatus {
            value: value.into(),
        }
    }

    pub fn timestamp(value: impl Into<String>) -> Self {
        Self::Timestamp {
            value: value.into(),
        }
    }
}

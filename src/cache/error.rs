use thiserror::Error;

/// A KV or edge store could not serve a request. Callers in this module never
/// surface it; it is logged and turned into a miss or a no-op.
#[derive(Debug, Error)]
pub enum CacheUnavailable {
    #[error("cache store `{op}` failed for `{key}`: {message}")]
    Store {
        op: &'static str,
        key: String,
        message: String,
    },
    #[error("cache store `{op}` timed out for `{key}`")]
    Timeout { op: &'static str, key: String },
    #[error("cached payload under `{key}` could not be decoded: {message}")]
    Payload { key: String, message: String },
}

impl CacheUnavailable {
    pub fn store(op: &'static str, key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Store {
            op,
            key: key.into(),
            message: err.to_string(),
        }
    }

    pub fn timeout(op: &'static str, key: impl Into<String>) -> Self {
        Self::Timeout {
            op,
            key: key.into(),
        }
    }

    pub fn payload(key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Payload {
            key: key.into(),
            message: err.to_string(),
        }
    }
}

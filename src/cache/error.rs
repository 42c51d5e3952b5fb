use thiserror::Error;

/// Failure reported by a storage backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache backend operation `{op}` failed: {message}")]
    Operation { op: &'static str, message: String },
}

impl BackendError {
    pub fn operation(op: &'static str, message: impl Into<String>) -> Self {
        Self::Operation {
            op,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("could not find cache metadata in entry `{identifier}`")]
    MissingMetadata { identifier: String },
    #[error("invalid cache metadata in entry `{identifier}`: {source}")]
    InvalidMetadata {
        identifier: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode cache entry `{identifier}`: {source}")]
    Encode {
        identifier: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("stored response `{identifier}` is malformed: {reason}")]
    MalformedPayload { identifier: String, reason: String },
}

impl StoreError {
    /// True when the entry bytes, rather than the backend, are at fault.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::MissingMetadata { .. }
                | Self::InvalidMetadata { .. }
                | Self::MalformedPayload { .. }
        )
    }
}

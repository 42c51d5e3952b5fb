use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("content `{identifier}` not found")]
    NotFound { identifier: String },
    #[error("content validation failed: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            identifier: identifier.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

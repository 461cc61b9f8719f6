use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("field `{field}` is not a valid number: {reason}")]
    InvalidNumber {
        field: &'static str,
        reason: String,
    },
    #[error("domain validation failed: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn invalid_number(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidNumber {
            field,
            reason: reason.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

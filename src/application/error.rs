use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{application::calculator::CalculationError, infra::error::InfraError};

const INVALID_INPUT_MESSAGE: &str = "Invalid input";
const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

/// Server-side diagnostics attached to an error response for the logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Plain-text error response; the public message never carries diagnostic detail.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn invalid_input(source: &'static str, detail: impl Into<String>) -> Self {
        Self::new(
            source,
            StatusCode::BAD_REQUEST,
            INVALID_INPUT_MESSAGE,
            detail,
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<CalculationError> for HttpError {
    fn from(error: CalculationError) -> Self {
        const SOURCE: &str = "infra::http::calculation_error_to_http_error";
        match &error {
            CalculationError::InvalidInput(_) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                INVALID_INPUT_MESSAGE,
                &error,
            ),
            CalculationError::CacheUnavailable { .. } | CalculationError::Persistence { .. } => {
                HttpError::from_error(
                    SOURCE,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    INTERNAL_ERROR_MESSAGE,
                    &error,
                )
            }
        }
    }
}

/// Top-level failure of a CLI command.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::application::repos::{CacheError, RepoError};
    use crate::domain::error::DomainError;

    use super::*;

    #[test]
    fn invalid_input_maps_to_bad_request() {
        let error: HttpError =
            CalculationError::from(DomainError::invalid_number("num1", "not a number")).into();
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn infrastructure_failures_map_to_internal_error() {
        let cache: HttpError = CalculationError::CacheUnavailable {
            operation: "lookup",
            source: CacheError::Timeout(Duration::from_millis(5)),
        }
        .into();
        let persistence: HttpError = CalculationError::Persistence {
            operation: "append",
            source: RepoError::Timeout,
        }
        .into();

        assert_eq!(cache.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(persistence.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn report_collects_the_error_chain() {
        let error = CalculationError::Persistence {
            operation: "append",
            source: RepoError::Persistence("connection reset".to_string()),
        };
        let report = ErrorReport::from_error("test", StatusCode::INTERNAL_SERVER_ERROR, &error);
        assert_eq!(report.messages.len(), 2);
        assert!(report.messages[1].contains("connection reset"));
    }
}

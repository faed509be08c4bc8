use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;

use crate::inference::InferenceError;
use crate::paperless::PaperlessError;
use crate::pipeline::ProcessingError;
use crate::repository::RepositoryError;
use crate::workers::QueueError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "resource not found")
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn bad_gateway<E: Display>(error: E) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, error.to_string())
    }

    pub fn internal<E: Display>(error: E) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.message, "request failed");
        }
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl From<RepositoryError> for AppError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound(_) => AppError::new(StatusCode::NOT_FOUND, value.to_string()),
            RepositoryError::Conflict(message) => AppError::conflict(message),
            _ => AppError::internal(value),
        }
    }
}

impl From<PaperlessError> for AppError {
    fn from(value: PaperlessError) -> Self {
        let status = match &value {
            PaperlessError::NotFound(_) => StatusCode::NOT_FOUND,
            PaperlessError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            PaperlessError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        };
        AppError::new(status, value.to_string())
    }
}

impl From<InferenceError> for AppError {
    fn from(value: InferenceError) -> Self {
        match value {
            InferenceError::Timeout { .. } => {
                AppError::new(StatusCode::GATEWAY_TIMEOUT, value.to_string())
            }
            _ => AppError::bad_gateway(value),
        }
    }
}

impl From<ProcessingError> for AppError {
    fn from(value: ProcessingError) -> Self {
        match value {
            ProcessingError::EmptyContent { .. } => {
                AppError::new(StatusCode::UNPROCESSABLE_ENTITY, value.to_string())
            }
            ProcessingError::DocumentService { source, .. } => source.into(),
            _ => AppError::bad_gateway(value),
        }
    }
}

impl From<QueueError> for AppError {
    fn from(value: QueueError) -> Self {
        match value {
            QueueError::Repository(err) => err.into(),
            QueueError::Processing(err) => err.into(),
            QueueError::DocumentService(err) => err.into(),
            QueueError::UnknownUser(_) => AppError::new(StatusCode::NOT_FOUND, value.to_string()),
            QueueError::Encoding(err) => AppError::internal(err),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::internal(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_errors_map_to_client_statuses() {
        let missing: AppError = RepositoryError::NotFound("approval 1".into()).into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let conflict: AppError = RepositoryError::Conflict("already approved".into()).into();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn upstream_failures_are_gateway_errors() {
        let auth: AppError = PaperlessError::Auth {
            status: 401,
            message: "invalid token".into(),
        }
        .into();
        assert_eq!(auth.status(), StatusCode::BAD_GATEWAY);

        let slow: AppError = InferenceError::Timeout { seconds: 120 }.into();
        assert_eq!(slow.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}

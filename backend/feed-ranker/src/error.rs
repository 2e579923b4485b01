use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RankerError>;

#[derive(Debug, Error)]
pub enum RankerError {
    #[error("Failed to load {model} artifact from {path}: {reason}")]
    ArtifactLoad {
        model: String,
        path: PathBuf,
        reason: String,
    },

    #[error("{model} artifact does not match feature schema {schema_version}: {detail}")]
    SchemaMismatch {
        model: String,
        schema_version: String,
        detail: String,
    },

    #[error("Invalid feature schema: {0}")]
    InvalidSchema(String),

    #[error("Scoring failed: expected {expected} features, got {actual}")]
    Scoring { expected: usize, actual: usize },

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Resource exhausted: {in_flight} requests in flight, {queued} queued")]
    ResourceExhausted { in_flight: usize, queued: usize },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RankerError {
    pub fn artifact_load(
        model: impl Into<String>,
        path: impl Into<PathBuf>,
        reason: impl std::fmt::Display,
    ) -> Self {
        RankerError::ArtifactLoad {
            model: model.into(),
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Startup errors keep the service out of rotation; everything else is per request.
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            RankerError::ArtifactLoad { .. }
                | RankerError::SchemaMismatch { .. }
                | RankerError::InvalidSchema(_)
                | RankerError::InvalidConfig(_)
        )
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

impl ResponseError for RankerError {
    fn error_response(&self) -> HttpResponse {
        let code = self.status_code();
        HttpResponse::build(code).json(ErrorResponse {
            error: self.to_string(),
            code: code.as_u16(),
        })
    }

    fn status_code(&self) -> StatusCode {
        match self {
            RankerError::MalformedRequest(_) | RankerError::Scoring { .. } => {
                StatusCode::BAD_REQUEST
            }
            RankerError::ResourceExhausted { .. } => StatusCode::TOO_MANY_REQUESTS,
            RankerError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RankerError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<tokio::task::JoinError> for RankerError {
    fn from(err: tokio::task::JoinError) -> Self {
        RankerError::Internal(format!("scoring task failed: {}", err))
    }
}

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{
    ingest::{ErrorKind, IngestError},
    repository::RepositoryError,
};

/// Everything a handler can fail with, mapped to a status code and JSON body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(&'static str),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

fn validation(reason: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "kind": ErrorKind::Validation,
            "type": "validation_error",
            "reason": reason,
            "error": reason,
        })),
    )
        .into_response()
}

fn server_error(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "kind": ErrorKind::ServerError, "error": message })),
    )
        .into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(reason) => validation(reason),
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Multipart(e) => {
                (e.status(), Json(json!({ "error": e.body_text() }))).into_response()
            }
            ApiError::Ingest(e) => match e.kind() {
                ErrorKind::Validation => validation(e.to_string()),
                ErrorKind::ServerError => {
                    error!("Recipe creation failed: {}", e);
                    server_error("Failed to create recipe")
                }
            },
            ApiError::Repository(e) => {
                error!("Repository failure: {}", e);
                server_error("Internal server error")
            }
        }
    }
}

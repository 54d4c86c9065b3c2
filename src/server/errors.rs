//! Mapping of domain errors to HTTP responses.

use crate::download_manager::DownloadManagerError;
use crate::library::LibraryError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

impl IntoResponse for DownloadManagerError {
    fn into_response(self) -> Response {
        let status = match &self {
            DownloadManagerError::Validation(_) => StatusCode::BAD_REQUEST,
            DownloadManagerError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            DownloadManagerError::AlreadyRunning | DownloadManagerError::QueueEmpty => {
                StatusCode::CONFLICT
            }
            DownloadManagerError::Persistence(e) => {
                error!("Download manager persistence failure: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        error_response(status, self.to_string())
    }
}

impl IntoResponse for LibraryError {
    fn into_response(self) -> Response {
        let status = match &self {
            LibraryError::NotFound(_) => StatusCode::NOT_FOUND,
            LibraryError::Validation(_) => StatusCode::BAD_REQUEST,
            LibraryError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                StatusCode::NOT_FOUND
            }
            LibraryError::Io(e) => {
                error!("Library IO failure: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            LibraryError::Persistence(e) => {
                error!("Library persistence failure: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        error_response(status, self.to_string())
    }
}

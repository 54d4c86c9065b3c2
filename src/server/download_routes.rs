//! Download manager HTTP routes.
//!
//! Provides endpoints for:
//! - Submitting direct downloads and uploaded imports
//! - Inspecting the queue
//! - Starting, pausing and cancelling downloads

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::download_manager::DownloadRequest;
use crate::library::{ImportRequest, UploadedFile};
use crate::server::errors::error_response;
use crate::server::state::{GuardedDownloadManager, GuardedLibrary, ServerState};

/// Uploads of whole archives are large.
const MAX_IMPORT_BODY_BYTES: usize = 512 * 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub message: String,
    pub task_id: String,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub message: String,
    pub comic_id: String,
}

fn message(text: &str) -> Response {
    Json(serde_json::json!({ "message": text })).into_response()
}

async fn submit_direct(
    State(manager): State<GuardedDownloadManager>,
    Json(request): Json<DownloadRequest>,
) -> Response {
    debug!(
        "Direct download request for {} ({} episodes)",
        request.comic_id,
        request.episodes.len()
    );
    match manager.submit(request) {
        Ok(task_id) => Json(SubmitResponse {
            message: "Download task submitted".to_string(),
            task_id,
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn import_archive(
    State(library): State<GuardedLibrary>,
    mut multipart: Multipart,
) -> Response {
    let mut request = ImportRequest::default();
    let mut files = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read multipart body: {}", e);
                return error_response(StatusCode::BAD_REQUEST, e.to_string());
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        if name == "files" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            match field.bytes().await {
                Ok(data) => files.push(UploadedFile {
                    file_name,
                    data: data.to_vec(),
                }),
                Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
            }
            continue;
        }

        let value = match field.text().await {
            Ok(value) => value,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
        };
        match name.as_str() {
            "comic_id" => request.comic_id = value,
            "title" => request.title = value,
            "type" => request.source_type = value,
            "author" => request.author = value,
            "description" => request.description = value,
            "cover" => request.cover = value,
            "tags" => request.tags = Some(value),
            "eps" => request.episode_names = Some(value),
            "download_time" => request.download_time = Some(value),
            other => debug!("Ignoring import field {}", other),
        }
    }

    info!(
        "Import request for {} with {} files",
        request.comic_id,
        files.len()
    );
    match library.import(request, files).await {
        Ok(record) => Json(ImportResponse {
            message: "Import completed".to_string(),
            comic_id: record.id,
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_queue(State(manager): State<GuardedDownloadManager>) -> Response {
    Json(manager.queue()).into_response()
}

async fn start_downloads(State(manager): State<GuardedDownloadManager>) -> Response {
    match manager.start() {
        Ok(()) => message("Download started"),
        Err(e) => e.into_response(),
    }
}

async fn pause_downloads(State(manager): State<GuardedDownloadManager>) -> Response {
    match manager.pause() {
        Ok(()) => message("Download paused"),
        Err(e) => e.into_response(),
    }
}

async fn cancel_task(
    State(manager): State<GuardedDownloadManager>,
    Path(id): Path<String>,
) -> Response {
    match manager.cancel(&id) {
        Ok(()) => message("Task cancelled"),
        Err(e) => e.into_response(),
    }
}

/// Build the download routes.
///
/// - POST /direct
/// - POST /import
/// - GET /queue
/// - POST /start
/// - POST /pause
/// - DELETE /{id}
pub fn download_routes() -> Router<ServerState> {
    Router::new()
        .route("/direct", post(submit_direct))
        .route(
            "/import",
            post(import_archive).layer(DefaultBodyLimit::max(MAX_IMPORT_BODY_BYTES)),
        )
        .route("/queue", get(get_queue))
        .route("/start", post(start_downloads))
        .route("/pause", post(pause_downloads))
        .route("/{id}", delete(cancel_task))
}

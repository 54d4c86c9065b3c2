//! Archive browsing HTTP routes.
//!
//! - GET /
//! - GET /{id}
//! - GET /{id}/cover
//! - GET /{id}/{ep}/info
//! - GET /{id}/{ep}/{page}
//! - DELETE /{id}

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::warn;

use crate::archive_store::ArchiveRecord;
use crate::library::{ComicLibrary, LibraryError};
use crate::server::state::{GuardedLibrary, ServerState};

#[derive(Debug, Serialize)]
pub struct ArchiveListResponse {
    pub comics: Vec<ArchiveRecord>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct EpisodeInfoResponse {
    pub episode: u32,
    pub page_count: usize,
}

/// Library lookups walk the download root, so they run on the blocking pool.
async fn blocking<T, F>(library: GuardedLibrary, op: F) -> Result<T, LibraryError>
where
    T: Send + 'static,
    F: FnOnce(&ComicLibrary) -> Result<T, LibraryError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || op(library.as_ref())).await {
        Ok(result) => result,
        Err(e) => Err(LibraryError::Io(std::io::Error::other(e))),
    }
}

async fn list_archives(State(library): State<GuardedLibrary>) -> Response {
    match blocking(library, |library| library.list_archives()).await {
        Ok(comics) => Json(ArchiveListResponse {
            total: comics.len(),
            comics,
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_archive(State(library): State<GuardedLibrary>, Path(id): Path<String>) -> Response {
    match blocking(library, move |library| library.get_archive(&id)).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_cover(State(library): State<GuardedLibrary>, Path(id): Path<String>) -> Response {
    match blocking(library, move |library| library.cover_path(&id)).await {
        Ok(path) => serve_image(path).await,
        Err(e) => e.into_response(),
    }
}

async fn get_episode_info(
    State(library): State<GuardedLibrary>,
    Path((id, episode)): Path<(String, u32)>,
) -> Response {
    match blocking(library, move |library| library.episode_page_count(&id, episode)).await {
        Ok(page_count) => Json(EpisodeInfoResponse {
            episode,
            page_count,
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_page(
    State(library): State<GuardedLibrary>,
    Path((id, episode, page)): Path<(String, u32, u32)>,
) -> Response {
    match blocking(library, move |library| library.page_path(&id, episode, page)).await {
        Ok(path) => serve_image(path).await,
        Err(e) => e.into_response(),
    }
}

async fn delete_archive(
    State(library): State<GuardedLibrary>,
    Path(id): Path<String>,
) -> Response {
    match blocking(library, move |library| library.delete_archive(&id)).await {
        Ok(()) => Json(serde_json::json!({ "message": "deleted" })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn serve_image(path: PathBuf) -> Response {
    let buffer = match tokio::fs::read(&path).await {
        Ok(buffer) => buffer,
        Err(e) => {
            warn!("Failed to read {:?}: {}", path, e);
            return LibraryError::Io(e).into_response();
        }
    };

    let mime_type = infer::get(&buffer)
        .map(|kind| kind.mime_type())
        .unwrap_or("application/octet-stream");

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, mime_type.to_string())],
        buffer,
    )
        .into_response()
}

pub fn comic_routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(list_archives))
        .route("/{id}", get(get_archive).delete(delete_archive))
        .route("/{id}/cover", get(get_cover))
        .route("/{id}/{ep}/info", get(get_episode_info))
        .route("/{id}/{ep}/{page}", get(get_page))
}

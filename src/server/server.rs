use anyhow::{Context, Result};
use axum::{extract::State, middleware, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::info;

use super::comic_routes::comic_routes;
use super::download_routes::download_routes;
use super::log_requests;
use super::state::{GuardedDownloadManager, GuardedLibrary, ServerState};
use super::ServerConfig;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime: String,
    is_downloading: bool,
}

fn format_uptime(duration: Duration) -> String {
    let total = duration.as_secs();
    let days = total / 86400;
    let hours = (total % 86400) / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        uptime: format_uptime(state.start_time.elapsed()),
        is_downloading: state.download_manager.is_downloading(),
    })
}

pub fn make_app(
    config: ServerConfig,
    download_manager: GuardedDownloadManager,
    library: GuardedLibrary,
) -> Router {
    let state = ServerState::new(config, download_manager, library);

    let api_routes: Router<ServerState> = Router::new()
        .nest("/comics", comic_routes())
        .nest("/download", download_routes());

    Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the HTTP API until `shutdown` resolves.
pub async fn run_server(
    config: ServerConfig,
    download_manager: GuardedDownloadManager,
    library: GuardedLibrary,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let address = format!("{}:{}", config.host, config.port);
    let app = make_app(config, download_manager, library);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

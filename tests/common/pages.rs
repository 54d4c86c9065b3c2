//! Local image host standing in for a comic source.
//!
//! Routes:
//! - `GET /pages/{name}`: `PAGE_BODY_BYTES` bytes, except names starting with
//!   `fail` (500), `tiny` (`TINY_BODY_BYTES` bytes) or `flaky` (500 on the
//!   first request, then a normal page)
//! - `GET /cover.jpg`: a normal page

use super::constants::*;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

type Hits = Arc<Mutex<HashMap<String, usize>>>;

pub struct PageServer {
    pub base_url: String,
    hits: Hits,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

async fn serve_page(State(hits): State<Hits>, Path(name): Path<String>) -> Response {
    let count = {
        let mut hits = hits.lock().unwrap();
        let count = hits.entry(name.clone()).or_insert(0);
        *count += 1;
        *count
    };

    if name.starts_with("fail") {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    if name.starts_with("tiny") {
        return vec![7u8; TINY_BODY_BYTES].into_response();
    }
    if name.starts_with("flaky") && count == 1 {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    vec![1u8; PAGE_BODY_BYTES].into_response()
}

async fn serve_cover() -> Response {
    vec![2u8; PAGE_BODY_BYTES].into_response()
}

impl PageServer {
    pub async fn spawn() -> Self {
        let hits: Hits = Arc::new(Mutex::new(HashMap::new()));
        let app = Router::new()
            .route("/pages/{name}", get(serve_page))
            .route("/cover.jpg", get(serve_cover))
            .with_state(hits.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind page server");
        let port = listener.local_addr().expect("No local address").port();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Page server failed");
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            hits,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self, name: &str) -> String {
        format!("{}/pages/{}", self.base_url, name)
    }

    pub fn hits(&self, name: &str) -> usize {
        self.hits.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}

impl Drop for PageServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own download directory and
//! archive database. A server can also be started over the directory of a
//! previous one to exercise restarts.

use super::constants::*;
use comic_archive_server::config::DownloadManagerSettings;
use comic_archive_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use comic_archive_server::{ComicLibrary, DownloadManager, HttpPageFetcher, SqliteArchiveStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance backed by a temporary download directory.
///
/// When dropped, the server gracefully shuts down.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// Direct access to the archive database
    pub store: Arc<SqliteArchiveStore>,

    pub download_manager: Arc<DownloadManager>,

    root: Arc<TempDir>,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port over a fresh directory.
    pub async fn spawn() -> Self {
        let root = Arc::new(TempDir::new().expect("Failed to create temp dir"));
        Self::spawn_in(root).await
    }

    /// Spawns a server over an existing download directory. Unfinished tasks
    /// in its database are reloaded but not started.
    pub async fn spawn_in(root: Arc<TempDir>) -> Self {
        let store = Arc::new(
            SqliteArchiveStore::new(archive_db_path(root.path()))
                .expect("Failed to open archive store"),
        );
        let fetcher =
            Arc::new(HttpPageFetcher::new(REQUEST_TIMEOUT_SECS).expect("Failed to build fetcher"));
        let settings = DownloadManagerSettings {
            retry_delay_ms: TEST_RETRY_DELAY_MS,
            ..Default::default()
        };
        let download_manager = Arc::new(DownloadManager::new(
            store.clone(),
            fetcher,
            root.path().to_path_buf(),
            settings,
        ));
        download_manager
            .init()
            .expect("Failed to initialize download manager");
        let library = Arc::new(ComicLibrary::new(store.clone(), root.path().to_path_buf()));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            host: "127.0.0.1".to_string(),
            port,
        };
        let app = make_app(config, download_manager.clone(), library);

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            store,
            download_manager,
            root,
            _shutdown_tx: Some(shutdown_tx),
        };
        server.wait_for_ready().await;
        server
    }

    pub fn download_root(&self) -> &Path {
        self.root.path()
    }

    /// Shared handle on the download directory, for restarting over it.
    pub fn root_handle(&self) -> Arc<TempDir> {
        self.root.clone()
    }

    /// Waits until the download worker has stopped.
    pub async fn wait_until_idle(&self) {
        let start = std::time::Instant::now();
        while self.download_manager.is_downloading() {
            if start.elapsed() > Duration::from_millis(WORKER_IDLE_TIMEOUT_MS) {
                panic!("Download worker still running after {}ms", WORKER_IDLE_TIMEOUT_MS);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/health", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

pub fn archive_db_path(root: &Path) -> PathBuf {
    root.join("archive.db")
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

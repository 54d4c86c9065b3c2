//! Comic Archive Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod archive_store;
pub mod config;
pub mod descrambler;
pub mod download_manager;
pub mod library;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use archive_store::{ArchiveStore, SqliteArchiveStore};
pub use download_manager::{DownloadManager, DownloadRequest, HttpPageFetcher, PageFetcher};
pub use library::ComicLibrary;
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerConfig};

//! Download Manager module
//!
//! Provides a FIFO queue of comic downloads executed by a single background
//! worker, with crash recovery and per-page retries.

mod error;
mod executor;
mod fetcher;
mod headers;
mod layout;
mod manager;
mod models;
mod retry_policy;

pub use error::{DownloadManagerError, FetchError, TaskError};
pub use executor::default_episode_name;
pub use fetcher::{fetch_with_retry, HttpPageFetcher, PageFetcher};
pub use headers::{headers_for_source, resolve_episode_headers};
pub use layout::{
    allocate_directory, directory_size, extension_from_url, is_image_file, page_file_name,
    sanitize_folder_name, IMAGE_EXTENSIONS,
};
pub use manager::DownloadManager;
pub use models::*;
pub use retry_policy::RetryPolicy;

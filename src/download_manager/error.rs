use thiserror::Error;

/// Errors returned by [`super::DownloadManager`] entry points.
#[derive(Debug, Error)]
pub enum DownloadManagerError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("A download is already running")]
    AlreadyRunning,

    #[error("The download queue is empty")]
    QueueEmpty,

    #[error("Persistence error: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

/// Failure of a single fetch attempt or of a whole fetch after retries.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unexpected status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Body of {url} too small: {size} bytes (min: {min})")]
    BodyTooSmall { url: String, size: u64, min: u64 },

    #[error("Giving up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

/// Reason a task ended in the error state. Recorded on the task, never
/// propagated to callers.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task is not in direct-fetch mode")]
    NotDirectMode,

    #[error("Episode {episode} page {page}: {source}")]
    PageFetch {
        episode: u32,
        page: usize,
        #[source]
        source: FetchError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Persistence error: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

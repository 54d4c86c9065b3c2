//! Shared constants for end-to-end tests

/// Timeout for a single HTTP request made by the test client
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// How long to wait for a server to answer its health check
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Interval between readiness polls
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

/// How long to wait for the download worker to go idle
pub const WORKER_IDLE_TIMEOUT_MS: u64 = 10000;

/// Retry delay unit used by test servers, kept short so failures resolve fast
pub const TEST_RETRY_DELAY_MS: u64 = 10;

/// Size of the bodies served for good pages, above the minimum page size
pub const PAGE_BODY_BYTES: usize = 256;

/// Size of the bodies served for undersized pages
pub const TINY_BODY_BYTES: usize = 10;

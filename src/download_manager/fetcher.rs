//! HTTP fetching of page and cover images.

use super::error::FetchError;
use super::retry_policy::RetryPolicy;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Fetches one remote image. A single call is a single attempt; retries are
/// layered on top by [`fetch_with_retry`].
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, headers: &HashMap<String, String>)
        -> Result<Vec<u8>, FetchError>;
}

pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Vec<u8>, FetchError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;
        Ok(body.to_vec())
    }
}

/// Fetches `url`, treating bodies under `min_bytes` as failures, and retries
/// with linear backoff until the policy gives up.
pub async fn fetch_with_retry(
    fetcher: &dyn PageFetcher,
    policy: &RetryPolicy,
    min_bytes: u64,
    url: &str,
    headers: &HashMap<String, String>,
) -> Result<Vec<u8>, FetchError> {
    let mut attempt = 1;
    loop {
        let result = fetcher.fetch(url, headers).await.and_then(|body| {
            if (body.len() as u64) < min_bytes {
                Err(FetchError::BodyTooSmall {
                    url: url.to_string(),
                    size: body.len() as u64,
                    min: min_bytes,
                })
            } else {
                Ok(body)
            }
        });

        match result {
            Ok(body) => {
                debug!("Fetched {} ({} bytes)", url, body.len());
                return Ok(body);
            }
            Err(e) if policy.should_retry(attempt) => {
                let wait = policy.backoff(attempt);
                warn!(
                    "Fetch of {} failed (attempt {}/{}), retrying in {:?}: {}",
                    url, attempt, policy.max_attempts, wait, e
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(FetchError::Exhausted {
                    attempts: attempt,
                    last: Box::new(e),
                })
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::FakeFetcher;
    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay_unit: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn returns_body_on_first_success() {
        let fetcher = FakeFetcher::default();
        fetcher.serve("http://x/1", vec![1; 150]);

        let body = fetch_with_retry(&fetcher, &fast_policy(), 100, "http://x/1", &HashMap::new())
            .await
            .unwrap();

        assert_eq!(body.len(), 150);
        assert_eq!(fetcher.call_count("http://x/1"), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let fetcher = FakeFetcher::default();
        fetcher.serve_sequence("http://x/1", vec![Err(500), Err(502), Ok(vec![1; 200])]);

        let body = fetch_with_retry(&fetcher, &fast_policy(), 100, "http://x/1", &HashMap::new())
            .await
            .unwrap();

        assert_eq!(body.len(), 200);
        assert_eq!(fetcher.call_count("http://x/1"), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let fetcher = FakeFetcher::default();
        fetcher.serve_sequence("http://x/1", vec![Err(500)]);

        let err = fetch_with_retry(&fetcher, &fast_policy(), 100, "http://x/1", &HashMap::new())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Exhausted { attempts: 3, .. }));
        assert!(err.to_string().contains("500"));
        assert_eq!(fetcher.call_count("http://x/1"), 3);
    }

    #[tokio::test]
    async fn small_bodies_count_as_failures() {
        let fetcher = FakeFetcher::default();
        fetcher.serve("http://x/1", vec![1; 99]);

        let err = fetch_with_retry(&fetcher, &fast_policy(), 100, "http://x/1", &HashMap::new())
            .await
            .unwrap_err();

        match err {
            FetchError::Exhausted { last, .. } => {
                assert!(matches!(*last, FetchError::BodyTooSmall { size: 99, .. }))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn headers_are_passed_through() {
        let fetcher = FakeFetcher::default();
        fetcher.serve("http://x/1", vec![1; 100]);
        let mut headers = HashMap::new();
        headers.insert("Referer".to_string(), "https://ref/".to_string());

        fetch_with_retry(&fetcher, &fast_policy(), 100, "http://x/1", &headers)
            .await
            .unwrap();

        assert_eq!(fetcher.seen_headers.lock().unwrap()[0]["Referer"], "https://ref/");
    }
}

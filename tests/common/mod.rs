//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{PageServer, TestClient, TestServer};
//!
//! #[tokio::test]
//! async fn test_health() {
//!     let server = TestServer::spawn().await;
//!     let client = TestClient::new(server.base_url.clone());
//!
//!     assert!(client.health().await.status().is_success());
//! }
//! ```

mod client;
mod constants;
mod pages;
mod server;

pub use client::TestClient;
pub use constants::*;
pub use pages::PageServer;
#[allow(unused_imports)]
pub use server::{archive_db_path, TestServer};

use serde_json::{json, Value};

/// JSON body of a direct download with one episode per entry of
/// `episodes`, each listing its page URLs.
#[allow(dead_code)]
pub fn direct_request(comic_id: &str, title: &str, episodes: &[Vec<String>]) -> Value {
    let episodes: Vec<Value> = episodes
        .iter()
        .enumerate()
        .map(|(index, urls)| {
            json!({
                "order": index + 1,
                "name": format!("Chapter {}", index + 1),
                "page_urls": urls,
            })
        })
        .collect();
    json!({
        "comic_id": comic_id,
        "type": "jm",
        "title": title,
        "author": "Test Author",
        "description": "A test comic",
        "tags": { "category": ["Action"], "tags": ["Robots"] },
        "episodes": episodes,
    })
}

//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per endpoint. When API routes or request
//! formats change, update only this file.

use super::constants::*;
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use serde_json::Value;
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn health(&self) -> Response {
        self.client
            .get(self.url("/health"))
            .send()
            .await
            .expect("Health request failed")
    }

    // ---------------------------------------------------------------------
    // Downloads
    // ---------------------------------------------------------------------

    pub async fn submit_direct(&self, body: &Value) -> Response {
        self.client
            .post(self.url("/api/download/direct"))
            .json(body)
            .send()
            .await
            .expect("Submit request failed")
    }

    pub async fn get_queue(&self) -> Response {
        self.client
            .get(self.url("/api/download/queue"))
            .send()
            .await
            .expect("Queue request failed")
    }

    pub async fn start(&self) -> Response {
        self.client
            .post(self.url("/api/download/start"))
            .send()
            .await
            .expect("Start request failed")
    }

    pub async fn pause(&self) -> Response {
        self.client
            .post(self.url("/api/download/pause"))
            .send()
            .await
            .expect("Pause request failed")
    }

    pub async fn cancel(&self, task_id: &str) -> Response {
        self.client
            .delete(self.url(&format!("/api/download/{}", task_id)))
            .send()
            .await
            .expect("Cancel request failed")
    }

    /// Uploads `files` as `(file name, bytes)` pairs along with text fields.
    pub async fn import(&self, fields: &[(&str, &str)], files: Vec<(&str, Vec<u8>)>) -> Response {
        let mut form = Form::new();
        for (name, value) in fields {
            form = form.text(name.to_string(), value.to_string());
        }
        for (file_name, data) in files {
            form = form.part("files", Part::bytes(data).file_name(file_name.to_string()));
        }
        self.client
            .post(self.url("/api/download/import"))
            .multipart(form)
            .send()
            .await
            .expect("Import request failed")
    }

    // ---------------------------------------------------------------------
    // Archives
    // ---------------------------------------------------------------------

    pub async fn list_comics(&self) -> Response {
        self.client
            .get(self.url("/api/comics"))
            .send()
            .await
            .expect("List request failed")
    }

    pub async fn get_comic(&self, id: &str) -> Response {
        self.client
            .get(self.url(&format!("/api/comics/{}", id)))
            .send()
            .await
            .expect("Comic request failed")
    }

    pub async fn get_cover(&self, id: &str) -> Response {
        self.client
            .get(self.url(&format!("/api/comics/{}/cover", id)))
            .send()
            .await
            .expect("Cover request failed")
    }

    pub async fn get_episode_info(&self, id: &str, episode: u32) -> Response {
        self.client
            .get(self.url(&format!("/api/comics/{}/{}/info", id, episode)))
            .send()
            .await
            .expect("Episode info request failed")
    }

    pub async fn get_page(&self, id: &str, episode: u32, page: u32) -> Response {
        self.client
            .get(self.url(&format!("/api/comics/{}/{}/{}", id, episode, page)))
            .send()
            .await
            .expect("Page request failed")
    }

    pub async fn delete_comic(&self, id: &str) -> Response {
        self.client
            .delete(self.url(&format!("/api/comics/{}", id)))
            .send()
            .await
            .expect("Delete request failed")
    }
}

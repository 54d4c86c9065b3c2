//! Request and response shapes of the download manager.

use crate::archive_store::{DownloadTask, EpisodeDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A request to fetch a whole comic from already resolved page URLs.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DownloadRequest {
    pub comic_id: String,
    /// Source type tag, e.g. "jm" or "picacg".
    #[serde(rename = "type", default)]
    pub source_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub detail_url: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub episodes: Vec<EpisodeDescriptor>,
}

/// Snapshot of the live queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub queue: Vec<DownloadTask>,
    pub total: usize,
    pub is_downloading: bool,
}

//! Records persisted in the archive database.
//!
//! Defines download tasks, their payload and statuses, and comic archives.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Lifecycle status of a download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Downloading,
    Paused,
    Completed, // terminal
    Error,     // terminal
}

impl TaskStatus {
    /// Returns true if this is a terminal state (Completed or Error).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "downloading" => Some(TaskStatus::Downloading),
            "paused" => Some(TaskStatus::Paused),
            "completed" => Some(TaskStatus::Completed),
            "error" => Some(TaskStatus::Error),
            _ => None,
        }
    }
}

/// Parameters needed to undo the band scrambling of an episode's pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescrambleParams {
    #[serde(rename = "epsId", deserialize_with = "number_or_numeric_string")]
    pub episode_id: u64,
    #[serde(rename = "scrambleId", deserialize_with = "number_or_numeric_string")]
    pub scramble_threshold_id: u64,
}

fn number_or_numeric_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// One ordered group of pages inside a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeDescriptor {
    /// 1-based position of the episode within the comic.
    pub order: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub page_urls: Vec<String>,
    /// Overrides the per-source default headers when non-empty.
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub descramble_params: Option<DescrambleParams>,
}

/// Opaque per-task data stored as JSON next to the task row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    #[serde(default)]
    pub direct_mode: bool,
    #[serde(default)]
    pub detail_url: Option<String>,
    #[serde(default)]
    pub episodes: Vec<EpisodeDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadTask {
    pub id: String,
    pub comic_id: String,
    pub source_type: String,
    pub title: String,
    pub cover: String,
    pub author: String,
    pub description: String,
    /// Tag lists keyed by category name.
    pub tags: BTreeMap<String, Vec<String>>,
    pub status: TaskStatus,
    pub total_pages: u32,
    pub downloaded_pages: u32,
    pub current_episode_order: u32,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip)]
    pub payload: TaskPayload,
}

/// A materialized comic inside the download root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub id: String,
    pub title: String,
    pub author: String,
    pub description: String,
    pub cover: String,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    pub episode_count: u32,
    pub page_count: u32,
    pub source_type: String,
    pub created_at: i64,
    pub size_bytes: u64,
    /// Directory name relative to the download root. Unique across archives.
    pub directory: String,
    pub episodes: Vec<String>,
    pub downloaded_episodes: Vec<u32>,
    pub detail_url: Option<String>,
}

/// Splits a category-keyed tag map into a flat tag list and a category list.
///
/// Every value lands in the tag list; values under `category` or
/// `categories` are also promoted to categories.
pub fn flatten_tags(tags: &BTreeMap<String, Vec<String>>) -> (Vec<String>, Vec<String>) {
    let mut all_tags = Vec::new();
    let mut categories = Vec::new();
    for (key, values) in tags {
        if key == "category" || key == "categories" {
            categories.extend(values.iter().cloned());
        }
        all_tags.extend(values.iter().cloned());
    }
    (all_tags, categories)
}

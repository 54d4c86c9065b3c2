//! Import of archives a client already downloaded and uploads as files.

use super::LibraryError;
use crate::archive_store::{flatten_tags, ArchiveRecord, ArchiveStore};
use super::reconciler::episode_orders;
use crate::download_manager::{
    allocate_directory, default_episode_name, directory_size, is_image_file,
};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Metadata sent along with the uploaded files.
#[derive(Debug, Clone, Default)]
pub struct ImportRequest {
    pub comic_id: String,
    pub title: String,
    pub source_type: String,
    pub author: String,
    pub description: String,
    pub cover: String,
    /// JSON object of tag lists keyed by category.
    pub tags: Option<String>,
    /// JSON array of episode names, in ascending episode order.
    pub episode_names: Option<String>,
    /// RFC 3339 time the client finished the download.
    pub download_time: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub data: Vec<u8>,
}

/// Where an uploaded file belongs inside the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadTarget {
    Cover { extension: String },
    Page { episode: u32, page: u32, extension: String },
}

fn page_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^ep(\d+)_page(\d+)\.(jpg|jpeg|png|webp|gif)$").expect("valid page pattern")
    })
}

fn cover_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^cover\.(jpg|jpeg|png|webp|gif)$").expect("valid cover pattern"))
}

/// Classifies an uploaded file name: `ep<N>_page<PPP>.<ext>` or `cover.<ext>`.
pub fn parse_upload_name(file_name: &str) -> Option<UploadTarget> {
    let lower = file_name.to_ascii_lowercase();
    if let Some(caps) = cover_pattern().captures(&lower) {
        return Some(UploadTarget::Cover {
            extension: caps[1].to_string(),
        });
    }
    let caps = page_pattern().captures(&lower)?;
    Some(UploadTarget::Page {
        episode: caps[1].parse().ok()?,
        page: caps[2].parse().ok()?,
        extension: caps[3].to_string(),
    })
}

fn parse_tags(tags: Option<&str>) -> BTreeMap<String, Vec<String>> {
    match tags.map(str::trim).filter(|t| !t.is_empty()) {
        Some(text) => serde_json::from_str(text).unwrap_or_else(|e| {
            warn!("Ignoring unparsable tags: {}", e);
            BTreeMap::new()
        }),
        None => BTreeMap::new(),
    }
}

fn episode_names(names: Option<&str>, orders: &[u32]) -> Vec<String> {
    let parsed = names
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .and_then(|text| match serde_json::from_str::<Vec<String>>(text) {
            Ok(names) => Some(names),
            Err(e) => {
                warn!("Ignoring unparsable episode names: {}", e);
                None
            }
        });
    parsed.unwrap_or_else(|| orders.iter().map(|o| default_episode_name(*o)).collect())
}

fn download_timestamp(download_time: Option<&str>) -> i64 {
    download_time
        .and_then(|t| chrono::DateTime::parse_from_rfc3339(t.trim()).ok())
        .map(|t| t.timestamp())
        .unwrap_or_else(|| chrono::Utc::now().timestamp())
}

/// Writes the uploaded files into a new archive directory under `root` and
/// stores the archive record.
pub async fn import_archive(
    store: &dyn ArchiveStore,
    root: &Path,
    request: ImportRequest,
    files: Vec<UploadedFile>,
) -> Result<ArchiveRecord, LibraryError> {
    for (field, value) in [
        ("comic_id", &request.comic_id),
        ("title", &request.title),
        ("type", &request.source_type),
    ] {
        if value.trim().is_empty() {
            return Err(LibraryError::Validation(format!("{} is required", field)));
        }
    }
    if files.is_empty() {
        return Err(LibraryError::Validation("no files uploaded".to_string()));
    }

    tokio::fs::create_dir_all(root).await?;
    // Re-imports land in the directory the stored record already claims
    let (directory, archive_dir) = match store.get_archive(&request.comic_id)? {
        Some(existing) => {
            let path = root.join(&existing.directory);
            tokio::fs::create_dir_all(&path).await?;
            (existing.directory, path)
        }
        None => {
            let reserved = store.archive_directories()?;
            allocate_directory(root, &request.title, &reserved)?
        }
    };
    info!(
        "Importing \"{}\" ({} files) into {:?}",
        request.title,
        files.len(),
        archive_dir
    );

    let mut saved_pages = 0u32;
    for file in files {
        match parse_upload_name(&file.file_name) {
            Some(UploadTarget::Cover { extension }) => {
                let path = archive_dir.join(format!("cover.{}", extension));
                if let Err(e) = tokio::fs::write(&path, &file.data).await {
                    warn!("Failed to save cover {:?}: {}", path, e);
                }
            }
            Some(UploadTarget::Page {
                episode,
                page,
                extension,
            }) => {
                let episode_dir = archive_dir.join(episode.to_string());
                tokio::fs::create_dir_all(&episode_dir).await?;
                let path = episode_dir.join(format!("{:03}.{}", page, extension));
                tokio::fs::write(&path, &file.data).await?;
                debug!("Saved {:?}", path);
                saved_pages += 1;
            }
            None => warn!("Skipping upload with unrecognised name: {}", file.file_name),
        }
    }

    // Episodes and pages are counted from disk so earlier imports are included
    let scan_root = archive_dir.clone();
    let (orders, page_count, size_bytes) = tokio::task::spawn_blocking(move || {
        let orders = episode_orders(&scan_root);
        let page_count = count_pages(&scan_root, &orders);
        (orders, page_count, directory_size(&scan_root))
    })
    .await
    .map_err(|e| LibraryError::Io(std::io::Error::other(e)))?;

    let (tags, categories) = flatten_tags(&parse_tags(request.tags.as_deref()));
    let record = ArchiveRecord {
        id: request.comic_id,
        title: request.title,
        author: request.author,
        description: request.description,
        cover: request.cover,
        tags,
        categories,
        episode_count: orders.len() as u32,
        page_count,
        source_type: request.source_type,
        created_at: download_timestamp(request.download_time.as_deref()),
        size_bytes,
        directory,
        episodes: episode_names(request.episode_names.as_deref(), &orders),
        downloaded_episodes: orders,
        detail_url: None,
    };
    store.upsert_archive(&record)?;
    let stored = store
        .get_archive(&record.id)?
        .ok_or_else(|| LibraryError::NotFound(format!("archive {}", record.id)))?;

    info!(
        "Imported \"{}\" ({} new pages): {} episodes, {} pages in {}",
        stored.title, saved_pages, stored.episode_count, stored.page_count, stored.directory
    );
    Ok(stored)
}

fn count_pages(archive_dir: &Path, orders: &[u32]) -> u32 {
    orders
        .iter()
        .filter_map(|order| std::fs::read_dir(archive_dir.join(order.to_string())).ok())
        .flat_map(|entries| entries.filter_map(|entry| entry.ok()))
        .filter(|entry| entry.path().is_file() && is_image_file(&entry.path()))
        .count() as u32
}

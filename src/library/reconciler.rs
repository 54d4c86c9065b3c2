//! Merges archive records from the store with directories found on disk.
//!
//! Directories under the download root that have no stored record get a
//! synthesized one. Synthesized records are never written back.

use crate::archive_store::ArchiveRecord;
use crate::download_manager::{default_episode_name, directory_size};
use md5::{Digest, Md5};
use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

pub const SCANNED_ID_PREFIX: &str = "scanned_";
pub const SCANNED_AUTHOR: &str = "Unknown";
pub const SCANNED_SOURCE_TYPE: &str = "local";

/// Stable id for a directory without a stored record: the prefix followed by
/// the hex of the first 8 bytes of MD5(directory name).
pub fn scanned_archive_id(directory_name: &str) -> String {
    let digest = Md5::digest(directory_name.as_bytes());
    let hex: String = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}{}", SCANNED_ID_PREFIX, hex)
}

/// Numerically named subdirectories of `path`, ascending.
pub fn episode_orders(path: &Path) -> Vec<u32> {
    let mut orders: Vec<u32> = match std::fs::read_dir(path) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
            .collect(),
        Err(_) => Vec::new(),
    };
    orders.sort_unstable();
    orders.dedup();
    orders
}

/// Builds a record describing `<root>/<directory_name>` from what is on disk.
pub fn synthesize_record(root: &Path, directory_name: &str) -> io::Result<ArchiveRecord> {
    let path = root.join(directory_name);
    let metadata = std::fs::metadata(&path)?;
    let created_at = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or_else(|| chrono::Utc::now().timestamp());

    let orders = episode_orders(&path);

    Ok(ArchiveRecord {
        id: scanned_archive_id(directory_name),
        title: directory_name.to_string(),
        author: SCANNED_AUTHOR.to_string(),
        description: String::new(),
        cover: String::new(),
        tags: Vec::new(),
        categories: Vec::new(),
        episode_count: orders.len() as u32,
        // Resolved per episode when reading
        page_count: 0,
        source_type: SCANNED_SOURCE_TYPE.to_string(),
        created_at,
        size_bytes: directory_size(&path),
        directory: directory_name.to_string(),
        episodes: orders.iter().map(|o| default_episode_name(*o)).collect(),
        downloaded_episodes: orders,
        detail_url: None,
    })
}

/// Stored records plus a synthesized record for each unknown directory under
/// `root`, newest first. An unreadable root yields the stored records only.
pub fn reconcile(root: &Path, stored: Vec<ArchiveRecord>) -> Vec<ArchiveRecord> {
    let known: HashSet<String> = stored.iter().map(|r| r.directory.clone()).collect();
    let mut records = stored;

    match std::fs::read_dir(root) {
        Ok(entries) => {
            for entry in entries.filter_map(|e| e.ok()) {
                if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    continue;
                }
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    warn!("Skipping directory with non UTF-8 name: {:?}", entry.path());
                    continue;
                };
                if known.contains(&name) {
                    continue;
                }
                match synthesize_record(root, &name) {
                    Ok(record) => {
                        debug!("Found untracked archive directory {}", name);
                        records.push(record);
                    }
                    Err(e) => warn!("Failed to scan directory {:?}: {}", entry.path(), e),
                }
            }
        }
        Err(e) => warn!("Failed to list download directory {:?}: {}", root, e),
    }

    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    records
}

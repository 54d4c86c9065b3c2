//! Read access to downloaded archives, combining the archive store with
//! what is actually present under the download root.

mod importer;
mod reconciler;

pub use importer::{import_archive, parse_upload_name, ImportRequest, UploadTarget, UploadedFile};
pub use reconciler::{reconcile, scanned_archive_id, synthesize_record};

use crate::archive_store::{ArchiveRecord, ArchiveStore};
use crate::download_manager::is_image_file;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

const COVER_STEM: &str = "cover";
const COVER_EXTENSIONS: &[&str] = &["jpg", "png", "webp", "jpeg", "gif"];

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Persistence error: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

pub struct ComicLibrary {
    store: Arc<dyn ArchiveStore>,
    download_root: PathBuf,
}

impl ComicLibrary {
    pub fn new(store: Arc<dyn ArchiveStore>, download_root: PathBuf) -> Self {
        Self {
            store,
            download_root,
        }
    }

    pub fn download_root(&self) -> &Path {
        &self.download_root
    }

    /// All archives, stored or found on disk, newest first.
    pub fn list_archives(&self) -> Result<Vec<ArchiveRecord>, LibraryError> {
        let stored = self.store.list_archives()?;
        Ok(reconcile(&self.download_root, stored))
    }

    pub fn get_archive(&self, id: &str) -> Result<ArchiveRecord, LibraryError> {
        if let Some(record) = self.store.get_archive(id)? {
            return Ok(record);
        }
        self.list_archives()?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| LibraryError::NotFound(format!("archive {}", id)))
    }

    pub fn cover_path(&self, id: &str) -> Result<PathBuf, LibraryError> {
        let dir = self.archive_dir(id)?;
        COVER_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{}.{}", COVER_STEM, ext)))
            .find(|path| path.is_file())
            .ok_or_else(|| LibraryError::NotFound(format!("cover of {}", id)))
    }

    /// Number of page images in episode `episode`. Episode 0 stands for
    /// archives whose pages sit directly in the archive directory.
    pub fn episode_page_count(&self, id: &str, episode: u32) -> Result<usize, LibraryError> {
        let dir = self.episode_dir(id, episode)?;
        let count = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_image_file(path) && !is_cover(path))
            .count();
        Ok(count)
    }

    /// Path of the 1-based `page` of an episode. Page files may be named
    /// `001`, `1` or `01`.
    pub fn page_path(&self, id: &str, episode: u32, page: u32) -> Result<PathBuf, LibraryError> {
        let dir = self.episode_dir(id, episode)?;
        let stems = [format!("{:03}", page), page.to_string(), format!("{:02}", page)];

        let entries: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();

        stems
            .iter()
            .find_map(|stem| {
                entries
                    .iter()
                    .find(|path| path.file_stem().and_then(|s| s.to_str()) == Some(stem.as_str()))
                    .cloned()
            })
            .ok_or_else(|| {
                LibraryError::NotFound(format!("page {} of episode {} of {}", page, episode, id))
            })
    }

    /// Removes the archive's directory and its stored record.
    pub fn delete_archive(&self, id: &str) -> Result<(), LibraryError> {
        let record = self.get_archive(id)?;
        let dir = self.download_root.join(&record.directory);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        self.store.delete_archive(id)?;
        info!("Deleted archive {} ({:?})", id, dir);
        Ok(())
    }

    pub async fn import(
        &self,
        request: ImportRequest,
        files: Vec<UploadedFile>,
    ) -> Result<ArchiveRecord, LibraryError> {
        import_archive(self.store.as_ref(), &self.download_root, request, files).await
    }

    fn archive_dir(&self, id: &str) -> Result<PathBuf, LibraryError> {
        let record = self.get_archive(id)?;
        Ok(self.download_root.join(record.directory))
    }

    fn episode_dir(&self, id: &str, episode: u32) -> Result<PathBuf, LibraryError> {
        let archive_dir = self.archive_dir(id)?;
        let dir = if episode == 0 {
            archive_dir
        } else {
            archive_dir.join(episode.to_string())
        };
        if !dir.is_dir() {
            return Err(LibraryError::NotFound(format!(
                "episode {} of {}",
                episode, id
            )));
        }
        Ok(dir)
    }
}

fn is_cover(path: &Path) -> bool {
    path.file_stem().and_then(|s| s.to_str()) == Some(COVER_STEM)
}

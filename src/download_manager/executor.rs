//! Runs one download task from page URLs to a stored archive.

use super::error::TaskError;
use super::fetcher::{fetch_with_retry, PageFetcher};
use super::headers::{headers_for_source, resolve_episode_headers};
use super::layout::{allocate_directory, directory_size, extension_from_url, page_file_name};
use super::retry_policy::RetryPolicy;
use crate::archive_store::{flatten_tags, ArchiveRecord, ArchiveStore, DownloadTask, EpisodeDescriptor};
use crate::config::{DownloadManagerSettings, FailedDirectoryPolicy};
use crate::descrambler::{descramble_file, image_base_name};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name given to an episode that arrives without one.
pub fn default_episode_name(order: u32) -> String {
    format!("Episode {}", order)
}

pub(crate) struct TaskExecutor {
    store: Arc<dyn ArchiveStore>,
    fetcher: Arc<dyn PageFetcher>,
    download_root: PathBuf,
    retry_policy: RetryPolicy,
    min_page_bytes: u64,
    failed_directory_policy: FailedDirectoryPolicy,
}

/// Where a task's files go, and whether this run created the directory.
struct TargetDirectory {
    name: String,
    path: PathBuf,
    created: bool,
}

impl TaskExecutor {
    pub fn new(
        store: Arc<dyn ArchiveStore>,
        fetcher: Arc<dyn PageFetcher>,
        download_root: PathBuf,
        settings: &DownloadManagerSettings,
    ) -> Self {
        Self {
            store,
            fetcher,
            download_root,
            retry_policy: RetryPolicy::new(settings),
            min_page_bytes: settings.min_page_bytes,
            failed_directory_policy: settings.failed_directory_policy,
        }
    }

    /// Downloads every page of `task` and stores the resulting archive.
    /// `on_progress` is called with `(downloaded_pages, episode_order)` after
    /// each page is written and persisted.
    pub async fn execute(
        &self,
        task: &DownloadTask,
        on_progress: &(dyn Fn(u32, u32) + Send + Sync),
    ) -> Result<(), TaskError> {
        if !task.payload.direct_mode {
            return Err(TaskError::NotDirectMode);
        }

        let target = self.target_directory(task)?;
        info!(
            "Downloading \"{}\" ({} pages) into {:?}",
            task.title, task.total_pages, target.path
        );

        let result = self.download_into(task, &target, on_progress).await;

        if result.is_err()
            && target.created
            && self.failed_directory_policy == FailedDirectoryPolicy::Remove
        {
            if let Err(e) = tokio::fs::remove_dir_all(&target.path).await {
                warn!("Failed to remove directory {:?} of failed task: {}", target.path, e);
            }
        }
        result
    }

    /// Reuses the directory of an existing archive for the same comic, so a
    /// record's directory never changes; otherwise allocates a fresh one that
    /// no stored archive claims.
    fn target_directory(&self, task: &DownloadTask) -> Result<TargetDirectory, TaskError> {
        if let Some(existing) = self.store.get_archive(&task.comic_id)? {
            let path = self.download_root.join(&existing.directory);
            let created = !path.is_dir();
            if created {
                std::fs::create_dir_all(&path)?;
            }
            return Ok(TargetDirectory {
                name: existing.directory,
                path,
                created,
            });
        }

        let reserved = self.store.archive_directories()?;
        let (name, path) = allocate_directory(&self.download_root, &task.title, &reserved)?;
        Ok(TargetDirectory {
            name,
            path,
            created: true,
        })
    }

    async fn download_into(
        &self,
        task: &DownloadTask,
        target: &TargetDirectory,
        on_progress: &(dyn Fn(u32, u32) + Send + Sync),
    ) -> Result<(), TaskError> {
        let source_headers = headers_for_source(&task.source_type);

        if !task.cover.is_empty() {
            let cover_path = target
                .path
                .join(format!("cover.{}", extension_from_url(&task.cover)));
            match fetch_with_retry(
                self.fetcher.as_ref(),
                &self.retry_policy,
                1,
                &task.cover,
                &source_headers,
            )
            .await
            {
                Ok(bytes) => {
                    if let Err(e) = tokio::fs::write(&cover_path, bytes).await {
                        warn!("Cover of \"{}\" could not be saved: {}", task.title, e);
                    }
                }
                Err(e) => warn!("Cover of \"{}\" could not be fetched: {}", task.title, e),
            }
        }

        let mut episodes: Vec<&EpisodeDescriptor> = task.payload.episodes.iter().collect();
        episodes.sort_by_key(|ep| ep.order);

        let mut downloaded_pages = 0u32;
        for episode in &episodes {
            let episode_dir = target.path.join(episode.order.to_string());
            tokio::fs::create_dir_all(&episode_dir).await?;
            let headers = resolve_episode_headers(&source_headers, episode.headers.as_ref());

            debug!(
                "Episode {} ({}) has {} pages",
                episode.order,
                episode.name,
                episode.page_urls.len()
            );

            for (index, url) in episode.page_urls.iter().enumerate() {
                let page = index + 1;
                let bytes = fetch_with_retry(
                    self.fetcher.as_ref(),
                    &self.retry_policy,
                    self.min_page_bytes,
                    url,
                    &headers,
                )
                .await
                .map_err(|source| TaskError::PageFetch {
                    episode: episode.order,
                    page,
                    source,
                })?;

                let page_path = episode_dir.join(page_file_name(page, extension_from_url(url)));
                tokio::fs::write(&page_path, &bytes).await?;

                if let Some(params) = episode.descramble_params {
                    descramble_page(page_path, url, params.episode_id, params.scramble_threshold_id)
                        .await;
                }

                downloaded_pages += 1;
                self.store
                    .update_task_progress(&task.id, downloaded_pages, episode.order)?;
                on_progress(downloaded_pages, episode.order);
            }

            if let Err(e) = self
                .store
                .append_downloaded_episode(&task.comic_id, episode.order)
            {
                warn!(
                    "Failed to record episode {} of {}: {:#}",
                    episode.order, task.comic_id, e
                );
            }
        }

        let (tags, categories) = flatten_tags(&task.tags);
        let root = target.path.clone();
        let size_bytes = tokio::task::spawn_blocking(move || directory_size(&root))
            .await
            .unwrap_or(0);

        let record = ArchiveRecord {
            id: task.comic_id.clone(),
            title: task.title.clone(),
            author: task.author.clone(),
            description: task.description.clone(),
            cover: task.cover.clone(),
            tags,
            categories,
            episode_count: episodes.len() as u32,
            page_count: task.total_pages,
            source_type: task.source_type.clone(),
            created_at: chrono::Utc::now().timestamp(),
            size_bytes,
            directory: target.name.clone(),
            episodes: episodes
                .iter()
                .map(|ep| {
                    if ep.name.is_empty() {
                        default_episode_name(ep.order)
                    } else {
                        ep.name.clone()
                    }
                })
                .collect(),
            downloaded_episodes: episodes.iter().map(|ep| ep.order).collect(),
            detail_url: task.payload.detail_url.clone(),
        };
        self.store.upsert_archive(&record)?;

        info!(
            "Archived \"{}\" as {} ({} bytes)",
            task.title, record.directory, record.size_bytes
        );
        Ok(())
    }
}

/// Descrambling is CPU bound and its failure keeps the page as downloaded.
async fn descramble_page(path: PathBuf, url: &str, episode_id: u64, threshold_id: u64) {
    let base_name = image_base_name(url);
    let display_path = path.clone();
    let result = tokio::task::spawn_blocking(move || {
        descramble_file(Path::new(&path), episode_id, threshold_id, &base_name)
    })
    .await;

    match result {
        Ok(Ok(true)) => debug!("Descrambled {:?}", display_path),
        Ok(Ok(false)) => {}
        Ok(Err(e)) => warn!("Keeping scrambled page {:?}: {}", display_path, e),
        Err(e) => warn!("Descrambling {:?} did not complete: {}", display_path, e),
    }
}

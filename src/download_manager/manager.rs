//! Download manager: FIFO queue of download tasks drained by one worker.
//!
//! All entry points serialize through a single mutex guarding the live queue
//! and the worker flags. The lock is never held across an await point.

use super::error::DownloadManagerError;
use super::executor::TaskExecutor;
use super::fetcher::PageFetcher;
use super::models::{DownloadRequest, QueueSnapshot};
use crate::archive_store::{ArchiveStore, DownloadTask, TaskPayload, TaskStatus};
use crate::config::DownloadManagerSettings;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const DEFAULT_TITLE: &str = "Untitled";

#[derive(Default)]
struct QueueState {
    queue: VecDeque<DownloadTask>,
    worker_running: bool,
    pause_requested: bool,
    worker: Option<JoinHandle<()>>,
}

impl QueueState {
    fn queued_task_for_comic(&self, comic_id: &str) -> Option<String> {
        self.queue
            .iter()
            .find(|t| t.comic_id == comic_id && !t.status.is_terminal())
            .map(|t| t.id.clone())
    }
}

/// Episode orders name the episode directories, so they must be positive and
/// distinct.
fn validate_request(request: &DownloadRequest) -> Result<(), DownloadManagerError> {
    if request.comic_id.trim().is_empty() {
        return Err(DownloadManagerError::Validation(
            "comic_id is required".to_string(),
        ));
    }
    if request.episodes.is_empty() {
        return Err(DownloadManagerError::Validation(
            "at least one episode is required".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for episode in &request.episodes {
        if episode.order == 0 {
            return Err(DownloadManagerError::Validation(
                "episode order must be at least 1".to_string(),
            ));
        }
        if !seen.insert(episode.order) {
            return Err(DownloadManagerError::Validation(format!(
                "duplicate episode order {}",
                episode.order
            )));
        }
    }
    Ok(())
}

pub struct DownloadManager {
    store: Arc<dyn ArchiveStore>,
    download_root: PathBuf,
    executor: TaskExecutor,
    state: Mutex<QueueState>,
}

impl DownloadManager {
    pub fn new(
        store: Arc<dyn ArchiveStore>,
        fetcher: Arc<dyn PageFetcher>,
        download_root: PathBuf,
        settings: DownloadManagerSettings,
    ) -> Self {
        let executor = TaskExecutor::new(store.clone(), fetcher, download_root.clone(), &settings);
        Self {
            store,
            download_root,
            executor,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Creates the download root and reloads tasks left unfinished by a
    /// previous run. Tasks found in the downloading state were interrupted
    /// and go back to pending. Returns the number of reloaded tasks.
    pub fn init(&self) -> Result<usize, DownloadManagerError> {
        std::fs::create_dir_all(&self.download_root).map_err(|e| {
            anyhow::anyhow!(
                "Failed to create download directory {:?}: {}",
                self.download_root,
                e
            )
        })?;

        let mut tasks = self.store.list_resumable_tasks()?;
        for task in tasks.iter_mut() {
            if task.status == TaskStatus::Downloading {
                self.store
                    .update_task_status(&task.id, TaskStatus::Pending, None)?;
                task.status = TaskStatus::Pending;
            }
        }

        let count = tasks.len();
        let mut state = self.state.lock().unwrap();
        for task in tasks {
            if !state.queue.iter().any(|t| t.id == task.id) {
                state.queue.push_back(task);
            }
        }
        if count > 0 {
            info!("Reloaded {} unfinished download tasks", count);
        }
        Ok(count)
    }

    /// Queues a comic for download and returns the task id. Submitting a
    /// comic that already has an unfinished task returns that task's id.
    ///
    /// The queue lock is held from the duplicate check to the enqueue, so
    /// concurrent submissions of one comic cannot both create a task.
    pub fn submit(self: &Arc<Self>, request: DownloadRequest) -> Result<String, DownloadManagerError> {
        validate_request(&request)?;

        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.queued_task_for_comic(&request.comic_id) {
            debug!("Comic {} already queued as {}", request.comic_id, existing);
            return Ok(existing);
        }
        if let Some(existing) = self.store.find_active_task_for_comic(&request.comic_id)? {
            debug!("Comic {} already has task {}", request.comic_id, existing.id);
            return Ok(existing.id);
        }

        let now = chrono::Utc::now().timestamp();
        let total_pages = request
            .episodes
            .iter()
            .map(|ep| ep.page_urls.len() as u32)
            .sum();
        let title = if request.title.trim().is_empty() {
            DEFAULT_TITLE.to_string()
        } else {
            request.title
        };

        let task = DownloadTask {
            id: uuid::Uuid::new_v4().to_string(),
            comic_id: request.comic_id,
            source_type: request.source_type,
            title,
            cover: request.cover,
            author: request.author,
            description: request.description,
            tags: request.tags,
            status: TaskStatus::Pending,
            total_pages,
            downloaded_pages: 0,
            current_episode_order: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
            payload: TaskPayload {
                direct_mode: true,
                detail_url: request.detail_url,
                episodes: request.episodes,
            },
        };
        self.store.insert_task(&task)?;

        let id = task.id.clone();
        info!(
            "Queued \"{}\" ({} pages) as task {}",
            task.title, task.total_pages, id
        );

        state.queue.push_back(task);
        if !state.worker_running {
            self.spawn_worker(&mut state);
        }
        Ok(id)
    }

    pub fn start(self: &Arc<Self>) -> Result<(), DownloadManagerError> {
        let mut state = self.state.lock().unwrap();
        if state.worker_running {
            return Err(DownloadManagerError::AlreadyRunning);
        }
        if state.queue.is_empty() {
            return Err(DownloadManagerError::QueueEmpty);
        }
        state.pause_requested = false;
        self.spawn_worker(&mut state);
        Ok(())
    }

    /// Asks the worker to stop once the task it is running finishes.
    pub fn pause(&self) -> Result<(), DownloadManagerError> {
        let active_id = {
            let mut state = self.state.lock().unwrap();
            if !state.worker_running {
                return Ok(());
            }
            state.pause_requested = true;
            match state
                .queue
                .iter_mut()
                .find(|t| t.status == TaskStatus::Downloading)
            {
                Some(task) => {
                    task.status = TaskStatus::Paused;
                    Some(task.id.clone())
                }
                None => None,
            }
        };

        if let Some(id) = active_id {
            info!("Pausing after task {}", id);
            self.store.update_task_status(&id, TaskStatus::Paused, None)?;
        }
        Ok(())
    }

    /// Drops a task from the queue and the store. A task that is currently
    /// running still finishes its in-flight work.
    pub fn cancel(&self, task_id: &str) -> Result<(), DownloadManagerError> {
        {
            let mut state = self.state.lock().unwrap();
            let position = state
                .queue
                .iter()
                .position(|t| t.id == task_id)
                .ok_or_else(|| DownloadManagerError::TaskNotFound(task_id.to_string()))?;
            state.queue.remove(position);
        }
        self.store.delete_task(task_id)?;
        info!("Cancelled task {}", task_id);
        Ok(())
    }

    pub fn queue(&self) -> QueueSnapshot {
        let state = self.state.lock().unwrap();
        QueueSnapshot {
            queue: state.queue.iter().cloned().collect(),
            total: state.queue.len(),
            is_downloading: state.worker_running,
        }
    }

    pub fn is_downloading(&self) -> bool {
        self.state.lock().unwrap().worker_running
    }

    /// Requests a pause and waits for the worker to finish its current task.
    pub async fn shutdown(&self) {
        let handle = {
            let mut state = self.state.lock().unwrap();
            if state.worker_running {
                state.pause_requested = true;
            }
            state.worker.take()
        };
        if let Some(handle) = handle {
            info!("Waiting for the running download to finish");
            if let Err(e) = handle.await {
                error!("Download worker ended abnormally: {}", e);
            }
        }
    }

    fn spawn_worker(self: &Arc<Self>, state: &mut QueueState) {
        state.worker_running = true;
        let manager = self.clone();
        state.worker = Some(tokio::spawn(async move {
            manager.run_worker().await;
        }));
    }

    async fn run_worker(&self) {
        debug!("Download worker started");
        loop {
            let task = {
                let mut state = self.state.lock().unwrap();
                match state.queue.front_mut() {
                    Some(task) => {
                        task.status = TaskStatus::Downloading;
                        task.clone()
                    }
                    None => {
                        state.worker_running = false;
                        state.pause_requested = false;
                        break;
                    }
                }
            };

            self.process(task).await;

            let mut state = self.state.lock().unwrap();
            if state.pause_requested {
                state.pause_requested = false;
                state.worker_running = false;
                info!("Download worker paused");
                break;
            }
            if state.queue.is_empty() {
                state.worker_running = false;
                break;
            }
        }
        debug!("Download worker stopped");
    }

    /// Runs one task to completion and removes it from the queue.
    async fn process(&self, task: DownloadTask) {
        if let Err(e) = self
            .store
            .update_task_status(&task.id, TaskStatus::Downloading, None)
        {
            error!("Failed to mark task {} as downloading: {:#}", task.id, e);
        }

        let on_progress = |downloaded: u32, episode: u32| {
            let mut state = self.state.lock().unwrap();
            if let Some(queued) = state.queue.iter_mut().find(|t| t.id == task.id) {
                queued.downloaded_pages = downloaded;
                queued.current_episode_order = episode;
            }
        };

        let (status, message) = match self.executor.execute(&task, &on_progress).await {
            Ok(()) => {
                info!("Task {} (\"{}\") completed", task.id, task.title);
                (TaskStatus::Completed, None)
            }
            Err(e) => {
                warn!("Task {} (\"{}\") failed: {}", task.id, task.title, e);
                (TaskStatus::Error, Some(e.to_string()))
            }
        };

        if let Err(e) = self
            .store
            .update_task_status(&task.id, status, message.as_deref())
        {
            error!("Failed to record final status of task {}: {:#}", task.id, e);
        }

        let mut state = self.state.lock().unwrap();
        if let Some(position) = state.queue.iter().position(|t| t.id == task.id) {
            state.queue.remove(position);
        }
    }
}

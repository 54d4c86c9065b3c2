//! Archive storage and persistence.
//!
//! SQLite-backed storage for download tasks and comic archive records.

use super::models::*;
use super::schema::ARCHIVE_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::open_versioned_db;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Durable storage for tasks and archives.
///
/// The store is the single source of truth for task status; callers keep only
/// transient ordering state in memory.
pub trait ArchiveStore: Send + Sync {
    // === Tasks ===

    /// Persist a newly submitted task.
    fn insert_task(&self, task: &DownloadTask) -> Result<()>;

    fn get_task(&self, id: &str) -> Result<Option<DownloadTask>>;

    /// Oldest non-terminal task for the given comic, if any.
    fn find_active_task_for_comic(&self, comic_id: &str) -> Result<Option<DownloadTask>>;

    /// Set the status of a task. The error message is stored only for
    /// [`TaskStatus::Error`] and cleared otherwise.
    fn update_task_status(
        &self,
        id: &str,
        status: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<()>;

    fn update_task_progress(
        &self,
        id: &str,
        downloaded_pages: u32,
        current_episode_order: u32,
    ) -> Result<()>;

    /// Returns true if a row was deleted.
    fn delete_task(&self, id: &str) -> Result<bool>;

    /// Tasks in pending, downloading or paused status, oldest first.
    fn list_resumable_tasks(&self) -> Result<Vec<DownloadTask>>;

    // === Archives ===

    /// Insert or update the archive keyed by its comic id. The directory of
    /// an existing record is never changed.
    fn upsert_archive(&self, record: &ArchiveRecord) -> Result<()>;

    fn get_archive(&self, id: &str) -> Result<Option<ArchiveRecord>>;

    /// All archives, newest first.
    fn list_archives(&self) -> Result<Vec<ArchiveRecord>>;

    /// Directory names claimed by stored archives, whether or not they still
    /// exist on disk.
    fn archive_directories(&self) -> Result<HashSet<String>>;

    /// Returns true if a row was deleted.
    fn delete_archive(&self, id: &str) -> Result<bool>;

    /// Record an episode as present on disk. Does nothing when the archive
    /// does not exist yet.
    fn append_downloaded_episode(&self, comic_id: &str, episode_order: u32) -> Result<()>;
}

/// SQLite-backed archive store.
pub struct SqliteArchiveStore {
    conn: Arc<Mutex<Connection>>,
}

const TASK_COLUMNS: &str = "id, comic_id, source_type, title, cover, author, description, tags, \
     status, total_pages, downloaded_pages, current_episode_order, error_message, \
     created_at, updated_at, payload";

const ARCHIVE_COLUMNS: &str = "id, title, author, description, cover, tags, categories, \
     episode_count, page_count, source_type, created_at, size_bytes, directory, episodes, \
     downloaded_episodes, detail_url";

impl SqliteArchiveStore {
    /// Opens an existing database or creates a new one with the current schema.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path.as_ref(), ARCHIVE_VERSIONED_SCHEMAS, "archive")?;
        Ok(SqliteArchiveStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        ARCHIVE_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;

        Ok(SqliteArchiveStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<DownloadTask> {
        let status_str: String = row.get("status")?;
        let tags_json: String = row.get("tags")?;
        let payload_json: String = row.get("payload")?;
        Ok(DownloadTask {
            id: row.get("id")?,
            comic_id: row.get("comic_id")?,
            source_type: row.get("source_type")?,
            title: row.get("title")?,
            cover: row.get::<_, Option<String>>("cover")?.unwrap_or_default(),
            author: row.get::<_, Option<String>>("author")?.unwrap_or_default(),
            description: row
                .get::<_, Option<String>>("description")?
                .unwrap_or_default(),
            tags: parse_json_column(&tags_json, 7)?,
            // Unknown statuses are treated as pending so the task is not lost.
            status: TaskStatus::from_db_str(&status_str).unwrap_or(TaskStatus::Pending),
            total_pages: row.get("total_pages")?,
            downloaded_pages: row.get("downloaded_pages")?,
            current_episode_order: row.get("current_episode_order")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            payload: parse_json_column(&payload_json, 15)?,
        })
    }

    fn row_to_archive(row: &rusqlite::Row) -> rusqlite::Result<ArchiveRecord> {
        let tags_json: String = row.get("tags")?;
        let categories_json: String = row.get("categories")?;
        let episodes_json: String = row.get("episodes")?;
        let downloaded_json: String = row.get("downloaded_episodes")?;
        Ok(ArchiveRecord {
            id: row.get("id")?,
            title: row.get("title")?,
            author: row.get::<_, Option<String>>("author")?.unwrap_or_default(),
            description: row
                .get::<_, Option<String>>("description")?
                .unwrap_or_default(),
            cover: row.get::<_, Option<String>>("cover")?.unwrap_or_default(),
            tags: parse_json_column(&tags_json, 5)?,
            categories: parse_json_column(&categories_json, 6)?,
            episode_count: row.get("episode_count")?,
            page_count: row.get("page_count")?,
            source_type: row
                .get::<_, Option<String>>("source_type")?
                .unwrap_or_default(),
            created_at: row.get("created_at")?,
            size_bytes: row.get::<_, i64>("size_bytes")?.max(0) as u64,
            directory: row.get("directory")?,
            episodes: parse_json_column(&episodes_json, 13)?,
            downloaded_episodes: parse_json_column(&downloaded_json, 14)?,
            detail_url: row.get("detail_url")?,
        })
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

fn parse_json_column<T: serde::de::DeserializeOwned>(
    json: &str,
    column_index: usize,
) -> rusqlite::Result<T> {
    serde_json::from_str(json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            column_index,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

impl ArchiveStore for SqliteArchiveStore {
    fn insert_task(&self, task: &DownloadTask) -> Result<()> {
        let tags = serde_json::to_string(&task.tags)?;
        let payload = serde_json::to_string(&task.payload)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO download_tasks ({}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                TASK_COLUMNS
            ),
            params![
                task.id,
                task.comic_id,
                task.source_type,
                task.title,
                task.cover,
                task.author,
                task.description,
                tags,
                task.status.as_str(),
                task.total_pages,
                task.downloaded_pages,
                task.current_episode_order,
                task.error_message,
                task.created_at,
                task.updated_at,
                payload,
            ],
        )
        .with_context(|| format!("Failed to insert task {}", task.id))?;
        Ok(())
    }

    fn get_task(&self, id: &str) -> Result<Option<DownloadTask>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM download_tasks WHERE id = ?1",
            TASK_COLUMNS
        ))?;
        Ok(stmt.query_row([id], Self::row_to_task).optional()?)
    }

    fn find_active_task_for_comic(&self, comic_id: &str) -> Result<Option<DownloadTask>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM download_tasks
             WHERE comic_id = ?1 AND status IN ('pending', 'downloading', 'paused')
             ORDER BY created_at ASC, rowid ASC
             LIMIT 1",
            TASK_COLUMNS
        ))?;
        Ok(stmt.query_row([comic_id], Self::row_to_task).optional()?)
    }

    fn update_task_status(
        &self,
        id: &str,
        status: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let error_message = if status == TaskStatus::Error {
            error_message
        } else {
            None
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE download_tasks SET status = ?1, error_message = ?2, updated_at = ?3 WHERE id = ?4",
            params![status.as_str(), error_message, Self::now(), id],
        )?;
        Ok(())
    }

    fn update_task_progress(
        &self,
        id: &str,
        downloaded_pages: u32,
        current_episode_order: u32,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        // MAX keeps the counter monotonic even if a stale value is written.
        conn.execute(
            "UPDATE download_tasks
             SET downloaded_pages = MAX(downloaded_pages, ?1), current_episode_order = ?2, updated_at = ?3
             WHERE id = ?4",
            params![downloaded_pages, current_episode_order, Self::now(), id],
        )?;
        Ok(())
    }

    fn delete_task(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM download_tasks WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    fn list_resumable_tasks(&self) -> Result<Vec<DownloadTask>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM download_tasks
             WHERE status IN ('pending', 'downloading', 'paused')
             ORDER BY created_at ASC, rowid ASC",
            TASK_COLUMNS
        ))?;
        let tasks = stmt
            .query_map([], Self::row_to_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    fn upsert_archive(&self, record: &ArchiveRecord) -> Result<()> {
        let tags = serde_json::to_string(&record.tags)?;
        let categories = serde_json::to_string(&record.categories)?;
        let episodes = serde_json::to_string(&record.episodes)?;
        let downloaded = serde_json::to_string(&record.downloaded_episodes)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO comic_archives ({}) VALUES
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    author = excluded.author,
                    description = excluded.description,
                    cover = excluded.cover,
                    tags = excluded.tags,
                    categories = excluded.categories,
                    episode_count = excluded.episode_count,
                    page_count = excluded.page_count,
                    source_type = excluded.source_type,
                    created_at = excluded.created_at,
                    size_bytes = excluded.size_bytes,
                    episodes = excluded.episodes,
                    downloaded_episodes = excluded.downloaded_episodes,
                    detail_url = excluded.detail_url",
                ARCHIVE_COLUMNS
            ),
            params![
                record.id,
                record.title,
                record.author,
                record.description,
                record.cover,
                tags,
                categories,
                record.episode_count,
                record.page_count,
                record.source_type,
                record.created_at,
                record.size_bytes as i64,
                record.directory,
                episodes,
                downloaded,
                record.detail_url,
            ],
        )
        .with_context(|| format!("Failed to save archive {}", record.id))?;
        Ok(())
    }

    fn get_archive(&self, id: &str) -> Result<Option<ArchiveRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM comic_archives WHERE id = ?1",
            ARCHIVE_COLUMNS
        ))?;
        Ok(stmt.query_row([id], Self::row_to_archive).optional()?)
    }

    fn list_archives(&self) -> Result<Vec<ArchiveRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM comic_archives ORDER BY created_at DESC, rowid DESC",
            ARCHIVE_COLUMNS
        ))?;
        let records = stmt
            .query_map([], Self::row_to_archive)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn archive_directories(&self) -> Result<HashSet<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT directory FROM comic_archives")?;
        let directories = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(directories)
    }

    fn delete_archive(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM comic_archives WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    fn append_downloaded_episode(&self, comic_id: &str, episode_order: u32) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let current: Option<String> = conn
            .query_row(
                "SELECT downloaded_episodes FROM comic_archives WHERE id = ?1",
                [comic_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(current) = current else {
            return Ok(());
        };

        let mut orders: Vec<u32> = serde_json::from_str(&current).unwrap_or_default();
        if !orders.contains(&episode_order) {
            orders.push(episode_order);
            orders.sort_unstable();
        }
        conn.execute(
            "UPDATE comic_archives SET downloaded_episodes = ?1 WHERE id = ?2",
            params![serde_json::to_string(&orders)?, comic_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_persistence::{read_schema_version, BASE_DB_VERSION};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn make_task(id: &str, comic_id: &str, created_at: i64) -> DownloadTask {
        let mut tags = BTreeMap::new();
        tags.insert("categories".to_string(), vec!["Action".to_string()]);
        DownloadTask {
            id: id.to_string(),
            comic_id: comic_id.to_string(),
            source_type: "jm".to_string(),
            title: format!("Title {}", comic_id),
            cover: String::new(),
            author: "Author".to_string(),
            description: String::new(),
            tags,
            status: TaskStatus::Pending,
            total_pages: 4,
            downloaded_pages: 0,
            current_episode_order: 0,
            error_message: None,
            created_at,
            updated_at: created_at,
            payload: TaskPayload {
                direct_mode: true,
                detail_url: Some("https://example.com/c1".to_string()),
                episodes: vec![EpisodeDescriptor {
                    order: 1,
                    name: "Ep 1".to_string(),
                    page_urls: vec!["http://x/1.jpg".to_string()],
                    headers: None,
                    descramble_params: Some(DescrambleParams {
                        episode_id: 300000,
                        scramble_threshold_id: 220980,
                    }),
                }],
            },
        }
    }

    fn make_archive(id: &str, directory: &str, created_at: i64) -> ArchiveRecord {
        ArchiveRecord {
            id: id.to_string(),
            title: directory.to_string(),
            author: "Author".to_string(),
            description: "desc".to_string(),
            cover: "http://x/cover.jpg".to_string(),
            tags: vec!["Action".to_string()],
            categories: vec!["Action".to_string()],
            episode_count: 1,
            page_count: 2,
            source_type: "jm".to_string(),
            created_at,
            size_bytes: 1234,
            directory: directory.to_string(),
            episodes: vec!["Ep 1".to_string()],
            downloaded_episodes: vec![1],
            detail_url: None,
        }
    }

    #[test]
    fn test_in_memory_store_has_both_tables() {
        let store = SqliteArchiveStore::in_memory().unwrap();

        let conn = store.conn.lock().unwrap();
        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(read_schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_task_round_trip() {
        let store = SqliteArchiveStore::in_memory().unwrap();
        let task = make_task("t1", "c1", 100);

        store.insert_task(&task).unwrap();

        let loaded = store.get_task("t1").unwrap().unwrap();
        assert_eq!(loaded, task);
        assert!(store.get_task("missing").unwrap().is_none());
    }

    #[test]
    fn test_error_message_only_kept_for_error_status() {
        let store = SqliteArchiveStore::in_memory().unwrap();
        store.insert_task(&make_task("t1", "c1", 100)).unwrap();

        store
            .update_task_status("t1", TaskStatus::Paused, Some("ignored"))
            .unwrap();
        let paused = store.get_task("t1").unwrap().unwrap();
        assert_eq!(paused.status, TaskStatus::Paused);
        assert!(paused.error_message.is_none());

        store
            .update_task_status("t1", TaskStatus::Error, Some("boom"))
            .unwrap();
        let failed = store.get_task("t1").unwrap().unwrap();
        assert_eq!(failed.status, TaskStatus::Error);
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_progress_never_decreases() {
        let store = SqliteArchiveStore::in_memory().unwrap();
        store.insert_task(&make_task("t1", "c1", 100)).unwrap();

        store.update_task_progress("t1", 3, 1).unwrap();
        store.update_task_progress("t1", 2, 2).unwrap();

        let task = store.get_task("t1").unwrap().unwrap();
        assert_eq!(task.downloaded_pages, 3);
        assert_eq!(task.current_episode_order, 2);
    }

    #[test]
    fn test_find_active_task_ignores_terminal_tasks() {
        let store = SqliteArchiveStore::in_memory().unwrap();
        store.insert_task(&make_task("t1", "c1", 100)).unwrap();
        store
            .update_task_status("t1", TaskStatus::Completed, None)
            .unwrap();

        assert!(store.find_active_task_for_comic("c1").unwrap().is_none());

        store.insert_task(&make_task("t2", "c1", 200)).unwrap();
        let active = store.find_active_task_for_comic("c1").unwrap().unwrap();
        assert_eq!(active.id, "t2");
    }

    #[test]
    fn test_list_resumable_tasks_orders_by_creation() {
        let store = SqliteArchiveStore::in_memory().unwrap();
        store.insert_task(&make_task("late", "c2", 300)).unwrap();
        store.insert_task(&make_task("early", "c1", 100)).unwrap();
        store.insert_task(&make_task("done", "c3", 50)).unwrap();
        store
            .update_task_status("done", TaskStatus::Error, Some("x"))
            .unwrap();
        store
            .update_task_status("late", TaskStatus::Downloading, None)
            .unwrap();

        let ids: Vec<String> = store
            .list_resumable_tasks()
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn test_delete_task() {
        let store = SqliteArchiveStore::in_memory().unwrap();
        store.insert_task(&make_task("t1", "c1", 100)).unwrap();

        assert!(store.delete_task("t1").unwrap());
        assert!(!store.delete_task("t1").unwrap());
        assert!(store.get_task("t1").unwrap().is_none());
    }

    #[test]
    fn test_upsert_archive_keeps_directory() {
        let store = SqliteArchiveStore::in_memory().unwrap();
        store.upsert_archive(&make_archive("c1", "Title", 100)).unwrap();

        let mut updated = make_archive("c1", "Other", 200);
        updated.page_count = 10;
        store.upsert_archive(&updated).unwrap();

        let loaded = store.get_archive("c1").unwrap().unwrap();
        assert_eq!(loaded.directory, "Title");
        assert_eq!(loaded.page_count, 10);
        assert_eq!(store.list_archives().unwrap().len(), 1);
    }

    #[test]
    fn test_directory_is_unique() {
        let store = SqliteArchiveStore::in_memory().unwrap();
        store.upsert_archive(&make_archive("c1", "Same", 100)).unwrap();

        assert!(store.upsert_archive(&make_archive("c2", "Same", 100)).is_err());
    }

    #[test]
    fn test_list_archives_newest_first() {
        let store = SqliteArchiveStore::in_memory().unwrap();
        store.upsert_archive(&make_archive("old", "A", 100)).unwrap();
        store.upsert_archive(&make_archive("new", "B", 200)).unwrap();

        let ids: Vec<String> = store
            .list_archives()
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[test]
    fn test_archive_directories() {
        let store = SqliteArchiveStore::in_memory().unwrap();
        store.upsert_archive(&make_archive("c1", "A", 100)).unwrap();
        store.upsert_archive(&make_archive("c2", "B_2", 200)).unwrap();

        let directories = store.archive_directories().unwrap();

        assert_eq!(directories.len(), 2);
        assert!(directories.contains("A"));
        assert!(directories.contains("B_2"));
    }

    #[test]
    fn test_delete_archive() {
        let store = SqliteArchiveStore::in_memory().unwrap();
        store.upsert_archive(&make_archive("c1", "A", 100)).unwrap();

        assert!(store.delete_archive("c1").unwrap());
        assert!(store.get_archive("c1").unwrap().is_none());
    }

    #[test]
    fn test_append_downloaded_episode() {
        let store = SqliteArchiveStore::in_memory().unwrap();
        let mut record = make_archive("c1", "A", 100);
        record.downloaded_episodes = vec![2];
        store.upsert_archive(&record).unwrap();

        store.append_downloaded_episode("c1", 1).unwrap();
        store.append_downloaded_episode("c1", 2).unwrap();

        let loaded = store.get_archive("c1").unwrap().unwrap();
        assert_eq!(loaded.downloaded_episodes, vec![1, 2]);
    }

    #[test]
    fn test_append_downloaded_episode_without_archive_is_noop() {
        let store = SqliteArchiveStore::in_memory().unwrap();

        store.append_downloaded_episode("missing", 1).unwrap();

        assert!(store.get_archive("missing").unwrap().is_none());
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archive.db");
        {
            let store = SqliteArchiveStore::new(&path).unwrap();
            store.insert_task(&make_task("t1", "c1", 100)).unwrap();
        }

        let store = SqliteArchiveStore::new(&path).unwrap();
        assert!(store.get_task("t1").unwrap().is_some());
    }

    #[test]
    fn test_version_zero_database_gains_detail_url() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archive.db");
        {
            let conn = Connection::open(&path).unwrap();
            ARCHIVE_VERSIONED_SCHEMAS[0].create(&conn).unwrap();
            conn.execute(
                "INSERT INTO comic_archives (id, title, created_at, directory) VALUES ('c1', 'Old', 1, 'Old')",
                [],
            )
            .unwrap();
        }

        let store = SqliteArchiveStore::new(&path).unwrap();

        let record = store.get_archive("c1").unwrap().unwrap();
        assert_eq!(record.title, "Old");
        assert!(record.detail_url.is_none());
        let conn = store.conn.lock().unwrap();
        let version: i64 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version as usize, BASE_DB_VERSION + 1);
    }
}

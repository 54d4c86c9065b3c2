//! Database schema for archive.db.
//!
//! Version 0 holds download tasks and comic archives; version 1 adds the
//! `detail_url` column to archives.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};
use rusqlite::Connection;

const DOWNLOAD_TASKS_TABLE_V0: Table = Table {
    name: "download_tasks",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("comic_id", &SqlType::Text, non_null = true),
        sqlite_column!("source_type", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("cover", &SqlType::Text),
        sqlite_column!("author", &SqlType::Text),
        sqlite_column!("description", &SqlType::Text),
        sqlite_column!(
            "tags",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'{}'")
        ),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!(
            "total_pages",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "downloaded_pages",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "current_episode_order",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("error_message", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
        sqlite_column!("payload", &SqlType::Text, non_null = true),
    ],
    indices: &[
        ("idx_download_tasks_comic_id", "comic_id"),
        ("idx_download_tasks_status", "status"),
    ],
    unique_constraints: &[],
};

const COMIC_ARCHIVES_TABLE_V0: Table = Table {
    name: "comic_archives",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("author", &SqlType::Text),
        sqlite_column!("description", &SqlType::Text),
        sqlite_column!("cover", &SqlType::Text),
        sqlite_column!(
            "tags",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'[]'")
        ),
        sqlite_column!(
            "categories",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'[]'")
        ),
        sqlite_column!(
            "episode_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "page_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("source_type", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "size_bytes",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("directory", &SqlType::Text, non_null = true),
        sqlite_column!(
            "episodes",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'[]'")
        ),
        sqlite_column!(
            "downloaded_episodes",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'[]'")
        ),
    ],
    indices: &[("idx_comic_archives_created_at", "created_at")],
    unique_constraints: &[&["directory"]],
};

const COMIC_ARCHIVES_TABLE_V1: Table = Table {
    name: "comic_archives",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("author", &SqlType::Text),
        sqlite_column!("description", &SqlType::Text),
        sqlite_column!("cover", &SqlType::Text),
        sqlite_column!(
            "tags",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'[]'")
        ),
        sqlite_column!(
            "categories",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'[]'")
        ),
        sqlite_column!(
            "episode_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "page_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("source_type", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "size_bytes",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("directory", &SqlType::Text, non_null = true),
        sqlite_column!(
            "episodes",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'[]'")
        ),
        sqlite_column!(
            "downloaded_episodes",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'[]'")
        ),
        sqlite_column!("detail_url", &SqlType::Text),
    ],
    indices: &[("idx_comic_archives_created_at", "created_at")],
    unique_constraints: &[&["directory"]],
};

fn migrate_add_detail_url(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("ALTER TABLE comic_archives ADD COLUMN detail_url TEXT", [])?;
    Ok(())
}

pub const ARCHIVE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[DOWNLOAD_TASKS_TABLE_V0, COMIC_ARCHIVES_TABLE_V0],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[DOWNLOAD_TASKS_TABLE_V0, COMIC_ARCHIVES_TABLE_V1],
        migration: Some(migrate_add_detail_url),
    },
];

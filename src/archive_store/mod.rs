//! Durable state: download tasks and comic archive records.

mod models;
mod schema;
mod store;

pub use models::*;
pub use store::{ArchiveStore, SqliteArchiveStore};

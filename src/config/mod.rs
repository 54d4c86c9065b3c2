mod file_config;

pub use file_config::{DownloadManagerConfig, FileConfig};

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub download_path: Option<PathBuf>,
    pub db_dir: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub failed_directory_policy: Option<FailedDirectoryPolicy>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub download_path: PathBuf,
    pub db_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,

    pub download_manager: DownloadManagerSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let download_path = file
            .download_path
            .map(PathBuf::from)
            .or_else(|| cli.download_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "download_path must be specified via --download-path or in config file"
                )
            })?;

        let db_dir = match file.db_dir.map(PathBuf::from).or_else(|| cli.db_dir.clone()) {
            Some(dir) => {
                if !dir.exists() {
                    bail!("Database directory does not exist: {:?}", dir);
                }
                if !dir.is_dir() {
                    bail!("db_dir is not a directory: {:?}", dir);
                }
                dir
            }
            // Keep the database next to the archives it describes
            None => download_path.clone(),
        };

        let host = file.host.unwrap_or_else(|| cli.host.clone());
        let port = file.port.unwrap_or(cli.port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let defaults = DownloadManagerSettings::default();
        let dm_file = file.download_manager.unwrap_or_default();
        let failed_directory_policy = match dm_file.failed_directory_policy {
            Some(s) => match FailedDirectoryPolicy::from_str(&s, true) {
                Ok(policy) => policy,
                Err(_) => bail!("Invalid failed_directory_policy: {}", s),
            },
            None => cli
                .failed_directory_policy
                .unwrap_or(defaults.failed_directory_policy),
        };
        let download_manager = DownloadManagerSettings {
            max_attempts: dm_file.max_attempts.unwrap_or(defaults.max_attempts).max(1),
            retry_delay_ms: dm_file.retry_delay_ms.unwrap_or(defaults.retry_delay_ms),
            request_timeout_secs: dm_file
                .request_timeout_secs
                .unwrap_or(defaults.request_timeout_secs),
            min_page_bytes: dm_file.min_page_bytes.unwrap_or(defaults.min_page_bytes),
            failed_directory_policy,
        };

        Ok(Self {
            download_path,
            db_dir,
            host,
            port,
            logging_level,
            download_manager,
        })
    }

    pub fn archive_db_path(&self) -> PathBuf {
        self.db_dir.join("archive.db")
    }
}

/// What happens to the partially populated directory of a failed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FailedDirectoryPolicy {
    /// Leave the files in place for inspection or a manual retry.
    #[default]
    Keep,
    Remove,
}

#[derive(Debug, Clone)]
pub struct DownloadManagerSettings {
    /// Attempts per page or cover before the fetch is abandoned.
    pub max_attempts: u32,
    /// The wait before attempt `n + 1` is `n * retry_delay_ms`.
    pub retry_delay_ms: u64,
    pub request_timeout_secs: u64,
    /// Bodies smaller than this are treated as failed fetches.
    pub min_page_bytes: u64,
    pub failed_directory_policy: FailedDirectoryPolicy,
}

impl Default for DownloadManagerSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 1000,
            request_timeout_secs: 30,
            min_page_bytes: 100,
            failed_directory_policy: FailedDirectoryPolicy::Keep,
        }
    }
}

fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use comic_archive_server::config::{AppConfig, CliConfig, FailedDirectoryPolicy, FileConfig};
use comic_archive_server::download_manager::DownloadManagerError;
use comic_archive_server::{
    run_server, ComicLibrary, DownloadManager, HttpPageFetcher, RequestsLoggingLevel,
    ServerConfig, SqliteArchiveStore,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory archives are downloaded into.
    #[clap(long, value_parser = parse_path)]
    pub download_path: Option<PathBuf>,

    /// Directory holding the archive database. Defaults to the download path.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// The address to bind.
    #[clap(long, default_value = "0.0.0.0")]
    pub host: String,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 8080)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// What to do with the directory of a download that failed.
    #[clap(long)]
    pub failed_directory_policy: Option<FailedDirectoryPolicy>,

    /// Path to a TOML config file. Its values override the CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,
}

impl From<&CliArgs> for CliConfig {
    fn from(args: &CliArgs) -> Self {
        CliConfig {
            download_path: args.download_path.clone(),
            db_dir: args.db_dir.clone(),
            host: args.host.clone(),
            port: args.port,
            logging_level: args.logging_level.clone(),
            failed_directory_policy: args.failed_directory_policy,
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => warn!("Failed to listen for the shutdown signal: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&CliConfig::from(&cli_args), file_config)?;

    std::fs::create_dir_all(&config.download_path).with_context(|| {
        format!(
            "Failed to create download directory {:?}",
            config.download_path
        )
    })?;

    let db_path = config.archive_db_path();
    info!("Opening archive database at {:?}", db_path);
    let store = Arc::new(SqliteArchiveStore::new(&db_path)?);

    let fetcher = Arc::new(HttpPageFetcher::new(
        config.download_manager.request_timeout_secs,
    )?);
    let download_manager = Arc::new(DownloadManager::new(
        store.clone(),
        fetcher,
        config.download_path.clone(),
        config.download_manager.clone(),
    ));
    let reloaded = download_manager.init()?;
    if reloaded > 0 {
        match download_manager.start() {
            Ok(()) => info!("Resuming {} queued downloads", reloaded),
            Err(DownloadManagerError::AlreadyRunning) => {}
            Err(e) => warn!("Could not resume downloads: {}", e),
        }
    }

    let library = Arc::new(ComicLibrary::new(store, config.download_path.clone()));

    let server_config = ServerConfig {
        requests_logging_level: config.logging_level.clone(),
        host: config.host.clone(),
        port: config.port,
    };
    info!(
        "Serving archives from {:?} on {}:{}",
        config.download_path, config.host, config.port
    );

    run_server(
        server_config,
        download_manager.clone(),
        library,
        shutdown_signal(),
    )
    .await?;

    download_manager.shutdown().await;
    info!("Bye");
    Ok(())
}

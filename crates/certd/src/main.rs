// # certd - Certificate Repository Daemon
//
// This is a THIN integration layer only. Repository, store and watch logic
// all live in certrepo-core; configuration is read from environment
// variables.
//
// The certd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Opening the configured store and building the repository
// 4. Logging zone changes until a shutdown signal arrives
// 5. Tearing the repository down and flushing the store
//
// ## Configuration
//
// ### Store
// - `CERTD_STORE_TYPE`: Type of store (memory, file). Default: file
// - `CERTD_STORE_PATH`: Path to the store document (for file store)
//
// ### Repository
// - `CERTD_BUCKET`: Key namespace. Default: cert
// - `CERTD_LIST_BATCH_SIZE`: Entries fetched per enumeration round trip
//
// ### Zone watches
// - `CERTD_WATCH_CAPACITY`: Per-watcher queue capacity
// - `CERTD_WATCH_OVERFLOW`: Full queue behavior (block, drop_event)
//
// ### Logging
// - `CERTD_LOG_LEVEL`: trace, debug, info, warn or error. Default: info
//
// ## Example
//
// ```bash
// export CERTD_STORE_TYPE=file
// export CERTD_STORE_PATH=/var/lib/certd/store.json
// export CERTD_WATCH_OVERFLOW=drop_event
//
// certd
// ```

use anyhow::{Context, Result};
use certrepo_core::{
    CertificateRepository, OverflowPolicy, RepositoryConfig, StoreConfig, WatchConfig,
    open_store,
};
use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Upper bound on waiting for zone watchers to drain during shutdown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum CertdExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<CertdExitCode> for ExitCode {
    fn from(code: CertdExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    store_type: String,
    store_path: Option<String>,
    bucket: Option<String>,
    list_batch_size: Option<usize>,
    watch_capacity: Option<usize>,
    watch_overflow: Option<String>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value
    fn from_lookup<L>(lookup: L) -> Result<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            store_type: lookup("CERTD_STORE_TYPE").unwrap_or_else(|| "file".to_string()),
            store_path: lookup("CERTD_STORE_PATH"),
            bucket: lookup("CERTD_BUCKET"),
            list_batch_size: parse_var(&lookup, "CERTD_LIST_BATCH_SIZE")?,
            watch_capacity: parse_var(&lookup, "CERTD_WATCH_CAPACITY")?,
            watch_overflow: lookup("CERTD_WATCH_OVERFLOW"),
            log_level: lookup("CERTD_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        match self.store_type.as_str() {
            "memory" => {
                warn_if_set(&self.store_path, "CERTD_STORE_PATH", "memory");
            }
            "file" => match self.store_path.as_deref() {
                None | Some("") => anyhow::bail!(
                    "CERTD_STORE_PATH is required when CERTD_STORE_TYPE=file. \
                    Set it via: export CERTD_STORE_PATH=/var/lib/certd/store.json"
                ),
                Some(path) => {
                    if let Some(parent) = std::path::Path::new(path).parent()
                        && !parent.as_os_str().is_empty()
                        && !parent.exists()
                    {
                        anyhow::bail!(
                            "CERTD_STORE_PATH parent directory does not exist: {}. \
                            Create it first: sudo mkdir -p {}",
                            parent.display(),
                            parent.display()
                        );
                    }
                }
            },
            other => anyhow::bail!(
                "CERTD_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                other
            ),
        }

        if let Some(capacity) = self.watch_capacity
            && !(1..=10_000).contains(&capacity)
        {
            anyhow::bail!(
                "CERTD_WATCH_CAPACITY must be between 1 and 10000. Got: {}",
                capacity
            );
        }

        if let Some(size) = self.list_batch_size
            && !(1..=10_000).contains(&size)
        {
            anyhow::bail!(
                "CERTD_LIST_BATCH_SIZE must be between 1 and 10000. Got: {}",
                size
            );
        }

        self.overflow_policy()?;
        self.repository_config().validate()?;
        parse_log_level(&self.log_level)?;

        Ok(())
    }

    fn overflow_policy(&self) -> Result<OverflowPolicy> {
        match self.watch_overflow.as_deref().map(str::to_lowercase).as_deref() {
            None | Some("block") => Ok(OverflowPolicy::Block),
            Some("drop_event") | Some("drop") => Ok(OverflowPolicy::DropEvent),
            Some(other) => anyhow::bail!(
                "CERTD_WATCH_OVERFLOW '{}' is not valid. \
                Valid policies: block, drop_event",
                other
            ),
        }
    }

    fn store_config(&self) -> StoreConfig {
        match (self.store_type.as_str(), &self.store_path) {
            ("file", Some(path)) => StoreConfig::File { path: path.clone() },
            _ => StoreConfig::Memory,
        }
    }

    fn repository_config(&self) -> RepositoryConfig {
        let defaults = RepositoryConfig::default();
        let watch = WatchConfig::new(
            self.watch_capacity
                .unwrap_or(defaults.watch.channel_capacity),
            self.overflow_policy().unwrap_or_default(),
        );

        RepositoryConfig::new()
            .with_bucket(self.bucket.clone().unwrap_or(defaults.bucket))
            .with_list_batch_size(self.list_batch_size.unwrap_or(defaults.list_batch_size))
            .with_watch(watch)
    }
}

fn parse_var<L, T>(lookup: &L, key: &str) -> Result<Option<T>>
where
    L: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("{} is not a valid number: '{}'", key, raw))
        })
        .transpose()
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "CERTD_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

fn warn_if_set(value: &Option<String>, key: &str, store_type: &str) {
    if value.is_some() {
        eprintln!(
            "WARNING: {} is ignored when CERTD_STORE_TYPE={}",
            key, store_type
        );
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return CertdExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return CertdExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = parse_log_level(&config.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return CertdExitCode::ConfigError.into();
    }

    info!("Starting certd daemon");

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return CertdExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            CertdExitCode::RuntimeError
        } else {
            CertdExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let store_config = config.store_config();
    let store = open_store(&store_config)
        .await
        .with_context(|| format!("Failed to open {} store", store_config.type_name()))?;

    let repository = Arc::new(CertificateRepository::with_config(
        store,
        config.repository_config(),
    )?);

    info!(
        "Repository ready: store={}, bucket={}, watch capacity={}, overflow={:?}",
        store_config.type_name(),
        repository.config().bucket,
        repository.config().watch.channel_capacity,
        repository.config().watch.overflow
    );

    let shutdown = CancellationToken::new();
    let _zone_log = repository.watch(&shutdown, |zone, kind| {
        info!("Zone {} {}", zone, kind);
        true
    })?;

    let signal = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal);

    shutdown.cancel();
    repository.destroy()?;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, repository.wait_for_watchers())
        .await
        .is_err()
    {
        warn!(
            "{} zone watch(es) still running after {:?}",
            repository.active_watches(),
            SHUTDOWN_TIMEOUT
        );
    }

    repository
        .backend()
        .flush()
        .await
        .context("Failed to flush store")?;

    info!("Store flushed, daemon stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for a shutdown signal (CTRL-C only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_memory_store_defaults() {
        let config = config_from(&[("CERTD_STORE_TYPE", "memory")]).unwrap();
        config.validate().unwrap();

        assert_eq!(config.store_config(), StoreConfig::Memory);
        assert_eq!(config.repository_config(), RepositoryConfig::default());
    }

    #[test]
    fn test_file_store_requires_path() {
        let config = config_from(&[]).unwrap();
        assert!(config.validate().is_err());

        let dir = std::env::temp_dir();
        let path = dir.join("certd-store.json");
        let path = path.to_string_lossy();
        let config = config_from(&[("CERTD_STORE_PATH", path.as_ref())]).unwrap();
        config.validate().unwrap();
        assert_eq!(config.store_config().type_name(), "file");
    }

    #[test]
    fn test_repository_overrides() {
        let config = config_from(&[
            ("CERTD_STORE_TYPE", "memory"),
            ("CERTD_BUCKET", "staging"),
            ("CERTD_LIST_BATCH_SIZE", "25"),
            ("CERTD_WATCH_CAPACITY", "16"),
            ("CERTD_WATCH_OVERFLOW", "DROP_EVENT"),
        ])
        .unwrap();
        config.validate().unwrap();

        let repo = config.repository_config();
        assert_eq!(repo.bucket, "staging");
        assert_eq!(repo.list_batch_size, 25);
        assert_eq!(repo.watch.channel_capacity, 16);
        assert_eq!(repo.watch.overflow, OverflowPolicy::DropEvent);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(config_from(&[("CERTD_WATCH_CAPACITY", "many")]).is_err());

        let invalid = [
            ("CERTD_WATCH_CAPACITY", "0"),
            ("CERTD_LIST_BATCH_SIZE", "0"),
            ("CERTD_WATCH_OVERFLOW", "drop_oldest"),
            ("CERTD_LOG_LEVEL", "verbose"),
            ("CERTD_BUCKET", "a:b"),
            ("CERTD_STORE_TYPE", "redis"),
        ];
        for (key, value) in invalid {
            let mut vars = vec![("CERTD_STORE_TYPE", "memory")];
            vars.push((key, value));
            let config = config_from(&vars).unwrap();
            assert!(config.validate().is_err(), "{key}={value} should be rejected");
        }
    }
}

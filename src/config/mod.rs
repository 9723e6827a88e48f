//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

mod cli;

pub use cli::{CliArgs, Command, CommonOverrides, ServeArgs, WorkerArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "eksirss";
const ENV_PREFIX: &str = "EKSIRSS";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_RENDER_TTL_SECS: u64 = 12 * 60 * 60;
const DEFAULT_CACHE_CAPACITY: usize = 1_000;
const DEFAULT_STALE_AFTER_SECS: u64 = 24 * 60 * 60;
const DEFAULT_LAST_HIT_TTL_SECS: u64 = 25 * 60 * 60;
const DEFAULT_TASK_INTERVAL_SECS: u64 = 10;
const DEFAULT_STALE_SWEEP_INTERVAL_SECS: u64 = 6 * 60 * 60;
const DEFAULT_INACTIVITY_SWEEP_INTERVAL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_INACTIVE_AFTER_SECS: u64 = 24 * 60 * 60;
const DEFAULT_RETRY_BASE_SECS: u64 = 10;
const DEFAULT_RETRY_MAX_SECS: u64 = 60 * 60;
const DEFAULT_FETCHER_BASE_URL: &str = "https://eksisozluk.com/";
const DEFAULT_FETCHER_USER_AGENT: &str = concat!("eksirss/", env!("CARGO_PKG_VERSION"));
const DEFAULT_FETCHER_TIMEOUT_SECS: u64 = 20;
/// Upper bound for every duration setting; values are added to timestamps.
const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub refresh: RefreshSettings,
    pub worker: WorkerSettings,
    pub fetcher: FetcherSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub render_ttl: Duration,
    pub capacity: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub stale_after: Duration,
    pub last_hit_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub enabled: bool,
    pub task_interval: Duration,
    pub stale_sweep_interval: Duration,
    pub inactivity_sweep_interval: Duration,
    pub inactive_after: Duration,
    pub retry_base: Duration,
    pub retry_max: Duration,
    pub retry_max_attempts: Option<NonZeroU32>,
}

#[derive(Debug, Clone)]
pub struct FetcherSettings {
    pub base_url: Url,
    pub user_agent: String,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => {
            raw.apply_overrides(&args.overrides);
            if args.no_worker {
                raw.worker.enabled = Some(false);
            }
        }
        Some(Command::Worker(args)) => raw.apply_overrides(&args.overrides),
        None => raw.apply_overrides(&CommonOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    refresh: RawRefreshSettings,
    worker: RawWorkerSettings,
    fetcher: RawFetcherSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &CommonOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(ttl) = overrides.cache_render_ttl_seconds {
            self.cache.render_ttl_seconds = Some(ttl);
        }
        if let Some(seconds) = overrides.refresh_stale_after_seconds {
            self.refresh.stale_after_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.worker_task_interval_seconds {
            self.worker.task_interval_seconds = Some(seconds);
        }
        if let Some(attempts) = overrides.worker_retry_max_attempts {
            self.worker.retry_max_attempts = Some(attempts);
        }
        if let Some(url) = overrides.fetcher_base_url.as_ref() {
            self.fetcher.base_url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            refresh,
            worker,
            fetcher,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let cache = build_cache_settings(cache)?;
        let refresh = build_refresh_settings(refresh)?;
        let worker = build_worker_settings(worker)?;
        let fetcher = build_fetcher_settings(fetcher)?;

        Ok(Self {
            server,
            logging,
            database,
            cache,
            refresh,
            worker,
            fetcher,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    Ok(ServerSettings { addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let render_ttl = seconds(
        cache.render_ttl_seconds.unwrap_or(DEFAULT_RENDER_TTL_SECS),
        "cache.render_ttl_seconds",
    )?;
    let capacity = NonZeroUsize::new(cache.capacity.unwrap_or(DEFAULT_CACHE_CAPACITY))
        .ok_or_else(|| LoadError::invalid("cache.capacity", "must be greater than zero"))?;

    Ok(CacheSettings {
        render_ttl,
        capacity,
    })
}

fn build_refresh_settings(refresh: RawRefreshSettings) -> Result<RefreshSettings, LoadError> {
    let stale_after = seconds(
        refresh.stale_after_seconds.unwrap_or(DEFAULT_STALE_AFTER_SECS),
        "refresh.stale_after_seconds",
    )?;
    let last_hit_ttl = seconds(
        refresh
            .last_hit_ttl_seconds
            .unwrap_or(DEFAULT_LAST_HIT_TTL_SECS),
        "refresh.last_hit_ttl_seconds",
    )?;

    Ok(RefreshSettings {
        stale_after,
        last_hit_ttl,
    })
}

fn build_worker_settings(worker: RawWorkerSettings) -> Result<WorkerSettings, LoadError> {
    let task_interval = seconds(
        worker
            .task_interval_seconds
            .unwrap_or(DEFAULT_TASK_INTERVAL_SECS),
        "worker.task_interval_seconds",
    )?;
    let stale_sweep_interval = seconds(
        worker
            .stale_sweep_interval_seconds
            .unwrap_or(DEFAULT_STALE_SWEEP_INTERVAL_SECS),
        "worker.stale_sweep_interval_seconds",
    )?;
    let inactivity_sweep_interval = seconds(
        worker
            .inactivity_sweep_interval_seconds
            .unwrap_or(DEFAULT_INACTIVITY_SWEEP_INTERVAL_SECS),
        "worker.inactivity_sweep_interval_seconds",
    )?;
    let inactive_after = seconds(
        worker
            .inactive_after_seconds
            .unwrap_or(DEFAULT_INACTIVE_AFTER_SECS),
        "worker.inactive_after_seconds",
    )?;
    let retry_base = seconds(
        worker.retry_base_seconds.unwrap_or(DEFAULT_RETRY_BASE_SECS),
        "worker.retry_base_seconds",
    )?;
    let retry_max = seconds(
        worker.retry_max_seconds.unwrap_or(DEFAULT_RETRY_MAX_SECS),
        "worker.retry_max_seconds",
    )?;
    if retry_max < retry_base {
        return Err(LoadError::invalid(
            "worker.retry_max_seconds",
            "must not be smaller than worker.retry_base_seconds",
        ));
    }

    let retry_max_attempts = worker
        .retry_max_attempts
        .map(|value| non_zero_u32(value.into(), "worker.retry_max_attempts"))
        .transpose()?;

    Ok(WorkerSettings {
        enabled: worker.enabled.unwrap_or(true),
        task_interval,
        stale_sweep_interval,
        inactivity_sweep_interval,
        inactive_after,
        retry_base,
        retry_max,
        retry_max_attempts,
    })
}

fn build_fetcher_settings(fetcher: RawFetcherSettings) -> Result<FetcherSettings, LoadError> {
    let raw_url = fetcher
        .base_url
        .unwrap_or_else(|| DEFAULT_FETCHER_BASE_URL.to_string());
    let base_url = Url::parse(raw_url.trim())
        .map_err(|err| LoadError::invalid("fetcher.base_url", format!("invalid URL: {err}")))?;
    if !matches!(base_url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "fetcher.base_url",
            "scheme must be http or https",
        ));
    }

    let user_agent = fetcher
        .user_agent
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_FETCHER_USER_AGENT.to_string());

    let timeout = seconds(
        fetcher.timeout_seconds.unwrap_or(DEFAULT_FETCHER_TIMEOUT_SECS),
        "fetcher.timeout_seconds",
    )?;

    Ok(FetcherSettings {
        base_url,
        user_agent,
        timeout,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    render_ttl_seconds: Option<u64>,
    capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRefreshSettings {
    stale_after_seconds: Option<u64>,
    last_hit_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWorkerSettings {
    enabled: Option<bool>,
    task_interval_seconds: Option<u64>,
    stale_sweep_interval_seconds: Option<u64>,
    inactivity_sweep_interval_seconds: Option<u64>,
    inactive_after_seconds: Option<u64>,
    retry_base_seconds: Option<u64>,
    retry_max_seconds: Option<u64>,
    retry_max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFetcherSettings {
    base_url: Option<String>,
    user_agent: Option<String>,
    timeout_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn seconds(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    if value > MAX_DURATION_SECS {
        return Err(LoadError::invalid(
            key,
            format!("must not exceed {MAX_DURATION_SECS} seconds"),
        ));
    }
    Ok(Duration::from_secs(value))
}

#[cfg(test)]
mod tests;

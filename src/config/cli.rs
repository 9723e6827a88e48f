use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the eksirss binary.
#[derive(Debug, Parser)]
#[command(
    name = "eksirss",
    version,
    about = "RSS feeds for ekşi sözlük topics, served from cache"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "EKSIRSS_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Serve feeds over HTTP, refreshing them in the background.
    Serve(Box<ServeArgs>),
    /// Run only the background refresh worker and its health endpoint.
    Worker(Box<WorkerArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: CommonOverrides,

    /// Do not start the embedded refresh worker.
    #[arg(long = "no-worker", action = clap::ArgAction::SetTrue)]
    pub no_worker: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WorkerArgs {
    #[command(flatten)]
    pub overrides: CommonOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CommonOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the rendered feed lifetime.
    #[arg(long = "cache-render-ttl-seconds", value_name = "SECONDS")]
    pub cache_render_ttl_seconds: Option<u64>,

    /// Override the staleness horizon of stored feeds.
    #[arg(long = "refresh-stale-after-seconds", value_name = "SECONDS")]
    pub refresh_stale_after_seconds: Option<u64>,

    /// Override the worker polling interval.
    #[arg(long = "worker-task-interval-seconds", value_name = "SECONDS")]
    pub worker_task_interval_seconds: Option<u64>,

    /// Override the number of failed refreshes before a keyword is dropped.
    #[arg(long = "worker-retry-max-attempts", value_name = "COUNT")]
    pub worker_retry_max_attempts: Option<u32>,

    /// Override the upstream base URL.
    #[arg(long = "fetcher-base-url", value_name = "URL")]
    pub fetcher_base_url: Option<String>,
}

use std::{process, sync::Arc};

use axum::Router;
use eksirss::{
    application::{
        clock::{Clock, SystemClock},
        engine::{RefreshEngine, RefreshPolicy},
        error::AppError,
        repos::FeedStore,
        worker::{RefreshWorker, WorkerConfig},
    },
    cache::{CacheConfig, RenderCache},
    config,
    infra::{
        db::PostgresFeedStore,
        eksi::EksiFetcher,
        error::InfraError,
        http::{self, HttpState},
        memory::InMemoryFeedStore,
        telemetry,
    },
};
use tokio::task::JoinHandle;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Worker(_) => run_worker(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = init_store(&settings, clock.clone()).await?;
    let engine = build_engine(&settings, store, clock)?;

    let worker_handle = if settings.worker.enabled {
        Some(spawn_worker(&settings, engine.clone())?)
    } else {
        info!("embedded refresh worker disabled");
        None
    };

    let router = http::build_router(HttpState {
        engine: Arc::new(engine),
    });
    let result = serve_http(&settings, router).await;

    if let Some(handle) = worker_handle {
        handle.abort();
        let _ = handle.await;
    }

    result
}

async fn run_worker(settings: config::Settings) -> Result<(), AppError> {
    if settings.database.url.is_none() {
        return Err(InfraError::configuration(
            "the worker command requires database.url because the refresh queue must be shared",
        )
        .into());
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = init_store(&settings, clock.clone()).await?;
    let engine = build_engine(&settings, store, clock)?;

    let worker_handle = spawn_worker(&settings, engine.clone())?;
    let router = http::build_health_router(HttpState {
        engine: Arc::new(engine),
    });
    let result = serve_http(&settings, router).await;

    worker_handle.abort();
    let _ = worker_handle.await;

    result
}

async fn init_store(
    settings: &config::Settings,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn FeedStore>, AppError> {
    let last_hit_ttl = time::Duration::try_from(settings.refresh.last_hit_ttl).map_err(|err| {
        InfraError::configuration(format!("refresh.last_hit_ttl_seconds out of range: {err}"))
    })?;

    let Some(database_url) = settings.database.url.as_ref() else {
        warn!("no database url configured; feeds and the refresh queue live in memory");
        return Ok(Arc::new(InMemoryFeedStore::new(clock, last_hit_ttl)));
    };

    let pool = PostgresFeedStore::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresFeedStore::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let store = PostgresFeedStore::new(pool, clock, last_hit_ttl);
    match store.purge_expired_hits().await {
        Ok(purged) => info!(purged, "removed expired read signals"),
        Err(err) => warn!(error = %err, "failed to purge expired read signals"),
    }

    Ok(Arc::new(store))
}

fn build_engine(
    settings: &config::Settings,
    store: Arc<dyn FeedStore>,
    clock: Arc<dyn Clock>,
) -> Result<RefreshEngine, AppError> {
    let fetcher = EksiFetcher::new(&settings.fetcher)?;
    let cache = RenderCache::new(CacheConfig::from(&settings.cache), clock.clone());
    let policy = RefreshPolicy::try_from(&settings.refresh).map_err(|err| {
        InfraError::configuration(format!("refresh.stale_after_seconds out of range: {err}"))
    })?;

    Ok(RefreshEngine::new(
        store,
        Arc::new(fetcher),
        Arc::new(cache),
        clock,
        policy,
    ))
}

fn spawn_worker(
    settings: &config::Settings,
    engine: RefreshEngine,
) -> Result<JoinHandle<()>, AppError> {
    let worker_config = WorkerConfig::try_from(&settings.worker).map_err(|err| {
        InfraError::configuration(format!("worker interval out of range: {err}"))
    })?;

    Ok(tokio::spawn(RefreshWorker::new(engine, worker_config).run()))
}

async fn serve_http(settings: &config::Settings, router: Router) -> Result<(), AppError> {
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(addr = %settings.server.addr, "listening");

    axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

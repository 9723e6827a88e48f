use super::*;

#[test]
fn defaults_match_documented_cadences() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.cache.render_ttl, Duration::from_secs(12 * 60 * 60));
    assert_eq!(settings.cache.capacity.get(), 1_000);
    assert_eq!(settings.refresh.stale_after, Duration::from_secs(24 * 60 * 60));
    assert_eq!(settings.refresh.last_hit_ttl, Duration::from_secs(25 * 60 * 60));
    assert_eq!(settings.worker.task_interval, Duration::from_secs(10));
    assert_eq!(settings.worker.stale_sweep_interval, Duration::from_secs(6 * 60 * 60));
    assert_eq!(
        settings.worker.inactivity_sweep_interval,
        Duration::from_secs(24 * 60 * 60)
    );
    assert!(settings.worker.enabled);
    assert!(settings.worker.retry_max_attempts.is_none());
    assert!(settings.database.url.is_none());
    assert_eq!(settings.fetcher.base_url.as_str(), "https://eksisozluk.com/");
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = CommonOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = CommonOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn blank_database_url_means_in_memory() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
}

#[test]
fn zero_intervals_are_rejected_with_their_key() {
    let mut raw = RawSettings::default();
    raw.worker.task_interval_seconds = Some(0);

    let err = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "worker.task_interval_seconds",
            ..
        }
    ));
}

#[test]
fn oversized_durations_are_rejected_with_their_key() {
    let mut raw = RawSettings::default();
    raw.cache.render_ttl_seconds = Some(u64::MAX);
    let err = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.render_ttl_seconds",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.refresh.last_hit_ttl_seconds = Some(MAX_DURATION_SECS + 1);
    let err = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "refresh.last_hit_ttl_seconds",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.refresh.last_hit_ttl_seconds = Some(MAX_DURATION_SECS);
    let settings = Settings::from_raw(raw).expect("ten years is accepted");
    assert_eq!(
        settings.refresh.last_hit_ttl,
        std::time::Duration::from_secs(MAX_DURATION_SECS)
    );
}

#[test]
fn retry_cap_must_cover_base() {
    let mut raw = RawSettings::default();
    raw.worker.retry_base_seconds = Some(120);
    raw.worker.retry_max_seconds = Some(60);

    let err = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "worker.retry_max_seconds",
            ..
        }
    ));
}

#[test]
fn fetcher_base_url_must_be_http() {
    let mut raw = RawSettings::default();
    raw.fetcher.base_url = Some("ftp://eksisozluk.com/".to_string());

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["eksirss"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "eksirss",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--database-url",
        "postgres://override",
        "--no-worker",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.database_url.as_deref(),
                Some("postgres://override")
            );
            assert!(serve.no_worker);
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_worker_arguments() {
    let args = CliArgs::parse_from([
        "eksirss",
        "worker",
        "--database-url",
        "postgres://example",
        "--worker-retry-max-attempts",
        "5",
    ]);

    match args.command.expect("worker command") {
        Command::Worker(worker) => {
            assert_eq!(
                worker.overrides.database_url.as_deref(),
                Some("postgres://example")
            );
            assert_eq!(worker.overrides.worker_retry_max_attempts, Some(5));
        }
        _ => panic!("wrong command parsed"),
    }
}

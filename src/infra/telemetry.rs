use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "eksirss_render_cache_hit_total",
            Unit::Count,
            "Reads answered from the render cache."
        );
        describe_counter!(
            "eksirss_render_cache_miss_total",
            Unit::Count,
            "Reads that missed the render cache."
        );
        describe_counter!(
            "eksirss_render_cache_evict_total",
            Unit::Count,
            "Render cache entries evicted due to capacity."
        );
        describe_counter!(
            "eksirss_fetch_total",
            Unit::Count,
            "Upstream topic fetches, labelled by outcome."
        );
        describe_histogram!(
            "eksirss_fetch_ms",
            Unit::Milliseconds,
            "Upstream topic fetch latency in milliseconds."
        );
        describe_counter!(
            "eksirss_retry_total",
            Unit::Count,
            "Background refreshes that failed and were re-queued."
        );
        describe_counter!(
            "eksirss_dead_letter_total",
            Unit::Count,
            "Keywords dropped from the refresh rotation after exhausting retries."
        );
        describe_counter!(
            "eksirss_stale_enqueued_total",
            Unit::Count,
            "Keywords queued by the stale sweep."
        );
        describe_counter!(
            "eksirss_evicted_total",
            Unit::Count,
            "Feeds evicted by the inactivity sweep."
        );
    });
}

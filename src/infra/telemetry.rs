use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::{
    config::{LogFormat, LoggingSettings},
    util::timestamp::SiteOffsetTimer,
};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Event timestamps are rendered in the site offset (UTC+05:00).
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_timer(SiteOffsetTimer)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_timer(SiteOffsetTimer)
            .with_target(true)
            .boxed(),
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
            "inkpost_cache_object_hit_total",
            Unit::Count,
            "Total number of object cache hits."
        );
        describe_counter!(
            "inkpost_cache_object_miss_total",
            Unit::Count,
            "Total number of object cache misses."
        );
        describe_counter!(
            "inkpost_cache_object_evict_total",
            Unit::Count,
            "Total number of object cache evictions due to capacity."
        );
        describe_counter!(
            "inkpost_cache_response_hit_total",
            Unit::Count,
            "Total number of response-cache hits."
        );
        describe_counter!(
            "inkpost_cache_response_miss_total",
            Unit::Count,
            "Total number of response-cache misses."
        );
        describe_counter!(
            "inkpost_dedup_joined_total",
            Unit::Count,
            "Requests that joined an in-flight operation instead of executing."
        );
        describe_counter!(
            "inkpost_dedup_executed_total",
            Unit::Count,
            "Operations executed by the request deduplicator."
        );
        describe_counter!(
            "inkpost_invalidation_failed_total",
            Unit::Count,
            "Cache invalidation operations that reported an error."
        );
        describe_gauge!(
            "inkpost_dedup_pending",
            Unit::Count,
            "Operations currently registered with the request deduplicator."
        );
        describe_histogram!(
            "inkpost_db_connect_ms",
            Unit::Milliseconds,
            "Database connection establishment latency in milliseconds."
        );
        describe_counter!(
            "inkpost_indexing_submitted_total",
            Unit::Count,
            "URLs accepted by the search indexing API."
        );
    });
}

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
            "chirp_author_cache_hit_total",
            Unit::Count,
            "Author ids served from a fresh cache entry."
        );
        describe_counter!(
            "chirp_author_cache_miss_total",
            Unit::Count,
            "Author ids that were cold or attached to an in-flight fetch."
        );
        describe_counter!(
            "chirp_author_cache_upstream_batch_total",
            Unit::Count,
            "Batch lookups sent to the identity provider."
        );
        describe_counter!(
            "chirp_author_cache_evict_total",
            Unit::Count,
            "Author cache entries evicted for capacity or removed after expiry."
        );
        describe_counter!(
            "chirp_profile_snapshot_total",
            Unit::Count,
            "Profile requests by snapshot state at lookup."
        );
        describe_counter!(
            "chirp_profile_regeneration_total",
            Unit::Count,
            "Profile regenerations started."
        );
        describe_counter!(
            "chirp_post_rate_limited_total",
            Unit::Count,
            "Post creations rejected by the per-author rate limit."
        );
        describe_histogram!(
            "chirp_feed_assembly_ms",
            Unit::Milliseconds,
            "Feed assembly latency on view-cache misses."
        );
        describe_histogram!(
            "chirp_cache_consume_ms",
            Unit::Milliseconds,
            "Cache event consumption latency in milliseconds."
        );
    });
}

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
            "edgepress_kv_cache_hit_total",
            Unit::Count,
            "Total number of tag-versioned KV cache hits."
        );
        describe_counter!(
            "edgepress_kv_cache_miss_total",
            Unit::Count,
            "Total number of tag-versioned KV cache misses."
        );
        describe_counter!(
            "edgepress_kv_cache_error_total",
            Unit::Count,
            "Total number of KV store failures degraded to a miss or no-op."
        );
        describe_counter!(
            "edgepress_edge_cache_hit_total",
            Unit::Count,
            "Total number of edge response-cache hits."
        );
        describe_counter!(
            "edgepress_edge_cache_miss_total",
            Unit::Count,
            "Total number of edge response-cache misses."
        );
        describe_counter!(
            "edgepress_edge_cache_store_total",
            Unit::Count,
            "Total number of responses stored in the edge cache."
        );
        describe_counter!(
            "edgepress_tag_invalidations_total",
            Unit::Count,
            "Total number of cache tag version bumps."
        );
        describe_histogram!(
            "edgepress_orchestrator_ms",
            Unit::Milliseconds,
            "Content invalidation latency in milliseconds."
        );
        describe_histogram!(
            "edgepress_search_ms",
            Unit::Milliseconds,
            "Per-engine search latency in milliseconds."
        );
    });
}

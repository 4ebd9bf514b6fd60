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

/// Register metric descriptions with the installed recorder. Runs once.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "plaudit_like_cache_hit_total",
            Unit::Count,
            "Like cache reads answered by the cache, by kind (counter|membership)."
        );
        describe_counter!(
            "plaudit_like_cache_miss_total",
            Unit::Count,
            "Like cache reads that fell back to the record store, by kind."
        );
        describe_counter!(
            "plaudit_like_cache_degraded_total",
            Unit::Count,
            "Read-path cache calls that failed and were skipped, by operation."
        );
        describe_counter!(
            "plaudit_like_toggle_total",
            Unit::Count,
            "Like toggles by result (liked|unliked|cache_unavailable|record_store_error)."
        );
        describe_counter!(
            "plaudit_like_toggle_rollback_total",
            Unit::Count,
            "Like toggles rolled back because the cache batch failed."
        );
        describe_counter!(
            "plaudit_reconcile_items_total",
            Unit::Count,
            "Items whose cached counter was rewritten by reconciliation."
        );
        describe_counter!(
            "plaudit_reconcile_failure_total",
            Unit::Count,
            "Reconciliation passes that failed and kept the dirty set."
        );
        describe_histogram!(
            "plaudit_reconcile_ms",
            Unit::Milliseconds,
            "Reconciliation pass latency in milliseconds."
        );
    });
}

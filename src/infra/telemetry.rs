use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::metric_names;
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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            metric_names::HIT,
            Unit::Count,
            "Pages served from the cache."
        );
        describe_counter!(
            metric_names::MISS,
            Unit::Count,
            "Cacheable requests that ran the generator."
        );
        describe_counter!(
            metric_names::SKIP,
            Unit::Count,
            "Requests that bypassed the cache."
        );
        describe_counter!(
            metric_names::NOT_MODIFIED,
            Unit::Count,
            "Conditional requests answered with 304 Not Modified."
        );
        describe_counter!(
            metric_names::STORE,
            Unit::Count,
            "Generated pages written to the cache."
        );
        describe_counter!(
            metric_names::BACKEND_ERROR,
            Unit::Count,
            "Cache backend failures, labelled by operation."
        );
        describe_counter!(
            metric_names::EVICT,
            Unit::Count,
            "Entries evicted from the in-memory backend due to capacity."
        );
        describe_counter!(
            metric_names::FLUSHED_ENTRIES,
            Unit::Count,
            "Entries removed by tag flushes."
        );
        describe_gauge!(
            metric_names::PENDING_CHANGES,
            Unit::Count,
            "Content changes waiting for the next flush."
        );
        describe_histogram!(
            metric_names::FLUSH_MS,
            Unit::Milliseconds,
            "Tag flush latency in milliseconds."
        );
    });
}

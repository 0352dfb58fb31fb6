use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
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
///
/// Logs go to stderr so that command output on stdout stays machine-readable.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
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

/// Register descriptions for every metric the subscription cache emits.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "barkeep_subs_request_total",
            Unit::Count,
            "Subscribe calls by outcome (hit, miss, passthrough)."
        );
        describe_counter!(
            "barkeep_subs_evict_total",
            Unit::Count,
            "Entries dropped from the subscription cache by reason (expired, capacity, clear)."
        );
        describe_counter!(
            "barkeep_subs_error_total",
            Unit::Count,
            "Store-reported subscription failures."
        );
        describe_gauge!(
            "barkeep_subs_tracked",
            Unit::Count,
            "Entries tracked after the most recent reconciliation epoch."
        );
        describe_histogram!(
            "barkeep_subs_reconcile_ms",
            Unit::Milliseconds,
            "Reconciliation epoch latency in milliseconds."
        );
    });
}

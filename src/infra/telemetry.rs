use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::notify::METRIC_REALTIME_EVENTS_TOTAL;
use crate::application::store::{
    METRIC_POSTS, METRIC_RELOAD_FAILED_TOTAL, METRIC_RELOAD_TOTAL, METRIC_WRITE_FAILED_TOTAL,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr so command output on stdout stays clean.
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_RELOAD_TOTAL,
            Unit::Count,
            "Total number of post collection reloads started."
        );
        describe_counter!(
            METRIC_RELOAD_FAILED_TOTAL,
            Unit::Count,
            "Total number of post collection reloads that failed."
        );
        describe_gauge!(
            METRIC_POSTS,
            Unit::Count,
            "Number of posts held in the local cache after the last reload."
        );
        describe_counter!(
            METRIC_WRITE_FAILED_TOTAL,
            Unit::Count,
            "Total number of failed inserts and content updates."
        );
        describe_counter!(
            METRIC_REALTIME_EVENTS_TOTAL,
            Unit::Count,
            "Total number of change notifications received from the realtime channel."
        );
    });
}

use std::{env, sync::Once};

use metrics::{Unit, describe_counter, describe_histogram};
use tracing::{Subscriber, debug};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    fmt::MakeWriter,
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

use crate::application::calculator::{
    METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_CALCULATE_MS, METRIC_HISTORY_APPEND,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// sqlx logs every statement at `info`; without `RUST_LOG` only slow or failed
/// statements are shown.
const QUIET_QUERIES: &str = "sqlx::query=warn";

/// Install the process-wide subscriber: level filter, span traces for error
/// reports and the configured output format on stdout.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    tracing_subscriber::registry()
        .with(level_filter(logging)?)
        .with(ErrorLayer::default())
        .with(output_layer(logging.format, std::io::stdout))
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })?;

    debug!(format = ?logging.format, level = %logging.level, "tracing initialised");
    Ok(())
}

fn level_filter(logging: &LoggingSettings) -> Result<EnvFilter, InfraError> {
    let filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();
    if env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        return Ok(filter);
    }

    let quiet = QUIET_QUERIES
        .parse()
        .map_err(|err| InfraError::telemetry(format!("invalid log directive: {err}")))?;
    Ok(filter.add_directive(quiet))
}

/// JSON lines flatten event fields to the top level and keep the innermost
/// span (the `request` span carrying `request_id`) under `span`.
fn output_layer<S, W>(format: LogFormat, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_writer(writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(writer)
            .boxed(),
    }
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT,
            Unit::Count,
            "Total number of sums served from the cache."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Total number of sums computed after a cache miss."
        );
        describe_counter!(
            METRIC_HISTORY_APPEND,
            Unit::Count,
            "Total number of calculations appended to the history log."
        );
        describe_histogram!(
            METRIC_CALCULATE_MS,
            Unit::Milliseconds,
            "End-to-end calculation latency in milliseconds."
        );
    });
}

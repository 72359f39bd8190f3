//! Tracing and metrics bootstrap.

use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static DESCRIBE_ONCE: Once = Once::new();

/// Install the global tracing subscriber. The configured level is the
/// default directive; `RUST_LOG` still refines it per target.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    register_metrics();

    let filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(ErrorLayer::default());

    let installed = match logging.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(true))
            .try_init(),
    };

    installed.map_err(|err| InfraError::telemetry(err.to_string()))
}

fn register_metrics() {
    DESCRIBE_ONCE.call_once(|| {
        describe_counter!(
            "rondo_cache_hit_total",
            Unit::Count,
            "Total number of object cache hits."
        );
        describe_counter!(
            "rondo_cache_miss_total",
            Unit::Count,
            "Total number of object cache misses (loader invoked)."
        );
        describe_counter!(
            "rondo_cache_invalidation_total",
            Unit::Count,
            "Total number of cache keys invalidated by write paths."
        );
        describe_counter!(
            "rondo_dispatch_total",
            Unit::Count,
            "Total number of dispatch attempts."
        );
        describe_counter!(
            "rondo_dispatch_phrases_total",
            Unit::Count,
            "Total number of phrases delivered to the sink."
        );
    });
}

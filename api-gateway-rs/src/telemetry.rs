//! Structured logging setup
//!
//! Human-readable output in development, flattened JSON in production.
//! `RUST_LOG` overrides the default `info` filter.

use relay_config::Environment;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber; a second call is a no-op
pub fn init_tracing(environment: Environment) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let subscriber = Registry::default().with(filter);

    let result = if environment.is_production() {
        let json_layer = fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(true);
        subscriber.with(json_layer).try_init()
    } else {
        let text_layer = fmt::layer().with_target(true);
        subscriber.with(text_layer).try_init()
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

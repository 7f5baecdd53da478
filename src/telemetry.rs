//! Tracing subscriber setup.

use tracing_subscriber::{EnvFilter, fmt};

use crate::config::Stage;

const DEFAULT_FILTER: &str = "info";

/// Installs the global tracing subscriber.
///
/// Production emits JSON lines; other stages use the human-readable format. `RUST_LOG` overrides
/// the default `info` filter. Calling this more than once keeps the first subscriber.
pub fn init(stage: Stage) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = fmt().with_env_filter(filter).with_target(false);

    let _ = match stage {
        Stage::Production => builder.json().with_current_span(true).try_init(),
        Stage::Development | Stage::Staging => builder.try_init(),
    };
}

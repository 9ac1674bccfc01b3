//! tracing subscriber setup.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. `RUST_LOG` overrides the default filter;
/// without it, per-request lines from `tower_http` only show with `access_log`.
pub fn init_logging(access_log: bool) {
    let default_filter = if access_log {
        "info,tower_http=info"
    } else {
        "info,tower_http=warn"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();
}

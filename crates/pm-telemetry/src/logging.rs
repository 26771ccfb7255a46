use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber. JSON output in production
/// (`RUST_ENV=production`), pretty output otherwise. Mirrors the teacher's
/// `hip3-telemetry::logging::init_logging`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pm=debug"));

    let is_production = std::env::var("RUST_ENV")
        .map(|v| v == "production")
        .unwrap_or(false);

    if is_production {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).pretty().init();
    }
}

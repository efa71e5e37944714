use tracing_subscriber::{fmt, EnvFilter};

/// Initializes tracing/logging based on environment variables.
///
/// `RUST_LOG` controls the filter; `SQLPILOT_LOG_JSON=1` switches to JSON
/// output for log shippers.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(false);

    if std::env::var("SQLPILOT_LOG_JSON").map(|v| v == "1").unwrap_or(false) {
        builder.json().init();
    } else {
        builder.init();
    }
}

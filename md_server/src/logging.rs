//! Structured logging configuration for the server's own modules.
//!
//! The `matchday` library logs through the `log` facade (handled by
//! `env_logger` in `main`); server-side request handling uses `tracing` with
//! an `EnvFilter` so operators tune both through `RUST_LOG`.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber for server-side events.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

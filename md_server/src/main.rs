//! Tournament platform server.
//!
//! Wires the `matchday` core to its backends, spawns the background loops
//! (outbox processor, lifecycle sweeper), and serves the HTTP API with
//! graceful shutdown.

mod api;
mod handlers;
mod logging;
mod metrics;

use anyhow::Error;
use log::info;
use matchday::idempotency::{
    IdempotencyGateway, IdempotencyStore, MemoryIdempotencyStore, PgIdempotencyStore,
};
use matchday::lock::{LockBackend, LockManager, MemoryLockBackend, PgLockBackend};
use matchday::outbox::{
    EventDispatcher, EventTypeRegistry, MemoryOutboxStore, OutboxProcessor, OutboxProcessorConfig,
    OutboxStore, PgOutboxStore,
};
use matchday::tournament::{
    LifecycleSweeper, MemoryTournamentStore, PgTournamentStore, TournamentLifecycle,
    TournamentStore,
};
use pico_args::Arguments;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const HELP: &str = "\
Run a tournament platform server

USAGE:
  md_server [OPTIONS]

OPTIONS:
  --bind          IP:PORT   Server socket bind address   [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url        URL       Database connection string   [default: env DATABASE_URL]
  --metrics-bind  IP:PORT   Prometheus scrape address    [default: env METRICS_BIND, disabled if unset]

FLAGS:
  -h, --help                Print help information

ENVIRONMENT:
  SERVER_BIND               Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL              PostgreSQL connection string
  STORAGE_BACKEND           `postgres` (default) or `memory` (single node, no infra)
  SWEEP_INTERVAL_SECS       Lifecycle sweep period            [default: 60]
  OUTBOX_BATCH_SIZE         Outbox rows claimed per cycle     [default: 50]
  OUTBOX_MAX_RETRIES        Failures before dead-letter       [default: 5]
  OUTBOX_POLL_INTERVAL_SECS Outbox cycle period               [default: 5]
";

struct Args {
    bind: SocketAddr,
    database_url: Option<String>,
    metrics_bind: Option<SocketAddr>,
}

/// The storage-dependent half of the wiring, selected once at startup.
/// There is no runtime failover between backends; an unreachable store at
/// runtime surfaces as fail-closed locks and failed saves, never a silent
/// switch.
struct Backends {
    lock_backend: Arc<dyn LockBackend>,
    outbox_store: Arc<dyn OutboxStore>,
    tournament_store: Arc<dyn TournamentStore>,
    idempotency_store: Arc<dyn IdempotencyStore>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        bind: pargs.value_from_str("--bind").unwrap_or_else(|_| {
            std::env::var("SERVER_BIND")
                .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
                .parse()
                .expect("Invalid SERVER_BIND address")
        }),
        database_url: pargs
            .value_from_str("--db-url")
            .ok()
            .or_else(|| std::env::var("DATABASE_URL").ok()),
        metrics_bind: pargs
            .value_from_str("--metrics-bind")
            .ok()
            .or_else(|| std::env::var("METRICS_BIND").ok().and_then(|v| v.parse().ok())),
    };

    env_logger::builder().format_target(false).init();
    logging::init();
    info!("Starting tournament server at {}", args.bind);

    if let Some(metrics_bind) = args.metrics_bind {
        metrics::init_metrics(metrics_bind)
            .map_err(|e| anyhow::anyhow!("Failed to start metrics exporter: {e}"))?;
        info!("Prometheus metrics on {metrics_bind}");
    }

    let backends = build_backends(args.database_url.as_deref()).await?;

    // Core services.
    let locks = Arc::new(LockManager::new(backends.lock_backend));
    let lifecycle = Arc::new(TournamentLifecycle::new(
        backends.tournament_store.clone(),
        locks.clone(),
    ));
    let gateway = IdempotencyGateway::new(backends.idempotency_store);

    let mut dispatcher = EventDispatcher::new();
    dispatcher.subscribe(Arc::new(handlers::NotificationLogger));
    dispatcher.subscribe(Arc::new(handlers::AnalyticsRecorder));

    let processor = OutboxProcessor::new(
        backends.outbox_store,
        Arc::new(EventTypeRegistry::with_known_events()),
        Arc::new(dispatcher),
        locks.clone(),
        OutboxProcessorConfig::from_env(),
    );

    let sweep_interval = std::env::var("SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(matchday::tournament::sweeper::DEFAULT_SWEEP_INTERVAL);
    let sweeper = LifecycleSweeper::new(
        lifecycle.clone(),
        backends.tournament_store.clone(),
        sweep_interval,
    );

    // Background loops with a shared shutdown signal.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let processor_handle = tokio::spawn(processor.run(shutdown_rx.clone()));
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown_rx.clone()));

    // HTTP API.
    let state = api::AppState {
        lifecycle,
        store: backends.tournament_store,
        gateway,
    };
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {e}", args.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        args.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {e}"))?;

    info!("Shutting down server...");
    let _ = shutdown_tx.send(true);
    let _ = processor_handle.await;
    let _ = sweeper_handle.await;
    info!("Shutdown complete");

    Ok(())
}

/// Choose the storage backends once, from the environment. `memory` runs the
/// whole core in-process for development; anything else expects Postgres.
async fn build_backends(database_url: Option<&str>) -> Result<Backends, Error> {
    let storage = std::env::var("STORAGE_BACKEND").unwrap_or_else(|_| "postgres".to_string());

    if storage == "memory" {
        info!("Using in-memory storage (single-node mode)");
        let outbox = Arc::new(MemoryOutboxStore::new());
        return Ok(Backends {
            lock_backend: Arc::new(MemoryLockBackend::new()),
            tournament_store: Arc::new(MemoryTournamentStore::new(outbox.clone())),
            outbox_store: outbox,
            idempotency_store: Arc::new(MemoryIdempotencyStore::new()),
        });
    }

    let database_url = database_url
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the postgres backend"))?;
    info!("Connecting to database");

    let pool = PgPoolOptions::new()
        .max_connections(
            std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
        )
        .min_connections(
            std::env::var("DB_MIN_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
        )
        .acquire_timeout(Duration::from_secs(
            std::env::var("DB_CONNECTION_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        ))
        .connect(database_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {e}"))?;

    info!("Database connected successfully");
    let pool = Arc::new(pool);

    Ok(Backends {
        lock_backend: Arc::new(PgLockBackend::new(pool.clone())),
        outbox_store: Arc::new(PgOutboxStore::new(pool.clone())),
        tournament_store: Arc::new(PgTournamentStore::new(pool.clone())),
        idempotency_store: Arc::new(PgIdempotencyStore::new(pool)),
    })
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
}

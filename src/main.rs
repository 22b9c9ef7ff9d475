//! Newsdesk - HTTP server and job workers.
//!
//! # Commands
//!
//! - `newsdesk serve` - Accept jobs over HTTP and answer status queries
//! - `newsdesk work` - Run a worker pool for every queue

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use newsdesk_config::AppConfig;
use newsdesk_generation::{GenerationConfig, OpenAiClient};
use newsdesk_jobs::{JobContext, build_workers};
use newsdesk_queue::{Broker, RedisBroker, WorkerConfig};
use newsdesk_redis::RedisConfig;
use newsdesk_server::AppState;
use newsdesk_store::{PgStoreConfig, PgUserStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "newsdesk")]
#[command(version)]
#[command(about = "Redis-backed job queue for newsletters, embeddings and search")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    #[command(alias = "s")]
    Serve(ServeArgs),

    /// Run workers for every queue
    #[command(alias = "w")]
    Work(WorkArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Port to listen on (defaults to PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
}

#[derive(Args)]
struct WorkArgs {
    /// Worker slots per queue (defaults to WORKER_CONCURRENCY)
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Seconds to wait for in-flight jobs on shutdown
    #[arg(long, default_value = "30")]
    drain_timeout: u64,

    /// Seconds a claimed job may go without a heartbeat before it is run again
    #[arg(long, default_value = "300")]
    lock_timeout: u64,

    /// Do not log per-job lifecycle events
    #[arg(long)]
    quiet_jobs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    newsdesk_log::init();
    let cli = Cli::parse();
    let config = AppConfig::from_env().context("failed to load configuration")?;

    let result = match cli.command {
        Commands::Serve(args) => serve(&config, args).await,
        Commands::Work(args) => work(&config, args).await,
    };
    if let Err(e) = &result {
        error!(error = %format!("{e:#}"), "Fatal error");
    }
    result
}

async fn connect_broker(config: &AppConfig) -> anyhow::Result<Arc<dyn Broker>> {
    let redis = RedisConfig::from_app(config);
    info!(
        url = %redis.redacted_url(),
        source = %config.broker_url_source,
        "Connecting to broker"
    );
    let broker = RedisBroker::connect(&redis)
        .await
        .context("failed to connect to the broker")?;
    Ok(Arc::new(broker))
}

async fn serve(config: &AppConfig, args: ServeArgs) -> anyhow::Result<()> {
    let broker = connect_broker(config).await?;
    let state = AppState::new(broker.clone());

    let addr: SocketAddr = format!("{}:{}", args.host, args.port.unwrap_or(config.port))
        .parse()
        .context("invalid listen address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    newsdesk_server::serve(listener, state, shutdown_signal()).await?;
    broker.close().await?;
    info!("Server shut down");
    Ok(())
}

async fn work(config: &AppConfig, args: WorkArgs) -> anyhow::Result<()> {
    let database_url = config.require_database_url()?;
    let store = PgUserStore::connect(database_url, &PgStoreConfig::default())
        .await
        .context("failed to connect to the database")?;
    store.ensure_schema().await?;
    let store = Arc::new(store);

    let mut generation = GenerationConfig::new(config.require_openai_api_key()?);
    if let Some(base_url) = &config.openai_base_url {
        generation = generation.with_base_url(base_url.as_str());
    }
    let generator = Arc::new(OpenAiClient::new(generation)?);

    let broker = connect_broker(config).await?;
    let mut context = JobContext::new(store.clone(), generator);
    if let Some(model) = &config.openai_model {
        context = context.with_newsletter_model(model.as_str());
    }
    let worker_config = WorkerConfig::default()
        .with_concurrency(args.concurrency.unwrap_or(config.concurrency))
        .with_drain_timeout(Duration::from_secs(args.drain_timeout))
        .with_lock_timeout(Duration::from_secs(args.lock_timeout))
        .with_log_execution(!args.quiet_jobs);

    let mut workers = build_workers(broker.clone(), &context, &worker_config);
    for worker in &mut workers {
        worker.start().await?;
    }
    info!(
        queues = workers.len(),
        concurrency = worker_config.concurrency,
        environment = %config.environment,
        "Workers running"
    );

    shutdown_signal().await;
    info!("Shutting down workers");
    for worker in &mut workers {
        if let Err(e) = worker.stop().await {
            error!(queue = %worker.queue().name(), error = %e, "Worker did not stop cleanly");
        }
    }

    broker.close().await?;
    store.close().await;
    info!("Workers shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

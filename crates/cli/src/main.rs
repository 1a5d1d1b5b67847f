//! `flowsmith` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`: start the API server, the queue worker and the scheduler.
//! - `migrate`: run pending database migrations.
//! - `validate`: check a workflow graph file and print its execution order.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use engine::{
    Connection, CronScheduler, ExecutorConfig, ExecutorRegistry, NodeDefinition, PgStore,
    StatusPublisher, WorkflowExecutor,
};
use nodes::{MemorySubstrate, ReqwestHttpClient, UnconfiguredGateway};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Broadcast buffer for live node status messages.
const STATUS_BUFFER: usize = 1024;

#[derive(Parser)]
#[command(name = "flowsmith", about = "Workflow automation engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API, the run worker and the cron scheduler.
    Serve(ServeArgs),
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Validate a workflow graph file (`{ "nodes": [...], "connections": [...] }`).
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
}

#[derive(clap::Args)]
struct ServeArgs {
    #[arg(long, env = "FLOWSMITH_BIND", default_value = "0.0.0.0:8080")]
    bind: String,
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
    #[arg(long, env = "FLOWSMITH_MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,
    #[arg(long, env = "FLOWSMITH_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,
    #[arg(long, env = "FLOWSMITH_RETRY_BASE_DELAY_MS", default_value_t = 100)]
    retry_base_delay_ms: u64,
    #[arg(long, env = "FLOWSMITH_QUEUE_CAPACITY", default_value_t = 256)]
    queue_capacity: usize,
}

#[derive(Deserialize)]
struct GraphFile {
    nodes: Vec<NodeDefinition>,
    #[serde(default)]
    connections: Vec<Connection>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => serve(args).await?,
        Command::Migrate { database_url } => {
            info!("running migrations");
            let pool = db::pool::create_pool(&database_url, 2)
                .await
                .context("failed to connect to database")?;
            db::pool::run_migrations(&pool).await.context("migration failed")?;
            info!("migrations applied");
        }
        Command::Validate { path } => return validate(&path),
    }
    Ok(ExitCode::SUCCESS)
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let pool = db::pool::create_pool(&args.database_url, args.max_connections)
        .await
        .context("failed to connect to database")?;
    let store = Arc::new(PgStore::new(pool));

    let registry = ExecutorRegistry::builtin(Arc::new(ReqwestHttpClient::new()), Arc::new(UnconfiguredGateway));
    let publisher = StatusPublisher::new(store.clone(), STATUS_BUFFER);
    let executor = WorkflowExecutor::new(store.clone(), store.clone(), Arc::new(registry), publisher)
        .with_substrate(Arc::new(MemorySubstrate::new()))
        .with_config(ExecutorConfig {
            max_retries: args.max_retries,
            retry_base_delay: Duration::from_millis(args.retry_base_delay_ms),
        });

    let shutdown = CancellationToken::new();
    let (dispatcher, receiver) = queue::channel(args.queue_capacity);
    let dispatcher = Arc::new(dispatcher);
    let worker = tokio::spawn(queue::Worker::new(receiver, Arc::new(executor)).run(shutdown.clone()));

    let scheduler = CronScheduler::new(store.clone(), dispatcher.clone());
    match scheduler.restore().await {
        Ok(count) => info!(count, "cron schedules restored"),
        Err(e) => warn!(error = %e, "could not restore cron schedules"),
    }

    let state = api::AppState {
        dispatcher,
        graphs: store.clone(),
        executions: store,
        scheduler: scheduler.clone(),
    };

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        signal.cancel();
    });

    info!(bind = %args.bind, "starting flowsmith");
    api::serve(&args.bind, state, shutdown.clone()).await?;

    shutdown.cancel();
    scheduler.shutdown();
    worker.await.context("queue worker panicked")?;
    Ok(())
}

fn validate(path: &Path) -> anyhow::Result<ExitCode> {
    let content = std::fs::read_to_string(path).with_context(|| format!("cannot read file {}", path.display()))?;
    let graph: GraphFile = serde_json::from_str(&content).context("invalid workflow JSON")?;

    match engine::execution_order(&graph.nodes, &graph.connections) {
        Ok(order) => {
            println!("Workflow is valid. Execution order: {}", order.join(" -> "));
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("Validation failed: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

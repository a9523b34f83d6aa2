use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

use spindle_core::impls::PgStoreOptions;
use spindle_core::observability::init_tracing;
use spindle_core::{
    Clock, FilePayload, JobId, JobStore, PgJobStore, Runner, SimulatedProcessor, StoreError,
    SystemClock, WorkerConfig, WorkerId,
};

#[derive(Parser, Debug)]
#[command(name = "spindle")]
#[command(version)]
#[command(about = "PostgreSQL job worker built on FOR UPDATE SKIP LOCKED")]
#[command(propagate_version = true)]
struct Args {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Upper bound of the connection pool
    #[arg(long, env = "SPINDLE_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    /// Emit logs as JSON lines
    #[arg(long, env = "SPINDLE_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the claim, process and finalize loop until killed
    Worker(WorkerArgs),

    /// Apply pending schema migrations
    Migrate,

    /// Insert a pending file job and print its id
    Enqueue {
        #[arg(long)]
        filename: String,
    },

    /// Print one job row as JSON
    Status { id: i64 },

    /// Print job counts per status as JSON
    Stats,
}

#[derive(clap::Args, Debug)]
struct WorkerArgs {
    /// Pause after a claim that found nothing (milliseconds)
    #[arg(long, env = "SPINDLE_IDLE_INTERVAL_MS", default_value_t = 5000)]
    idle_interval_ms: u64,

    /// Pause after a failed claim (milliseconds)
    #[arg(long, env = "SPINDLE_ERROR_INTERVAL_MS", default_value_t = 5000)]
    error_interval_ms: u64,

    /// Duration of the simulated processing step (milliseconds)
    #[arg(long, env = "SPINDLE_PROCESS_MS", default_value_t = 2000)]
    process_ms: u64,

    /// Identity stamped on claimed rows; defaults to "<pid>-<ulid>"
    #[arg(long, env = "SPINDLE_WORKER_ID")]
    worker_id: Option<String>,

    /// Apply migrations before polling
    #[arg(long)]
    migrate: bool,
}

impl WorkerArgs {
    fn into_config(self, database_url: String, max_connections: u32) -> WorkerConfig {
        let mut config = WorkerConfig::new(database_url)
            .with_idle_interval(Duration::from_millis(self.idle_interval_ms))
            .with_error_interval(Duration::from_millis(self.error_interval_ms))
            .with_process_duration(Duration::from_millis(self.process_ms))
            .with_max_connections(max_connections);
        if let Some(id) = self.worker_id {
            config = config.with_worker_id(WorkerId::new(id));
        }
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing("info", args.log_json);

    let options = PgStoreOptions {
        max_connections: args.max_connections,
        ..PgStoreOptions::default()
    };
    let store = match PgJobStore::connect(&args.database_url, &options).await {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, "cannot reach the database");
            return ExitCode::FAILURE;
        }
    };

    let result = match args.command {
        Commands::Worker(worker) => {
            let migrate = worker.migrate;
            let config = worker.into_config(args.database_url, args.max_connections);
            run_worker(store, config, migrate).await
        }
        Commands::Migrate => store.migrate().await.map(|()| info!("migrations applied")),
        Commands::Enqueue { filename } => enqueue(&store, filename).await,
        Commands::Status { id } => status(&store, JobId::new(id)).await,
        Commands::Stats => stats(&store).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run_worker(
    store: PgJobStore,
    config: WorkerConfig,
    migrate: bool,
) -> Result<(), StoreError> {
    if migrate {
        store.migrate().await?;
    }
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let processor = Arc::new(SimulatedProcessor::new(
        Arc::clone(&clock),
        config.process_duration,
    ));
    let runner = Runner::<FilePayload>::new(Arc::new(store), processor, clock, &config);
    runner.run().await;
    Ok(())
}

async fn enqueue(store: &PgJobStore, filename: String) -> Result<(), StoreError> {
    let data = serde_json::json!({ "filename": filename });
    let id = store.enqueue(data).await?;
    println!("{id}");
    Ok(())
}

async fn status(store: &PgJobStore, id: JobId) -> Result<(), StoreError> {
    let record = store.get(id).await?.ok_or(StoreError::NotFound(id))?;
    print_json(&record);
    Ok(())
}

async fn stats(store: &PgJobStore) -> Result<(), StoreError> {
    let counts = store.counts().await?;
    print_json(&counts);
    Ok(())
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(err) => error!(error = %err, "cannot render output"),
    }
}

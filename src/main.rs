use clap::Parser;
use loyalty_engine::application::reconciler::{Reconciler, ReconcilerConfig};
use loyalty_engine::domain::ports::{SharedAccrualApi, SharedRepository};
use loyalty_engine::infrastructure::accrual::AccrualClient;
use loyalty_engine::infrastructure::in_memory::InMemoryStore;
#[cfg(feature = "storage-rocksdb")]
use loyalty_engine::infrastructure::rocksdb::RocksDbStore;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the accrual service order endpoint
    #[arg(long, default_value = "http://localhost:8080/api/orders")]
    accrual_url: String,

    /// Maximum concurrent requests to the accrual service
    #[arg(long, default_value_t = 5)]
    request_limit: usize,

    /// Concurrent reconciliation workers per pass
    #[arg(long, default_value_t = 5)]
    workers: usize,

    /// Maximum pending orders pulled per pass
    #[arg(long, default_value_t = 10)]
    batch_limit: usize,

    /// Sleep between passes when there is nothing to do, in milliseconds
    #[arg(long, default_value_t = 1000)]
    idle_delay_ms: u64,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Run a single reconciliation pass and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let repo: SharedRepository = match cli.db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(db_path) => Arc::new(RocksDbStore::open(db_path).into_diagnostic()?),
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            return Err(miette::miette!(
                "--db-path requires a build with the storage-rocksdb feature"
            ));
        }
        None => Arc::new(InMemoryStore::new()),
    };

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    let accrual: SharedAccrualApi = Arc::new(
        AccrualClient::new(cli.accrual_url, cli.request_limit)
            .into_diagnostic()?
            .with_shutdown(shutdown.clone()),
    );

    let reconciler = Reconciler::new(
        repo,
        accrual,
        ReconcilerConfig {
            workers: cli.workers,
            batch_limit: cli.batch_limit,
            idle_delay: Duration::from_millis(cli.idle_delay_ms),
        },
    );

    if cli.once {
        let processed = reconciler.run_pass(&shutdown).await.into_diagnostic()?;
        tracing::info!(processed, "reconciliation pass complete");
        return Ok(());
    }

    reconciler.run(shutdown).await;
    Ok(())
}

//! drover-am (Address Migration) - One-shot address normalization tool
//!
//! Scans legacy orders with free-text delivery addresses, resolves them via
//! the external resolution service, deduplicates canonical addresses per
//! tenant, and re-links the orders in transactional batches. Prints a
//! reconciliation report when done; `--dry-run` computes the same report
//! without writing anything.

use anyhow::Result;
use clap::Parser;
use drover_am::{HttpAddressResolver, MigrationRunner, RetryPolicy};
use drover_common::config::{load_toml_config, resolve_database_path};
use drover_common::db::init_database;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "drover-am", about = "Drover address normalization and deduplication migration")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, env = "DROVER_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the SQLite database file
    #[arg(long, env = "DROVER_DATABASE")]
    database: Option<PathBuf>,

    /// Compute everything, write nothing
    #[arg(long)]
    dry_run: bool,

    /// Records per transactional batch (overrides config)
    #[arg(long)]
    batch_size: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Log build identification immediately after tracing init
    info!(
        "Starting Drover Address Migration (drover-am) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let config = load_toml_config(args.config.as_deref())?;

    let db_path = resolve_database_path(args.database.as_deref(), &config);
    info!("Database path: {}", db_path.display());
    let pool = init_database(&db_path).await?;

    let resolver = HttpAddressResolver::new(&config.resolver)
        .map_err(|e| anyhow::anyhow!("Failed to create resolver client: {}", e))?;

    let policy = RetryPolicy::new(
        config.migration.max_attempts,
        Duration::from_millis(config.migration.retry_base_ms),
    );
    let batch_size = args.batch_size.unwrap_or(config.migration.batch_size);

    let runner = MigrationRunner::new(pool, Arc::new(resolver))
        .with_retry_policy(policy)
        .with_batch_size(batch_size)
        .with_dry_run(args.dry_run);

    match runner.run().await {
        Ok(stats) => {
            println!("{}", stats.report());
            Ok(())
        }
        Err(fault) => {
            // Best-effort partial report: committed batches only
            println!("{}", fault.partial.report());
            error!(
                batch = fault.batch_index,
                records = fault.records_processed,
                "Migration halted: {}",
                fault
            );
            Err(fault.into())
        }
    }
}

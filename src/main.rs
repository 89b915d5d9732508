mod aggregators;
mod config;
mod db;
mod errors;
mod evm;
mod metrics;
mod models;
mod policy;
mod pricing;
mod solana;

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::AppConfig;
use crate::evm::executor::EvmExecutor;
use crate::evm::watcher::run_evm_watcher;
use crate::solana::executor::SolanaExecutor;
use crate::solana::watcher::run_solana_watcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Arc::new(AppConfig::from_env()?);

    tracing::info!("Connecting to database...");
    let pool = db::init_pool(&config.database_url).await?;
    tracing::info!("Database connected");

    metrics::init_metrics(config.metrics_listen_addr.as_deref())?;

    // Graceful shutdown: every loop watches this channel and finishes its
    // in-flight unit of work before exiting.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut tasks = Vec::new();

    if config.evm_watcher_enabled {
        tasks.push(tokio::spawn(run_evm_watcher(
            pool.clone(),
            config.clone(),
            shutdown_rx.clone(),
        )));
    }
    if config.evm_executor_enabled {
        let executor = EvmExecutor::new(pool.clone(), config.clone())?;
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { executor.run(rx).await }));
    }
    if config.sol_watcher_enabled {
        tasks.push(tokio::spawn(run_solana_watcher(
            pool.clone(),
            config.clone(),
            shutdown_rx.clone(),
        )));
    }
    if config.sol_executor_enabled {
        let executor = SolanaExecutor::new(pool.clone(), config.clone())?;
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { executor.run(rx).await }));
    }

    if tasks.is_empty() {
        tracing::warn!(
            "no roles enabled; set EVM_WATCHER_ENABLED / EVM_EXECUTOR_ENABLED / \
             SOL_WATCHER_ENABLED / SOL_EXECUTOR_ENABLED"
        );
        return Ok(());
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping...");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        let _ = task.await;
    }
    tracing::info!("All loops stopped");

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();
}

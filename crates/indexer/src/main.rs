use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use comet_chain::{RateLimiter, RpcClient};
use comet_common::config::AppConfig;
use comet_common::db;
use comet_common::types::Network;
use comet_indexer::poller::{Indexer, IndexerSettings};
use comet_indexer::store::PgStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "comet_indexer=info,comet_decoders=debug,comet_chain=info".into()
            }),
        )
        .json()
        .init();

    let network: Network = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => Network::Mainnet,
    };

    tracing::info!(network = %network, chain_id = network.chain_id(), "CompoundScan indexer starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database; an unreachable database is fatal before the loop starts
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    let limiter = Arc::new(RateLimiter::from_millis(config.rate_limit_interval_ms));
    let client = RpcClient::new(config.rpc_url(network), limiter, config.indexer_batch_size)?;
    let store = PgStore::new(pool);

    let indexer = Indexer::new(
        network,
        Arc::new(client),
        Arc::new(store),
        IndexerSettings::from_config(&config),
    );

    // Ctrl+C stops the loop after the in-flight batch
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal, stopping after current batch...");
            shutdown.cancel();
        }
    });

    if let Err(e) = indexer.run(cancel).await {
        tracing::error!(error = %e, "Indexer exited with error");
        return Err(e);
    }

    tracing::info!("CompoundScan indexer stopped.");
    Ok(())
}

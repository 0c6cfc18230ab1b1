use std::str::FromStr;

use serde::Deserialize;

use crate::types::Network;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Sepolia JSON-RPC endpoint
    pub sepolia_rpc_url: String,

    /// Mainnet JSON-RPC endpoint
    pub mainnet_rpc_url: String,

    /// Block explorer API base URL (Etherscan V2, multichain via `chainid`)
    pub explorer_api_url: String,

    /// Block explorer API key
    pub explorer_api_key: Option<String>,

    /// Block to start from when a contract has no cursor yet
    pub indexer_start_block: Option<u64>,

    /// Widest block range (inclusive) a single log request may cover.
    /// Alchemy's free tier allows 10 blocks per `eth_getLogs`; 9 keeps us under it.
    pub indexer_batch_size: u64,

    /// Wait between height checks once caught up (default: 12000, one mainnet slot)
    pub indexer_poll_interval_ms: u64,

    /// Wait before retrying a failed batch (default: 5000)
    pub indexer_retry_delay_ms: u64,

    /// Minimum spacing between any two upstream calls (default: 350, under 3 req/s)
    pub rate_limit_interval_ms: u64,

    /// How far back the explorer read path looks for recent events
    pub query_lookback_blocks: u64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 20)?,
            sepolia_rpc_url: std::env::var("SEPOLIA_RPC_URL")
                .unwrap_or_else(|_| "https://rpc.sepolia.org".to_string()),
            mainnet_rpc_url: std::env::var("MAINNET_RPC_URL")
                .unwrap_or_else(|_| "https://eth.llamarpc.com".to_string()),
            explorer_api_url: std::env::var("EXPLORER_API_URL")
                .unwrap_or_else(|_| "https://api.etherscan.io/v2/api".to_string()),
            explorer_api_key: std::env::var("EXPLORER_API_KEY")
                .ok()
                .filter(|key| !key.is_empty()),
            indexer_start_block: std::env::var("INDEXER_START_BLOCK")
                .ok()
                .map(|v| v.parse())
                .transpose()
                .map_err(|_| anyhow::anyhow!("INDEXER_START_BLOCK must be a valid u64"))?,
            indexer_batch_size: parse_var("INDEXER_BATCH_SIZE", 9)?,
            indexer_poll_interval_ms: parse_var("INDEXER_POLL_INTERVAL_MS", 12_000)?,
            indexer_retry_delay_ms: parse_var("INDEXER_RETRY_DELAY_MS", 5_000)?,
            rate_limit_interval_ms: parse_var("RATE_LIMIT_INTERVAL_MS", 350)?,
            query_lookback_blocks: parse_var("QUERY_LOOKBACK_BLOCKS", 600_000)?,
        })
    }

    /// RPC endpoint for `network`.
    pub fn rpc_url(&self, network: Network) -> &str {
        match network {
            Network::Sepolia => &self.sepolia_rpc_url,
            Network::Mainnet => &self.mainnet_rpc_url,
        }
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| {
            anyhow::anyhow!(
                "{name} must be a valid {}",
                std::any::type_name::<T>()
            )
        }),
        Err(_) => Ok(default),
    }
}

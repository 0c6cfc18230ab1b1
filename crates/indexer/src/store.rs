use alloy::primitives::{B256, Bytes};
use async_trait::async_trait;
use sqlx::PgPool;

use comet_common::contracts::TrackedContract;
use comet_common::error::AppError;
use comet_common::types::{DecodedEvent, Network, RawLog, hex_address};

use crate::addresses::{self, AddressActivity};
use crate::projections;

/// A decoded event ready to be written, with the raw topics and data it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub network: Network,
    pub contract_id: i64,
    pub event: DecodedEvent,
    pub topics: Vec<B256>,
    pub raw_data: Bytes,
}

impl EventRecord {
    pub fn new(network: Network, contract_id: i64, log: &RawLog, event: DecodedEvent) -> Self {
        Self {
            network,
            contract_id,
            event,
            topics: log.topics.clone(),
            raw_data: log.data.clone(),
        }
    }

    /// `(network_id, tx_hash, log_index)`: at most one stored event per key.
    pub fn natural_key(&self) -> (i64, B256, u64) {
        (
            self.network.network_id(),
            self.event.transaction_hash,
            self.event.log_index,
        )
    }

    fn topic(&self, index: usize) -> Option<String> {
        self.topics.get(index).map(|topic| format!("{topic:#x}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistOutcome {
    /// `false` when the natural key was already stored; nothing was written.
    pub created: bool,
    pub event_id: i64,
}

/// Persistence used by the ingestion loop.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Register (or refresh) a tracked contract and return its id.
    async fn register_contract(
        &self,
        network: Network,
        contract: &TrackedContract,
    ) -> Result<i64, AppError>;

    async fn last_indexed_block(
        &self,
        network: Network,
        contract_id: i64,
    ) -> Result<Option<u64>, AppError>;

    /// Insert the event if its natural key is new. Only a newly created event gets its
    /// typed projection and address observations.
    async fn persist_event(&self, record: &EventRecord) -> Result<PersistOutcome, AppError>;

    /// Move the cursor forward to `block`. Never moves it backwards.
    async fn advance_cursor(
        &self,
        network: Network,
        contract_id: i64,
        block: u64,
    ) -> Result<(), AppError>;

    async fn mark_stopped(&self, network: Network, contract_id: i64) -> Result<(), AppError>;

    async fn address_activity(&self, address: &str) -> Result<Option<AddressActivity>, AppError>;
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl IndexStore for PgStore {
    async fn register_contract(
        &self,
        network: Network,
        contract: &TrackedContract,
    ) -> Result<i64, AppError> {
        let base = contract.base_token;
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO contracts (network_id, address, name, kind, deploy_block, base_token_address, base_token_symbol, base_token_decimals)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (network_id, address) DO UPDATE SET
                name = EXCLUDED.name,
                kind = EXCLUDED.kind,
                deploy_block = EXCLUDED.deploy_block,
                base_token_address = EXCLUDED.base_token_address,
                base_token_symbol = EXCLUDED.base_token_symbol,
                base_token_decimals = EXCLUDED.base_token_decimals
            RETURNING id
            "#,
        )
        .bind(network.network_id())
        .bind(hex_address(&contract.address))
        .bind(contract.name)
        .bind(contract.kind.to_string())
        .bind(contract.deploy_block as i64)
        .bind(base.map(|token| hex_address(&token.address)))
        .bind(base.map(|token| token.symbol))
        .bind(base.map(|token| token.decimals as i16))
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn last_indexed_block(
        &self,
        network: Network,
        contract_id: i64,
    ) -> Result<Option<u64>, AppError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT last_indexed_block FROM indexer_state WHERE network_id = $1 AND contract_id = $2",
        )
        .bind(network.network_id())
        .bind(contract_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(block,)| block as u64))
    }

    async fn persist_event(&self, record: &EventRecord) -> Result<PersistOutcome, AppError> {
        let event = &record.event;
        let tx_hash = format!("{:#x}", event.transaction_hash);

        let mut tx = self.pool.begin().await?;

        let inserted: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO events (network_id, tx_hash, block_number, log_index, contract_id, contract_address,
                                event_name, topic0, topic1, topic2, topic3, raw_data, decoded_data, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (network_id, tx_hash, log_index) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(record.network.network_id())
        .bind(&tx_hash)
        .bind(event.block_number as i64)
        .bind(event.log_index as i64)
        .bind(record.contract_id)
        .bind(hex_address(&event.contract_address))
        .bind(event.event_name())
        .bind(record.topic(0))
        .bind(record.topic(1))
        .bind(record.topic(2))
        .bind(record.topic(3))
        .bind(alloy::primitives::hex::encode_prefixed(&record.raw_data))
        .bind(event.event.fields_json())
        .bind(event.timestamp)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((event_id,)) = inserted else {
            tx.rollback().await?;
            let (event_id,): (i64,) = sqlx::query_as(
                "SELECT id FROM events WHERE network_id = $1 AND tx_hash = $2 AND log_index = $3",
            )
            .bind(record.network.network_id())
            .bind(&tx_hash)
            .bind(event.log_index as i64)
            .fetch_one(&self.pool)
            .await?;

            tracing::debug!(tx_hash = %tx_hash, log_index = event.log_index, "Event already stored");
            return Ok(PersistOutcome {
                created: false,
                event_id,
            });
        };

        if let Some(projection) = projections::projection_for(&event.event) {
            projections::apply(&mut *tx, event_id, record, &projection).await?;
        }
        for observation in addresses::observations(event) {
            addresses::upsert(&mut *tx, &observation).await?;
        }

        tx.commit().await?;

        Ok(PersistOutcome {
            created: true,
            event_id,
        })
    }

    async fn advance_cursor(
        &self,
        network: Network,
        contract_id: i64,
        block: u64,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO indexer_state (network_id, contract_id, last_indexed_block, status, last_indexed_at)
            VALUES ($1, $2, $3, 'running', NOW())
            ON CONFLICT (network_id, contract_id) DO UPDATE SET
                last_indexed_block = GREATEST(indexer_state.last_indexed_block, EXCLUDED.last_indexed_block),
                status = 'running',
                last_indexed_at = NOW()
            "#,
        )
        .bind(network.network_id())
        .bind(contract_id)
        .bind(block as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_stopped(&self, network: Network, contract_id: i64) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE indexer_state SET status = 'stopped' WHERE network_id = $1 AND contract_id = $2",
        )
        .bind(network.network_id())
        .bind(contract_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn address_activity(&self, address: &str) -> Result<Option<AddressActivity>, AppError> {
        let row: Option<(String, i64, i64, chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>, i64)> =
            sqlx::query_as(
                r#"
                SELECT address, first_seen_block, last_seen_block, first_seen_at, last_seen_at, interaction_count
                FROM addresses WHERE address = $1
                "#,
            )
            .bind(address.to_ascii_lowercase())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(
            |(address, first_block, last_block, first_at, last_at, count)| AddressActivity {
                address,
                first_seen_block: first_block as u64,
                last_seen_block: last_block as u64,
                first_seen_at: first_at,
                last_seen_at: last_at,
                interaction_count: count as u64,
            },
        ))
    }
}

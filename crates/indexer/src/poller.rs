use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use comet_chain::{ChainDataClient, ChainError, unix_to_datetime};
use comet_common::config::AppConfig;
use comet_common::contracts::{TrackedContract, tracked_contracts};
use comet_common::types::{Network, RawLog};
use comet_decoders::DecoderRegistry;

use crate::cursor::{BlockRange, chunk_range, start_block};
use crate::store::{EventRecord, IndexStore};

#[derive(Debug, Clone)]
pub struct IndexerSettings {
    /// Wait between height checks once caught up.
    pub poll_interval: Duration,
    /// Wait before retrying after a failed batch.
    pub retry_delay: Duration,
    /// Where to start a contract that has no cursor yet.
    pub start_block: Option<u64>,
}

impl IndexerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.indexer_poll_interval_ms),
            retry_delay: Duration::from_millis(config.indexer_retry_delay_ms),
            start_block: config.indexer_start_block,
        }
    }
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(12),
            retry_delay: Duration::from_secs(5),
            start_block: None,
        }
    }
}

/// A tracked contract with its id in the store.
#[derive(Debug, Clone)]
struct ScannedContract {
    contract: TrackedContract,
    id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncOutcome {
    CaughtUp { height: u64 },
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeStats {
    pub logs: usize,
    pub created: usize,
    pub duplicates: usize,
    pub unrecognized: usize,
}

/// Incremental log scanner.
///
/// Walks each scanned contract from its cursor to the current head in sub-ranges no
/// wider than the client's span limit. A sub-range is fetched, decoded and persisted,
/// then the cursor moves to its last block. A failure anywhere in a sub-range leaves
/// the cursor where it was and retries the same range after `retry_delay`.
pub struct Indexer {
    network: Network,
    client: Arc<dyn ChainDataClient>,
    store: Arc<dyn IndexStore>,
    decoders: DecoderRegistry,
    settings: IndexerSettings,
    contracts: Vec<TrackedContract>,
}

impl Indexer {
    pub fn new(
        network: Network,
        client: Arc<dyn ChainDataClient>,
        store: Arc<dyn IndexStore>,
        settings: IndexerSettings,
    ) -> Self {
        Self {
            network,
            client,
            store,
            decoders: DecoderRegistry::new(),
            settings,
            contracts: tracked_contracts(network),
        }
    }

    /// Replace the network's tracked-contract table.
    pub fn with_contracts(mut self, contracts: Vec<TrackedContract>) -> Self {
        self.contracts = contracts;
        self
    }

    /// Run until `cancel` fires. The sub-range in flight always completes first.
    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let scanned = self.register_contracts().await?;

        tracing::info!(
            network = %self.network,
            contracts = scanned.len(),
            max_block_span = self.client.max_block_span(),
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            "Indexer started"
        );

        loop {
            let wait = match self.sync(&scanned, &cancel).await {
                Ok(SyncOutcome::Cancelled) => break,
                Ok(SyncOutcome::CaughtUp { height }) => {
                    tracing::debug!(height, "Caught up, waiting for new blocks");
                    self.settings.poll_interval
                }
                Err(e) => {
                    match e.downcast_ref::<ChainError>() {
                        Some(ChainError::RangeTooWide { .. }) => {
                            tracing::error!(error = %e, "Batch rejected by chain client");
                        }
                        _ => tracing::warn!(
                            error = %e,
                            retry_in_ms = self.settings.retry_delay.as_millis() as u64,
                            "Batch failed, backing off"
                        ),
                    }
                    self.settings.retry_delay
                }
            };

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        for contract in &scanned {
            if let Err(e) = self.store.mark_stopped(self.network, contract.id).await {
                tracing::warn!(contract = contract.contract.name, error = %e, "Failed to mark cursor stopped");
            }
        }

        tracing::info!(network = %self.network, "Indexer stopped");
        Ok(())
    }

    /// Register every tracked contract and return the ones that are scanned.
    async fn register_contracts(&self) -> anyhow::Result<Vec<ScannedContract>> {
        let mut scanned = Vec::new();
        for contract in &self.contracts {
            let id = self.store.register_contract(self.network, contract).await?;
            tracing::debug!(
                contract = contract.name,
                address = %contract.address,
                kind = %contract.kind,
                id,
                "Registered contract"
            );
            if contract.kind.is_scanned() {
                scanned.push(ScannedContract {
                    contract: contract.clone(),
                    id,
                });
            }
        }
        Ok(scanned)
    }

    /// One pass over every scanned contract, up to the current head.
    async fn sync(
        &self,
        scanned: &[ScannedContract],
        cancel: &CancellationToken,
    ) -> anyhow::Result<SyncOutcome> {
        let height = self.client.current_height().await?;

        for contract in scanned {
            let cursor = self.store.last_indexed_block(self.network, contract.id).await?;
            let next = start_block(cursor, contract.contract.deploy_block, self.settings.start_block);
            if next > height {
                continue;
            }

            tracing::info!(
                contract = contract.contract.name,
                from = next,
                to = height,
                "Scanning contract"
            );

            for range in chunk_range(next, height, self.client.max_block_span()) {
                if cancel.is_cancelled() {
                    return Ok(SyncOutcome::Cancelled);
                }

                let stats = self.index_range(contract, range).await?;
                if stats.logs > 0 {
                    tracing::info!(
                        contract = contract.contract.name,
                        range = %range,
                        logs = stats.logs,
                        created = stats.created,
                        duplicates = stats.duplicates,
                        unrecognized = stats.unrecognized,
                        "Indexed block range"
                    );
                }
            }
        }

        Ok(SyncOutcome::CaughtUp { height })
    }

    /// Fetch, decode and persist one sub-range, then advance the cursor to its end.
    async fn index_range(
        &self,
        contract: &ScannedContract,
        range: BlockRange,
    ) -> anyhow::Result<RangeStats> {
        let logs = self
            .client
            .logs(contract.contract.address, range.from, range.to)
            .await?;

        let mut stats = RangeStats {
            logs: logs.len(),
            ..Default::default()
        };
        let mut timestamps: HashMap<u64, DateTime<Utc>> = HashMap::new();

        for log in &logs {
            let timestamp = self.block_timestamp(&mut timestamps, log).await?;
            let event = self.decoders.decode(log, timestamp);
            if !event.is_recognized() {
                stats.unrecognized += 1;
                continue;
            }

            let record = EventRecord::new(self.network, contract.id, log, event);
            let outcome = self.store.persist_event(&record).await?;
            if outcome.created {
                stats.created += 1;
            } else {
                stats.duplicates += 1;
            }
        }

        self.store
            .advance_cursor(self.network, contract.id, range.to)
            .await?;

        Ok(stats)
    }

    /// Timestamp for the log's block, fetched at most once per block.
    async fn block_timestamp(
        &self,
        cache: &mut HashMap<u64, DateTime<Utc>>,
        log: &RawLog,
    ) -> anyhow::Result<DateTime<Utc>> {
        if let Some(seconds) = log.block_timestamp {
            return Ok(unix_to_datetime(seconds));
        }
        if let Some(timestamp) = cache.get(&log.block_number) {
            return Ok(*timestamp);
        }

        let block = self
            .client
            .block(log.block_number)
            .await?
            .ok_or_else(|| ChainError::Provider(format!("block {} not found", log.block_number)))?;
        let timestamp = block.datetime();
        cache.insert(log.block_number, timestamp);
        Ok(timestamp)
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Address, B256, Bytes};
    use comet_common::types::hex_address;

    use super::*;
    use crate::memory::MemoryStore;
    use crate::test_utils::{MockChainClient, market, supply_log};

    const NETWORK: Network = Network::Sepolia;

    fn contract_address() -> Address {
        Address::repeat_byte(0xCC)
    }

    fn user(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    fn indexer(client: Arc<MockChainClient>, store: Arc<MemoryStore>) -> Indexer {
        Indexer::new(NETWORK, client, store, IndexerSettings::default())
            .with_contracts(vec![market(contract_address(), 100)])
    }

    fn sample_logs() -> Vec<RawLog> {
        let c = contract_address();
        vec![
            supply_log(c, 101, 0x01, 0, user(1), user(2)),
            supply_log(c, 110, 0x02, 0, user(1), user(3)),
            supply_log(c, 110, 0x02, 1, user(3), user(3)),
            supply_log(c, 119, 0x03, 4, user(2), user(1)),
        ]
    }

    #[tokio::test]
    async fn test_sync_chunks_and_advances_cursor() {
        let client = Arc::new(MockChainClient::new(120, sample_logs()));
        let store = Arc::new(MemoryStore::new());
        let indexer = indexer(client.clone(), store.clone());

        let scanned = indexer.register_contracts().await.unwrap();
        let outcome = indexer.sync(&scanned, &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome, SyncOutcome::CaughtUp { height: 120 });
        assert_eq!(client.log_calls(), vec![(100, 108), (109, 117), (118, 120)]);
        assert_eq!(store.last_indexed_block(NETWORK, scanned[0].id).await.unwrap(), Some(120));
        assert_eq!(store.event_count(), 4);
        // One block lookup per distinct block
        assert_eq!(client.block_calls(), 3);
    }

    #[tokio::test]
    async fn test_resume_from_cursor() {
        let client = Arc::new(MockChainClient::new(120, sample_logs()));
        let store = Arc::new(MemoryStore::new());
        let indexer = indexer(client.clone(), store.clone());
        let scanned = indexer.register_contracts().await.unwrap();

        indexer.sync(&scanned, &CancellationToken::new()).await.unwrap();
        client.set_height(125);
        indexer.sync(&scanned, &CancellationToken::new()).await.unwrap();

        assert_eq!(client.log_calls().last(), Some(&(121, 125)));
        assert_eq!(store.event_count(), 4);
    }

    #[tokio::test]
    async fn test_rescanning_a_range_is_idempotent() {
        let client = Arc::new(MockChainClient::new(120, sample_logs()));
        let store = Arc::new(MemoryStore::new());
        let indexer = indexer(client, store.clone());
        let scanned = indexer.register_contracts().await.unwrap();
        let range = BlockRange { from: 109, to: 117 };

        let first = indexer.index_range(&scanned[0], range).await.unwrap();
        let before = store.address_activity(&hex_address(&user(3))).await.unwrap();
        let second = indexer.index_range(&scanned[0], range).await.unwrap();
        let after = store.address_activity(&hex_address(&user(3))).await.unwrap();

        assert_eq!(first.created, 2);
        assert_eq!(second.created, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(store.event_count(), 2);
        assert_eq!(before, after);
        // dst on the first log, from and dst on the second
        assert_eq!(after.unwrap().interaction_count, 3);
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_cursor() {
        let client = Arc::new(MockChainClient::new(120, sample_logs()));
        client.fail_logs_call(1);
        let store = Arc::new(MemoryStore::new());
        let indexer = indexer(client.clone(), store.clone());
        let scanned = indexer.register_contracts().await.unwrap();

        let result = indexer.sync(&scanned, &CancellationToken::new()).await;
        assert!(result.is_err());
        assert_eq!(store.last_indexed_block(NETWORK, scanned[0].id).await.unwrap(), Some(108));
        assert_eq!(store.event_count(), 1);

        indexer.sync(&scanned, &CancellationToken::new()).await.unwrap();
        assert_eq!(client.log_calls(), vec![(100, 108), (109, 117), (109, 117), (118, 120)]);
        assert_eq!(store.last_indexed_block(NETWORK, scanned[0].id).await.unwrap(), Some(120));
        assert_eq!(store.event_count(), 4);
    }

    #[tokio::test]
    async fn test_unrecognized_logs_are_skipped() {
        let unknown = RawLog {
            contract_address: contract_address(),
            topics: vec![B256::repeat_byte(0xEE)],
            data: Bytes::new(),
            block_number: 105,
            transaction_hash: B256::repeat_byte(0x09),
            log_index: 0,
            block_timestamp: Some(1_700_000_000),
        };
        let client = Arc::new(MockChainClient::new(108, vec![unknown]));
        let store = Arc::new(MemoryStore::new());
        let indexer = indexer(client.clone(), store.clone());
        let scanned = indexer.register_contracts().await.unwrap();

        let stats = indexer
            .index_range(&scanned[0], BlockRange { from: 100, to: 108 })
            .await
            .unwrap();

        assert_eq!(stats.unrecognized, 1);
        assert_eq!(store.event_count(), 0);
        assert_eq!(store.last_indexed_block(NETWORK, scanned[0].id).await.unwrap(), Some(108));
        // Timestamp came with the log
        assert_eq!(client.block_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_sync_does_nothing() {
        let client = Arc::new(MockChainClient::new(120, sample_logs()));
        let store = Arc::new(MemoryStore::new());
        let indexer = indexer(client.clone(), store);
        let scanned = indexer.register_contracts().await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = indexer.sync(&scanned, &cancel).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Cancelled);
        assert!(client.log_calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_range_finishes_that_range() {
        let client = Arc::new(MockChainClient::new(120, sample_logs()));
        let store = Arc::new(MemoryStore::new());
        let indexer = indexer(client.clone(), store.clone());
        let scanned = indexer.register_contracts().await.unwrap();

        let cancel = CancellationToken::new();
        client.cancel_during_logs_call(1, cancel.clone());

        let outcome = indexer.sync(&scanned, &cancel).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Cancelled);
        assert_eq!(client.log_calls(), vec![(100, 108), (109, 117)]);
        assert_eq!(store.last_indexed_block(NETWORK, scanned[0].id).await.unwrap(), Some(117));
        // Logs at blocks 101, 110, 110 were persisted, 119 was not reached
        assert_eq!(store.event_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let client = Arc::new(MockChainClient::new(120, sample_logs()));
        let store = Arc::new(MemoryStore::new());
        let indexer = Arc::new(indexer(client, store.clone()));

        let cancel = CancellationToken::new();
        let handle = {
            let indexer = indexer.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { indexer.run(cancel).await })
        };

        // Caught up and waiting on the 12 s poll interval
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        let contract_id = indexer.register_contracts().await.unwrap()[0].id;
        let cursor = store.cursor(NETWORK, contract_id).unwrap();
        assert_eq!(cursor.last_indexed_block, 120);
        assert!(cursor.stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_backs_off_and_retries_same_range() {
        let client = Arc::new(MockChainClient::new(120, sample_logs()));
        client.fail_logs_call(0);
        let store = Arc::new(MemoryStore::new());
        let indexer = Arc::new(indexer(client.clone(), store.clone()));

        let cancel = CancellationToken::new();
        let handle = {
            let indexer = indexer.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { indexer.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(client.log_calls(), vec![(100, 108)]);

        tokio::time::sleep(Duration::from_secs(2)).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        let calls = client.log_calls();
        assert_eq!(calls[0], (100, 108));
        assert_eq!(calls[1], (100, 108));
        assert_eq!(store.event_count(), 4);
    }
}

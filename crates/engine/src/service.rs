//! Read-path queries over the explorer API.
//!
//! Every query answers from a bounded recent window: the last few hundred
//! transactions sent to the market and the logs it emitted within the configured
//! block lookback. Listing and stats queries go through the [`QueryCache`] so that
//! client bursts do not turn into explorer bursts.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use alloy::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use serde::Serialize;

use comet_chain::{
    ExplorerApi, ExplorerClient, LogQuery, RateLimiter, SortOrder, TransactionInfo,
    unix_to_datetime,
};
use comet_common::config::AppConfig;
use comet_common::contracts::{TrackedContract, primary_market};
use comet_common::error::AppError;
use comet_common::types::{
    ContractTransaction, DecodedEvent, EventKind, Network, RawLog, hex_address,
};
use comet_decoders::DecoderRegistry;

use crate::cache::{QueryCache, QueryClass};
use crate::range::{DateRange, RangeReport, aggregate};

/// Size of the recent windows the derived queries work from.
pub const DEFAULT_WINDOW: usize = 500;

/// Largest page the explorer returns for `logs/getLogs`.
const LOGS_PAGE_SIZE: u32 = 1000;

const MAX_WINDOW_NARROWINGS: usize = 8;

const UNIQUE_ADDRESS_SAMPLE: u32 = 200;
const STATS_SAMPLE: usize = 100;
const STATS_RECENT: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct QuerySettings {
    /// How many blocks back from the tip recent-event queries look.
    pub lookback_blocks: u64,
    pub window: usize,
}

impl QuerySettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            lookback_blocks: config.query_lookback_blocks,
            window: DEFAULT_WINDOW,
        }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            lookback_blocks: 600_000,
            window: DEFAULT_WINDOW,
        }
    }
}

/// Recent events that name one address, grouped by what happened.
#[derive(Debug, Clone, Serialize)]
pub struct AddressEvents {
    pub address: String,
    pub total_events: usize,
    pub events: Vec<DecodedEvent>,
    pub supplies: Vec<DecodedEvent>,
    pub withdraws: Vec<DecodedEvent>,
    pub liquidations: Vec<DecodedEvent>,
    pub transfers: Vec<DecodedEvent>,
}

impl AddressEvents {
    fn group(address: String, events: Vec<DecodedEvent>) -> Self {
        let of = |kinds: &[EventKind]| -> Vec<DecodedEvent> {
            events
                .iter()
                .filter(|e| e.event.kind().is_some_and(|k| kinds.contains(&k)))
                .cloned()
                .collect()
        };

        Self {
            supplies: of(&[EventKind::Supply, EventKind::SupplyCollateral]),
            withdraws: of(&[EventKind::Withdraw, EventKind::WithdrawCollateral]),
            liquidations: of(&[EventKind::AbsorbCollateral, EventKind::AbsorbDebt]),
            transfers: of(&[EventKind::Transfer, EventKind::TransferCollateral]),
            total_events: events.len(),
            address,
            events,
        }
    }
}

/// A sender seen in the recent transaction window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressSummary {
    pub address: String,
    pub tx_count: usize,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContractStats {
    pub total_transactions: usize,
    pub total_events: usize,
    pub unique_addresses: usize,
    /// Recognized events only.
    pub event_counts: BTreeMap<String, usize>,
    pub recent_transactions: Vec<ContractTransaction>,
    pub recent_events: Vec<DecodedEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionDetails {
    pub transaction: TransactionInfo,
    pub timestamp: Option<DateTime<Utc>>,
    pub status: bool,
    pub gas_used: u64,
    /// Logs the market emitted in this transaction.
    pub events: Vec<DecodedEvent>,
}

/// Read-side query facade for one market.
pub struct QueryService {
    explorer: Arc<dyn ExplorerApi>,
    cache: Arc<QueryCache>,
    decoders: DecoderRegistry,
    market: Address,
    settings: QuerySettings,
}

impl QueryService {
    pub fn new(
        explorer: Arc<dyn ExplorerApi>,
        cache: Arc<QueryCache>,
        market: Address,
        settings: QuerySettings,
    ) -> Self {
        Self {
            explorer,
            cache,
            decoders: DecoderRegistry::new(),
            market,
            settings,
        }
    }

    /// Service for the network's primary market.
    pub fn for_network(
        network: Network,
        explorer: Arc<dyn ExplorerApi>,
        cache: Arc<QueryCache>,
        settings: QuerySettings,
    ) -> Result<Self, AppError> {
        let TrackedContract { address, .. } = primary_market(network)
            .ok_or_else(|| AppError::Config(format!("no market tracked on {network}")))?;
        Ok(Self::new(explorer, cache, address, settings))
    }

    /// Explorer-backed service built from configuration. `limiter` should be the one
    /// shared with every other upstream client in the process.
    pub fn from_config(
        network: Network,
        config: &AppConfig,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, AppError> {
        let explorer = ExplorerClient::new(
            config.explorer_api_url.clone(),
            config.explorer_api_key.clone(),
            network,
            limiter,
            config.indexer_batch_size,
        )?;
        Self::for_network(
            network,
            Arc::new(explorer),
            Arc::new(QueryCache::new()),
            QuerySettings::from_config(config),
        )
    }

    pub fn market(&self) -> Address {
        self.market
    }

    /// Most recent events first, up to `limit`.
    pub async fn recent_events(&self, limit: usize) -> Result<Arc<Vec<DecodedEvent>>, AppError> {
        let key = format!("recent_events_{limit}");
        self.cache
            .get_or_compute(&key, QueryClass::List.ttl(), || async {
                let mut events = self.fetch_recent_events(None).await?;
                events.truncate(limit);
                Ok::<_, AppError>(events)
            })
            .await
    }

    /// Most recent events of one kind. `event_type` is matched case-insensitively.
    pub async fn events_by_type(
        &self,
        event_type: &str,
        limit: usize,
    ) -> Result<Arc<Vec<DecodedEvent>>, AppError> {
        let kind: EventKind = event_type.parse()?;
        let topic0 = self
            .decoders
            .topic0(kind)
            .ok_or_else(|| AppError::Validation(format!("Unknown event type: {event_type}")))?;

        let key = format!("events_{kind}_{limit}");
        self.cache
            .get_or_compute(&key, QueryClass::List.ttl(), || async {
                let mut events = self.fetch_recent_events(Some(topic0)).await?;
                events.truncate(limit);
                Ok::<_, AppError>(events)
            })
            .await
    }

    /// Recent events in which `address` appears as a participant.
    pub async fn address_activity(&self, address: &str) -> Result<AddressEvents, AppError> {
        let parsed: Address = address
            .trim()
            .parse()
            .map_err(|_| AppError::Validation(format!("invalid address: {address}")))?;

        let window = self.recent_events(self.settings.window).await?;
        let relevant: Vec<DecodedEvent> = window
            .iter()
            .filter(|event| event.involves(&parsed))
            .cloned()
            .collect();

        Ok(AddressEvents::group(hex_address(&parsed), relevant))
    }

    /// Senders in the recent transaction window, busiest first.
    pub async fn unique_addresses(
        &self,
        limit: usize,
    ) -> Result<Arc<Vec<AddressSummary>>, AppError> {
        let key = format!("unique_addresses_{limit}");
        self.cache
            .get_or_compute(&key, QueryClass::List.ttl(), || async {
                let transactions = self.contract_transactions(1, UNIQUE_ADDRESS_SAMPLE).await?;
                let mut summaries = summarize_senders(&transactions);
                summaries.truncate(limit);
                Ok::<_, AppError>(summaries)
            })
            .await
    }

    pub async fn contract_stats(&self) -> Result<Arc<ContractStats>, AppError> {
        self.cache
            .get_or_compute("contract_stats", QueryClass::Stats.ttl(), || async {
                let transactions = self.contract_transactions(1, STATS_SAMPLE as u32).await?;
                let events = self.recent_events(STATS_SAMPLE).await?;
                Ok::<_, AppError>(build_stats(&transactions, &events))
            })
            .await
    }

    /// Per-address activity between two dates.
    ///
    /// Dates are validated before any upstream call.
    pub async fn query_by_date_range(&self, start: &str, end: &str) -> Result<RangeReport, AppError> {
        let range = DateRange::parse(start, end)?;

        let transactions = self
            .contract_transactions(1, self.settings.window as u32)
            .await?;
        let events = self.recent_events(self.settings.window).await?;

        let report = aggregate(range, &transactions, &events);
        tracing::debug!(
            start = %range.start,
            end = %range.end,
            addresses = report.total_addresses,
            transactions = report.total_transactions,
            events = report.total_events,
            "Date range aggregated"
        );
        Ok(report)
    }

    /// One page of transactions sent to the market, newest first.
    pub async fn contract_transactions(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<Arc<Vec<ContractTransaction>>, AppError> {
        let page = page.max(1);
        let limit = limit.max(1);
        let sort = SortOrder::Desc;
        let key = format!("transactions_{page}_{limit}_{}", sort.as_str());

        self.cache
            .get_or_compute(&key, QueryClass::List.ttl(), || async {
                Ok::<_, AppError>(
                    self.explorer
                        .contract_transactions(self.market, page, limit, sort)
                        .await?,
                )
            })
            .await
    }

    /// Transaction, receipt and block for `hash`, with the market's events decoded.
    ///
    /// `None` when the explorer does not know the transaction.
    pub async fn transaction_details(
        &self,
        hash: &str,
    ) -> Result<Option<TransactionDetails>, AppError> {
        let hash: B256 = hash
            .trim()
            .parse()
            .map_err(|_| AppError::Validation(format!("invalid transaction hash: {hash}")))?;

        let Some(receipt) = self.explorer.receipt(hash).await? else {
            return Ok(None);
        };
        let Some(transaction) = self.explorer.transaction(hash).await? else {
            return Ok(None);
        };

        let block_number = transaction.block_number.or(receipt.block_number);
        let timestamp = match block_number {
            Some(number) => self.explorer.block(number).await?.map(|b| b.datetime()),
            None => None,
        };

        let events = receipt
            .logs
            .iter()
            .filter(|log| log.contract_address == self.market)
            .map(|log| {
                self.decoders
                    .decode(log, timestamp.unwrap_or(DateTime::UNIX_EPOCH))
            })
            .collect();

        Ok(Some(TransactionDetails {
            transaction,
            timestamp,
            status: receipt.status,
            gas_used: receipt.gas_used,
            events,
        }))
    }

    /// Decoded logs from the lookback window, newest first.
    ///
    /// The explorer returns the oldest page first, so a full page means newer logs
    /// were cut off. The window start is then halved toward the tip until a page
    /// comes back short or the narrowing budget runs out.
    async fn fetch_recent_events(&self, topic0: Option<B256>) -> Result<Vec<DecodedEvent>, AppError> {
        let height = self.explorer.current_height().await?;
        let mut from_block = height.saturating_sub(self.settings.lookback_blocks);
        let mut logs = self.fetch_log_page(from_block, topic0).await?;

        for _ in 0..MAX_WINDOW_NARROWINGS {
            if logs.len() < LOGS_PAGE_SIZE as usize {
                break;
            }
            let narrowed = from_block + (height - from_block) / 2;
            if narrowed == from_block {
                break;
            }
            let newer = self.fetch_log_page(narrowed, topic0).await?;
            if newer.is_empty() {
                break;
            }
            tracing::debug!(from_block = narrowed, height, "Log page full, narrowed window");
            from_block = narrowed;
            logs = newer;
        }

        let mut timestamps: HashMap<u64, DateTime<Utc>> = HashMap::new();
        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            let timestamp = self.log_timestamp(&mut timestamps, log).await?;
            events.push(self.decoders.decode(log, timestamp));
        }

        events.sort_by(|a, b| {
            b.block_number
                .cmp(&a.block_number)
                .then(b.log_index.cmp(&a.log_index))
        });

        tracing::debug!(
            from_block,
            height,
            logs = logs.len(),
            "Fetched recent market events"
        );
        Ok(events)
    }

    async fn fetch_log_page(
        &self,
        from_block: u64,
        topic0: Option<B256>,
    ) -> Result<Vec<RawLog>, AppError> {
        Ok(self
            .explorer
            .event_logs(&LogQuery {
                address: self.market,
                from_block,
                to_block: None,
                topic0,
                page: 1,
                offset: LOGS_PAGE_SIZE,
            })
            .await?)
    }

    async fn log_timestamp(
        &self,
        cache: &mut HashMap<u64, DateTime<Utc>>,
        log: &RawLog,
    ) -> Result<DateTime<Utc>, AppError> {
        if let Some(seconds) = log.block_timestamp {
            return Ok(unix_to_datetime(seconds));
        }
        if let Some(timestamp) = cache.get(&log.block_number) {
            return Ok(*timestamp);
        }

        let timestamp = self
            .explorer
            .block(log.block_number)
            .await?
            .map(|block| block.datetime())
            .unwrap_or(DateTime::UNIX_EPOCH);
        cache.insert(log.block_number, timestamp);
        Ok(timestamp)
    }
}

fn summarize_senders(transactions: &[ContractTransaction]) -> Vec<AddressSummary> {
    let mut by_sender: HashMap<Address, AddressSummary> = HashMap::new();
    for tx in transactions {
        by_sender
            .entry(tx.from)
            .and_modify(|summary| {
                summary.tx_count += 1;
                summary.first_seen = summary.first_seen.min(tx.timestamp);
                summary.last_seen = summary.last_seen.max(tx.timestamp);
            })
            .or_insert_with(|| AddressSummary {
                address: hex_address(&tx.from),
                tx_count: 1,
                first_seen: tx.timestamp,
                last_seen: tx.timestamp,
            });
    }

    let mut summaries: Vec<AddressSummary> = by_sender.into_values().collect();
    summaries.sort_by(|a, b| {
        b.tx_count
            .cmp(&a.tx_count)
            .then_with(|| a.address.cmp(&b.address))
    });
    summaries
}

fn build_stats(transactions: &[ContractTransaction], events: &[DecodedEvent]) -> ContractStats {
    let mut event_counts = BTreeMap::new();
    for event in events.iter().filter(|e| e.is_recognized()) {
        *event_counts.entry(event.event_name().to_string()).or_default() += 1;
    }

    let senders: HashSet<Address> = transactions.iter().map(|tx| tx.from).collect();

    ContractStats {
        total_transactions: transactions.len(),
        total_events: events.len(),
        unique_addresses: senders.len(),
        event_counts,
        recent_transactions: transactions.iter().take(STATS_RECENT).cloned().collect(),
        recent_events: events.iter().take(STATS_RECENT).cloned().collect(),
    }
}

//! In-memory [`IndexStore`] with the same write semantics as [`crate::store::PgStore`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;

use comet_common::contracts::TrackedContract;
use comet_common::error::AppError;
use comet_common::types::{Network, hex_address};

use crate::addresses::{self, AddressActivity};
use crate::projections::{self, Projection};
use crate::store::{EventRecord, IndexStore, PersistOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub table: &'static str,
    pub event_id: i64,
    pub network_id: i64,
    pub tx_hash: B256,
    pub addresses: BTreeMap<&'static str, Address>,
    pub amounts: BTreeMap<&'static str, U256>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorState {
    pub last_indexed_block: u64,
    pub stopped: bool,
}

#[derive(Default)]
struct Inner {
    contracts: HashMap<(i64, Address), i64>,
    events: BTreeMap<(i64, B256, u64), (i64, EventRecord)>,
    rows: Vec<StoredRow>,
    addresses: HashMap<String, AddressActivity>,
    cursors: HashMap<(i64, i64), CursorState>,
    next_id: i64,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::StorageUnavailable("memory store lock poisoned".into()))
    }

    pub fn event_count(&self) -> usize {
        self.lock().map(|inner| inner.events.len()).unwrap_or_default()
    }

    pub fn events(&self) -> Vec<EventRecord> {
        self.lock()
            .map(|inner| inner.events.values().map(|(_, r)| r.clone()).collect())
            .unwrap_or_default()
    }

    pub fn rows(&self, table: &str) -> Vec<StoredRow> {
        self.lock()
            .map(|inner| inner.rows.iter().filter(|r| r.table == table).cloned().collect())
            .unwrap_or_default()
    }

    pub fn cursor(&self, network: Network, contract_id: i64) -> Option<CursorState> {
        self.lock()
            .ok()
            .and_then(|inner| inner.cursors.get(&(network.network_id(), contract_id)).cloned())
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn register_contract(
        &self,
        network: Network,
        contract: &TrackedContract,
    ) -> Result<i64, AppError> {
        let mut inner = self.lock()?;
        let key = (network.network_id(), contract.address);
        if let Some(id) = inner.contracts.get(&key) {
            return Ok(*id);
        }
        let id = inner.next_id();
        inner.contracts.insert(key, id);
        Ok(id)
    }

    async fn last_indexed_block(
        &self,
        network: Network,
        contract_id: i64,
    ) -> Result<Option<u64>, AppError> {
        let inner = self.lock()?;
        Ok(inner
            .cursors
            .get(&(network.network_id(), contract_id))
            .map(|cursor| cursor.last_indexed_block))
    }

    async fn persist_event(&self, record: &EventRecord) -> Result<PersistOutcome, AppError> {
        let mut inner = self.lock()?;
        let key = record.natural_key();

        if let Some((event_id, _)) = inner.events.get(&key) {
            return Ok(PersistOutcome {
                created: false,
                event_id: *event_id,
            });
        }

        let event_id = inner.next_id();
        inner.events.insert(key, (event_id, record.clone()));

        let network_id = record.network.network_id();
        let tx_hash = record.event.transaction_hash;
        match projections::projection_for(&record.event.event) {
            Some(Projection::Insert(row)) => inner.rows.push(StoredRow {
                table: row.table,
                event_id,
                network_id,
                tx_hash,
                addresses: row.addresses.into_iter().collect(),
                amounts: row.amounts.into_iter().collect(),
            }),
            Some(Projection::LiquidationDebt {
                borrower,
                base_paid_out,
                usd_value,
            }) => {
                if let Some(liquidation) = inner.rows.iter_mut().find(|row| {
                    row.table == "liquidation_events"
                        && row.network_id == network_id
                        && row.tx_hash == tx_hash
                        && row.addresses.get("borrower_address") == Some(&borrower)
                }) {
                    liquidation.amounts.insert("base_paid_out", base_paid_out);
                    liquidation.amounts.insert("base_usd_value", usd_value);
                }
            }
            None => {}
        }

        for observation in addresses::observations(&record.event) {
            inner
                .addresses
                .entry(hex_address(&observation.address))
                .and_modify(|activity| activity.observe(&observation))
                .or_insert_with(|| AddressActivity::first(&observation));
        }

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
        let mut inner = self.lock()?;
        let cursor = inner
            .cursors
            .entry((network.network_id(), contract_id))
            .or_insert(CursorState {
                last_indexed_block: block,
                stopped: false,
            });
        cursor.last_indexed_block = cursor.last_indexed_block.max(block);
        cursor.stopped = false;
        Ok(())
    }

    async fn mark_stopped(&self, network: Network, contract_id: i64) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        if let Some(cursor) = inner.cursors.get_mut(&(network.network_id(), contract_id)) {
            cursor.stopped = true;
        }
        Ok(())
    }

    async fn address_activity(&self, address: &str) -> Result<Option<AddressActivity>, AppError> {
        let inner = self.lock()?;
        Ok(inner.addresses.get(&address.to_ascii_lowercase()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use comet_common::types::{CometEvent, DecodedEvent, RawLog};

    use super::*;

    const NETWORK: Network = Network::Sepolia;

    fn ts(block: u64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + block as i64 * 12, 0).unwrap()
    }

    fn record(event: CometEvent, block: u64, tx: u8, log_index: u64) -> EventRecord {
        let log = RawLog {
            contract_address: Address::repeat_byte(0xCC),
            topics: vec![B256::repeat_byte(0x01)],
            data: Default::default(),
            block_number: block,
            transaction_hash: B256::repeat_byte(tx),
            log_index,
            block_timestamp: None,
        };
        let decoded = DecodedEvent {
            event,
            contract_address: log.contract_address,
            block_number: block,
            transaction_hash: log.transaction_hash,
            log_index,
            timestamp: ts(block),
        };
        EventRecord::new(NETWORK, 1, &log, decoded)
    }

    fn supply(from: Address, dst: Address) -> CometEvent {
        CometEvent::Supply {
            from,
            dst,
            amount: U256::from(1_000u64),
        }
    }

    #[tokio::test]
    async fn test_duplicate_natural_key_is_absorbed() {
        let store = MemoryStore::new();
        let x = Address::repeat_byte(0x0A);
        let rec = record(supply(x, x), 10, 0x11, 0);

        let first = store.persist_event(&rec).await.unwrap();
        let second = store.persist_event(&rec).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.event_id, second.event_id);
        assert_eq!(store.event_count(), 1);
        assert_eq!(store.rows("supply_events").len(), 1);

        let activity = store.address_activity(&hex_address(&x)).await.unwrap().unwrap();
        // from and dst both name x on the single created event
        assert_eq!(activity.interaction_count, 2);
    }

    #[tokio::test]
    async fn test_address_widening_out_of_order() {
        let store = MemoryStore::new();
        let x = Address::repeat_byte(0x0A);
        let y = Address::repeat_byte(0x0B);

        store.persist_event(&record(supply(x, y), 100, 0x01, 0)).await.unwrap();
        store.persist_event(&record(supply(x, y), 50, 0x02, 0)).await.unwrap();

        let activity = store.address_activity(&hex_address(&x)).await.unwrap().unwrap();
        assert_eq!(activity.first_seen_block, 50);
        assert_eq!(activity.last_seen_block, 100);
        assert_eq!(activity.interaction_count, 2);
    }

    #[tokio::test]
    async fn test_debt_leg_without_collateral_is_noop() {
        let store = MemoryStore::new();
        let debt = CometEvent::AbsorbDebt {
            absorber: Address::repeat_byte(0x01),
            borrower: Address::repeat_byte(0x02),
            base_paid_out: U256::from(5u64),
            usd_value: U256::from(6u64),
        };

        let outcome = store.persist_event(&record(debt, 10, 0x33, 1)).await.unwrap();

        assert!(outcome.created);
        assert!(store.rows("liquidation_events").is_empty());
    }

    #[tokio::test]
    async fn test_debt_leg_completes_liquidation() {
        let store = MemoryStore::new();
        let absorber = Address::repeat_byte(0x01);
        let borrower = Address::repeat_byte(0x02);

        let collateral = CometEvent::AbsorbCollateral {
            absorber,
            borrower,
            asset: Address::repeat_byte(0x03),
            collateral_absorbed: U256::from(100u64),
            usd_value: U256::from(200u64),
        };
        let debt = CometEvent::AbsorbDebt {
            absorber,
            borrower,
            base_paid_out: U256::from(300u64),
            usd_value: U256::from(301u64),
        };

        store.persist_event(&record(collateral, 10, 0x44, 0)).await.unwrap();
        store.persist_event(&record(debt, 10, 0x44, 1)).await.unwrap();

        let rows = store.rows("liquidation_events");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amounts.get("base_paid_out"), Some(&U256::from(300u64)));
        assert_eq!(rows[0].amounts.get("collateral_absorbed"), Some(&U256::from(100u64)));
    }

    #[tokio::test]
    async fn test_cursor_never_moves_backwards() {
        let store = MemoryStore::new();
        store.advance_cursor(NETWORK, 1, 120).await.unwrap();
        store.advance_cursor(NETWORK, 1, 100).await.unwrap();

        assert_eq!(store.last_indexed_block(NETWORK, 1).await.unwrap(), Some(120));

        store.mark_stopped(NETWORK, 1).await.unwrap();
        assert!(store.cursor(NETWORK, 1).unwrap().stopped);
    }
}

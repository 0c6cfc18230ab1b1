//! Integration tests for PgStore persistence, projections and address rollups.
//!
//! These tests require a running PostgreSQL database and the `DATABASE_URL`
//! environment variable to be set. Run with:
//!
//! ```bash
//! DATABASE_URL="postgresql://..." cargo test -p comet-indexer --test integration -- --ignored --nocapture
//! ```

use alloy::primitives::{Address, B256, Bytes, U256};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use comet_common::contracts::{ContractKind, TrackedContract};
use comet_common::types::{CometEvent, DecodedEvent, Network, RawLog, hex_address};
use comet_indexer::store::{EventRecord, IndexStore, PgStore};

const NETWORK: Network = Network::Sepolia;

/// Create a PgStore and register one market contract.
async fn setup(pool: &PgPool) -> (PgStore, i64) {
    let store = PgStore::new(pool.clone());
    let contract = TrackedContract {
        name: "cWETHv3",
        address: Address::repeat_byte(0xCC),
        kind: ContractKind::Market,
        base_token: None,
        deploy_block: 100,
    };
    let id = store.register_contract(NETWORK, &contract).await.unwrap();
    (store, id)
}

fn make_record(contract_id: i64, event: CometEvent, block: u64, tx: u8, log_index: u64) -> EventRecord {
    let log = RawLog {
        contract_address: Address::repeat_byte(0xCC),
        topics: vec![B256::repeat_byte(0x01), B256::repeat_byte(0x02)],
        data: Bytes::from(vec![0u8; 32]),
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
        timestamp: DateTime::<Utc>::from_timestamp(1_700_000_000 + block as i64 * 12, 0).unwrap(),
    };
    EventRecord::new(NETWORK, contract_id, &log, decoded)
}

fn supply(from: Address, dst: Address) -> CometEvent {
    CometEvent::Supply {
        from,
        dst,
        amount: U256::from(1_000_000_000_000_000_000u128),
    }
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore] // Requires DATABASE_URL; run explicitly with --ignored
async fn test_persist_is_idempotent(pool: PgPool) {
    let (store, contract_id) = setup(&pool).await;
    let x = Address::repeat_byte(0x0A);
    let y = Address::repeat_byte(0x0B);
    let record = make_record(contract_id, supply(x, y), 120, 0x11, 0);

    let first = store.persist_event(&record).await.unwrap();
    let second = store.persist_event(&record).await.unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.event_id, second.event_id);

    let events: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM events")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(events.0, 1, "Expected exactly one event row");

    let supplies: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM supply_events")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(supplies.0, 1, "Expected exactly one projection row");

    let amount: (String,) = sqlx::query_as("SELECT amount::text FROM supply_events")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(amount.0, "1000000000000000000");

    let activity = store.address_activity(&hex_address(&x)).await.unwrap().unwrap();
    assert_eq!(activity.interaction_count, 1, "Duplicate must not count again");
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore]
async fn test_address_widening(pool: PgPool) {
    let (store, contract_id) = setup(&pool).await;
    let x = Address::repeat_byte(0x0A);
    let y = Address::repeat_byte(0x0B);

    store
        .persist_event(&make_record(contract_id, supply(x, y), 100, 0x01, 0))
        .await
        .unwrap();
    store
        .persist_event(&make_record(contract_id, supply(x, y), 50, 0x02, 0))
        .await
        .unwrap();

    let activity = store.address_activity(&hex_address(&x)).await.unwrap().unwrap();
    assert_eq!(activity.first_seen_block, 50);
    assert_eq!(activity.last_seen_block, 100);
    assert_eq!(activity.interaction_count, 2);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore]
async fn test_liquidation_legs(pool: PgPool) {
    let (store, contract_id) = setup(&pool).await;
    let absorber = Address::repeat_byte(0x01);
    let borrower = Address::repeat_byte(0x02);
    let orphan_borrower = Address::repeat_byte(0x03);

    let collateral = CometEvent::AbsorbCollateral {
        absorber,
        borrower,
        asset: Address::repeat_byte(0x04),
        collateral_absorbed: U256::from(100u64),
        usd_value: U256::from(200u64),
    };
    let debt = CometEvent::AbsorbDebt {
        absorber,
        borrower,
        base_paid_out: U256::from(300u64),
        usd_value: U256::from(301u64),
    };
    let orphan_debt = CometEvent::AbsorbDebt {
        absorber,
        borrower: orphan_borrower,
        base_paid_out: U256::from(1u64),
        usd_value: U256::from(1u64),
    };

    store
        .persist_event(&make_record(contract_id, collateral, 200, 0x44, 0))
        .await
        .unwrap();
    store
        .persist_event(&make_record(contract_id, debt, 200, 0x44, 1))
        .await
        .unwrap();
    let orphan = store
        .persist_event(&make_record(contract_id, orphan_debt, 201, 0x45, 0))
        .await
        .unwrap();
    assert!(orphan.created, "The event itself is still stored");

    let rows: Vec<(String, Option<String>)> = sqlx::query_as(
        "SELECT borrower_address, base_paid_out::text FROM liquidation_events ORDER BY id",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert_eq!(rows.len(), 1, "Debt leg must never insert");
    assert_eq!(rows[0].0, hex_address(&borrower));
    assert_eq!(rows[0].1.as_deref(), Some("300"));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore]
async fn test_cursor_is_monotonic(pool: PgPool) {
    let (store, contract_id) = setup(&pool).await;

    assert_eq!(store.last_indexed_block(NETWORK, contract_id).await.unwrap(), None);

    store.advance_cursor(NETWORK, contract_id, 120).await.unwrap();
    store.advance_cursor(NETWORK, contract_id, 110).await.unwrap();
    assert_eq!(store.last_indexed_block(NETWORK, contract_id).await.unwrap(), Some(120));

    store.mark_stopped(NETWORK, contract_id).await.unwrap();
    let status: (String,) = sqlx::query_as(
        "SELECT status FROM indexer_state WHERE network_id = $1 AND contract_id = $2",
    )
    .bind(NETWORK.network_id())
    .bind(contract_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(status.0, "stopped");
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore]
async fn test_register_contract_is_stable(pool: PgPool) {
    let (store, contract_id) = setup(&pool).await;
    let contract = TrackedContract {
        name: "cWETHv3",
        address: Address::repeat_byte(0xCC),
        kind: ContractKind::Market,
        base_token: None,
        deploy_block: 100,
    };

    let again = store.register_contract(NETWORK, &contract).await.unwrap();
    assert_eq!(again, contract_id);
}

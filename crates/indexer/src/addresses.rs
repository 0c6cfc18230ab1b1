//! Per-address activity rollup.
//!
//! Every participant field of a newly created event is one observation. The rollup
//! keeps the widest `[first_seen, last_seen]` window seen so far and counts
//! observations, so replaying events in any order produces the same row.

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgConnection;

use comet_common::types::{DecodedEvent, hex_address};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressObservation {
    pub address: Address,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
}

/// One observation per participant field. An address named twice counts twice.
pub fn observations(event: &DecodedEvent) -> Vec<AddressObservation> {
    event
        .event
        .participants()
        .into_iter()
        .map(|(_, address)| AddressObservation {
            address,
            block_number: event.block_number,
            timestamp: event.timestamp,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressActivity {
    pub address: String,
    pub first_seen_block: u64,
    pub last_seen_block: u64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub interaction_count: u64,
}

impl AddressActivity {
    pub fn first(observation: &AddressObservation) -> Self {
        Self {
            address: hex_address(&observation.address),
            first_seen_block: observation.block_number,
            last_seen_block: observation.block_number,
            first_seen_at: observation.timestamp,
            last_seen_at: observation.timestamp,
            interaction_count: 1,
        }
    }

    /// Widen the window to include `observation` and count it.
    pub fn observe(&mut self, observation: &AddressObservation) {
        self.first_seen_block = self.first_seen_block.min(observation.block_number);
        self.last_seen_block = self.last_seen_block.max(observation.block_number);
        self.first_seen_at = self.first_seen_at.min(observation.timestamp);
        self.last_seen_at = self.last_seen_at.max(observation.timestamp);
        self.interaction_count += 1;
    }
}

/// SQL counterpart of [`AddressActivity::first`] / [`AddressActivity::observe`].
pub(crate) async fn upsert(
    conn: &mut PgConnection,
    observation: &AddressObservation,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO addresses (address, first_seen_block, last_seen_block, first_seen_at, last_seen_at, interaction_count)
        VALUES ($1, $2, $2, $3, $3, 1)
        ON CONFLICT (address) DO UPDATE SET
            first_seen_block = LEAST(addresses.first_seen_block, EXCLUDED.first_seen_block),
            last_seen_block = GREATEST(addresses.last_seen_block, EXCLUDED.last_seen_block),
            first_seen_at = LEAST(addresses.first_seen_at, EXCLUDED.first_seen_at),
            last_seen_at = GREATEST(addresses.last_seen_at, EXCLUDED.last_seen_at),
            interaction_count = addresses.interaction_count + 1
        "#,
    )
    .bind(hex_address(&observation.address))
    .bind(observation.block_number as i64)
    .bind(observation.timestamp)
    .execute(conn)
    .await?;

    Ok(())
}

//! Typed per-event tables.
//!
//! Each recognized event maps to at most one projection: an insert into its own table,
//! or for `AbsorbDebt` an update of the liquidation row written by the matching
//! `AbsorbCollateral` leg.

use alloy::primitives::{Address, U256};
use sqlx::PgConnection;

use comet_common::types::{CometEvent, hex_address};

use crate::store::EventRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionRow {
    pub table: &'static str,
    pub addresses: Vec<(&'static str, Address)>,
    pub amounts: Vec<(&'static str, U256)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Insert(ProjectionRow),
    /// Fill the debt leg of the liquidation for `borrower` in the same transaction.
    /// Never inserts.
    LiquidationDebt {
        borrower: Address,
        base_paid_out: U256,
        usd_value: U256,
    },
}

fn row(
    table: &'static str,
    addresses: Vec<(&'static str, Address)>,
    amounts: Vec<(&'static str, U256)>,
) -> Option<Projection> {
    Some(Projection::Insert(ProjectionRow {
        table,
        addresses,
        amounts,
    }))
}

pub fn projection_for(event: &CometEvent) -> Option<Projection> {
    match *event {
        CometEvent::Supply { from, dst, amount } => row(
            "supply_events",
            vec![("from_address", from), ("to_address", dst)],
            vec![("amount", amount)],
        ),
        CometEvent::Withdraw { src, to, amount } => row(
            "withdraw_events",
            vec![("src_address", src), ("to_address", to)],
            vec![("amount", amount)],
        ),
        CometEvent::SupplyCollateral {
            from,
            dst,
            asset,
            amount,
        } => row(
            "supply_collateral_events",
            vec![
                ("from_address", from),
                ("to_address", dst),
                ("asset_address", asset),
            ],
            vec![("amount", amount)],
        ),
        CometEvent::WithdrawCollateral {
            src,
            to,
            asset,
            amount,
        } => row(
            "withdraw_collateral_events",
            vec![
                ("src_address", src),
                ("to_address", to),
                ("asset_address", asset),
            ],
            vec![("amount", amount)],
        ),
        CometEvent::TransferCollateral {
            from,
            to,
            asset,
            amount,
        } => row(
            "transfer_collateral_events",
            vec![
                ("from_address", from),
                ("to_address", to),
                ("asset_address", asset),
            ],
            vec![("amount", amount)],
        ),
        CometEvent::AbsorbCollateral {
            absorber,
            borrower,
            asset,
            collateral_absorbed,
            usd_value,
        } => row(
            "liquidation_events",
            vec![
                ("absorber_address", absorber),
                ("borrower_address", borrower),
                ("collateral_asset", asset),
            ],
            vec![
                ("collateral_absorbed", collateral_absorbed),
                ("collateral_usd_value", usd_value),
            ],
        ),
        CometEvent::AbsorbDebt {
            borrower,
            base_paid_out,
            usd_value,
            ..
        } => Some(Projection::LiquidationDebt {
            borrower,
            base_paid_out,
            usd_value,
        }),
        CometEvent::BuyCollateral {
            buyer,
            asset,
            base_amount,
            collateral_amount,
        } => row(
            "buy_collateral_events",
            vec![("buyer_address", buyer), ("asset_address", asset)],
            vec![
                ("base_amount", base_amount),
                ("collateral_amount", collateral_amount),
            ],
        ),
        CometEvent::Transfer { from, to, amount } => row(
            "transfer_events",
            vec![("from_address", from), ("to_address", to)],
            vec![("amount", amount)],
        ),
        CometEvent::RewardClaimed {
            src,
            recipient,
            token,
            amount,
        } => row(
            "reward_claims",
            vec![
                ("src_address", src),
                ("recipient_address", recipient),
                ("token_address", token),
            ],
            vec![("amount", amount)],
        ),
        CometEvent::Unrecognized { .. } => None,
    }
}

/// Build the `INSERT` for a projection row. Amounts are bound as decimal text.
fn insert_sql(row: &ProjectionRow) -> String {
    let mut columns = vec!["event_id", "network_id", "contract_id", "tx_hash", "block_number"];
    let mut values: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();

    for (column, _) in &row.addresses {
        columns.push(*column);
        values.push(format!("${}", values.len() + 1));
    }
    for (column, _) in &row.amounts {
        columns.push(*column);
        values.push(format!("${}::numeric", values.len() + 1));
    }
    columns.push("timestamp");
    values.push(format!("${}", values.len() + 1));

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT (event_id) DO NOTHING",
        row.table,
        columns.join(", "),
        values.join(", ")
    )
}

/// Apply `projection` for a newly created event inside the caller's transaction.
pub(crate) async fn apply(
    conn: &mut PgConnection,
    event_id: i64,
    record: &EventRecord,
    projection: &Projection,
) -> Result<(), sqlx::Error> {
    let event = &record.event;
    let tx_hash = format!("{:#x}", event.transaction_hash);

    match projection {
        Projection::Insert(row) => {
            let sql = insert_sql(row);
            let mut query = sqlx::query(&sql)
                .bind(event_id)
                .bind(record.network.network_id())
                .bind(record.contract_id)
                .bind(&tx_hash)
                .bind(event.block_number as i64);
            for (_, address) in &row.addresses {
                query = query.bind(hex_address(address));
            }
            for (_, amount) in &row.amounts {
                query = query.bind(amount.to_string());
            }
            query.bind(event.timestamp).execute(&mut *conn).await?;
        }
        Projection::LiquidationDebt {
            borrower,
            base_paid_out,
            usd_value,
        } => {
            let result = sqlx::query(
                r#"
                UPDATE liquidation_events
                SET base_paid_out = $1::numeric, base_usd_value = $2::numeric
                WHERE network_id = $3 AND tx_hash = $4 AND borrower_address = $5
                "#,
            )
            .bind(base_paid_out.to_string())
            .bind(usd_value.to_string())
            .bind(record.network.network_id())
            .bind(&tx_hash)
            .bind(hex_address(borrower))
            .execute(&mut *conn)
            .await?;

            if result.rows_affected() == 0 {
                tracing::debug!(
                    tx_hash = %tx_hash,
                    borrower = %hex_address(borrower),
                    "AbsorbDebt without a collateral leg, nothing to update"
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supply_insert_sql() {
        let projection = projection_for(&CometEvent::Supply {
            from: Address::repeat_byte(1),
            dst: Address::repeat_byte(2),
            amount: U256::from(3),
        })
        .unwrap();

        let Projection::Insert(row) = projection else {
            panic!("expected insert");
        };
        assert_eq!(
            insert_sql(&row),
            "INSERT INTO supply_events (event_id, network_id, contract_id, tx_hash, block_number, \
             from_address, to_address, amount, timestamp) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8::numeric, $9) ON CONFLICT (event_id) DO NOTHING"
        );
    }

    #[test]
    fn test_absorb_debt_is_an_update() {
        let projection = projection_for(&CometEvent::AbsorbDebt {
            absorber: Address::repeat_byte(1),
            borrower: Address::repeat_byte(2),
            base_paid_out: U256::from(10),
            usd_value: U256::from(11),
        });
        assert!(matches!(
            projection,
            Some(Projection::LiquidationDebt { borrower, .. }) if borrower == Address::repeat_byte(2)
        ));
    }

    #[test]
    fn test_every_known_event_has_a_projection() {
        let a = Address::repeat_byte(9);
        let n = U256::from(1);
        let events = [
            CometEvent::Withdraw { src: a, to: a, amount: n },
            CometEvent::WithdrawCollateral { src: a, to: a, asset: a, amount: n },
            CometEvent::TransferCollateral { from: a, to: a, asset: a, amount: n },
            CometEvent::BuyCollateral { buyer: a, asset: a, base_amount: n, collateral_amount: n },
            CometEvent::RewardClaimed { src: a, recipient: a, token: a, amount: n },
        ];
        for event in &events {
            assert!(projection_for(event).is_some(), "{} has no projection", event.name());
        }
        assert!(projection_for(&CometEvent::Unrecognized { topic0: None }).is_none());
    }
}

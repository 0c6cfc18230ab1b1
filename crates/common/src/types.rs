use std::str::FromStr;

use alloy::primitives::{Address, B256, Bytes, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::json;

use crate::error::AppError;

/// Supported Ethereum networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Sepolia,
    Mainnet,
}

impl Network {
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Sepolia => 11_155_111,
            Network::Mainnet => 1,
        }
    }

    /// Value stored in the `network_id` column of every persisted table.
    pub fn network_id(&self) -> i64 {
        self.chain_id() as i64
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Network::Sepolia => "Ethereum Sepolia",
            Network::Mainnet => "Ethereum Mainnet",
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Sepolia => write!(f, "sepolia"),
            Network::Mainnet => write!(f, "mainnet"),
        }
    }
}

impl FromStr for Network {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sepolia" => Ok(Network::Sepolia),
            "mainnet" | "ethereum" | "ethereum_mainnet" => Ok(Network::Mainnet),
            other => Err(AppError::Validation(format!("unknown network: {other}"))),
        }
    }
}

/// Comet and CometRewards events the decoder knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    Supply,
    Withdraw,
    SupplyCollateral,
    WithdrawCollateral,
    TransferCollateral,
    AbsorbCollateral,
    AbsorbDebt,
    BuyCollateral,
    Transfer,
    RewardClaimed,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        EventKind::Supply,
        EventKind::Withdraw,
        EventKind::SupplyCollateral,
        EventKind::WithdrawCollateral,
        EventKind::TransferCollateral,
        EventKind::AbsorbCollateral,
        EventKind::AbsorbDebt,
        EventKind::BuyCollateral,
        EventKind::Transfer,
        EventKind::RewardClaimed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Supply => "Supply",
            EventKind::Withdraw => "Withdraw",
            EventKind::SupplyCollateral => "SupplyCollateral",
            EventKind::WithdrawCollateral => "WithdrawCollateral",
            EventKind::TransferCollateral => "TransferCollateral",
            EventKind::AbsorbCollateral => "AbsorbCollateral",
            EventKind::AbsorbDebt => "AbsorbDebt",
            EventKind::BuyCollateral => "BuyCollateral",
            EventKind::Transfer => "Transfer",
            EventKind::RewardClaimed => "RewardClaimed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| AppError::Validation(format!("Unknown event type: {s}")))
    }
}

/// A log entry exactly as an upstream source returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub contract_address: Address,
    /// topic0 (event signature) followed by up to three indexed params.
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub transaction_hash: B256,
    pub log_index: u64,
    /// Unix seconds. Only set by sources that return it with the log.
    pub block_timestamp: Option<u64>,
}

impl RawLog {
    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }
}

/// Typed payload of a decoded log. One variant per known event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CometEvent {
    Supply {
        from: Address,
        dst: Address,
        amount: U256,
    },
    Withdraw {
        src: Address,
        to: Address,
        amount: U256,
    },
    SupplyCollateral {
        from: Address,
        dst: Address,
        asset: Address,
        amount: U256,
    },
    WithdrawCollateral {
        src: Address,
        to: Address,
        asset: Address,
        amount: U256,
    },
    TransferCollateral {
        from: Address,
        to: Address,
        asset: Address,
        amount: U256,
    },
    AbsorbCollateral {
        absorber: Address,
        borrower: Address,
        asset: Address,
        collateral_absorbed: U256,
        usd_value: U256,
    },
    AbsorbDebt {
        absorber: Address,
        borrower: Address,
        base_paid_out: U256,
        usd_value: U256,
    },
    BuyCollateral {
        buyer: Address,
        asset: Address,
        base_amount: U256,
        collateral_amount: U256,
    },
    Transfer {
        from: Address,
        to: Address,
        amount: U256,
    },
    RewardClaimed {
        src: Address,
        recipient: Address,
        token: Address,
        amount: U256,
    },
    /// topic0 did not match any known signature, or the log was too short for it.
    Unrecognized { topic0: Option<B256> },
}

pub const UNRECOGNIZED_EVENT: &str = "Unrecognized";

impl CometEvent {
    pub fn kind(&self) -> Option<EventKind> {
        let kind = match self {
            CometEvent::Supply { .. } => EventKind::Supply,
            CometEvent::Withdraw { .. } => EventKind::Withdraw,
            CometEvent::SupplyCollateral { .. } => EventKind::SupplyCollateral,
            CometEvent::WithdrawCollateral { .. } => EventKind::WithdrawCollateral,
            CometEvent::TransferCollateral { .. } => EventKind::TransferCollateral,
            CometEvent::AbsorbCollateral { .. } => EventKind::AbsorbCollateral,
            CometEvent::AbsorbDebt { .. } => EventKind::AbsorbDebt,
            CometEvent::BuyCollateral { .. } => EventKind::BuyCollateral,
            CometEvent::Transfer { .. } => EventKind::Transfer,
            CometEvent::RewardClaimed { .. } => EventKind::RewardClaimed,
            CometEvent::Unrecognized { .. } => return None,
        };
        Some(kind)
    }

    pub fn name(&self) -> &'static str {
        self.kind().map_or(UNRECOGNIZED_EVENT, |kind| kind.name())
    }

    /// Address-bearing fields that name an account taking part in the event.
    ///
    /// Asset and token addresses are not participants.
    pub fn participants(&self) -> Vec<(&'static str, Address)> {
        match *self {
            CometEvent::Supply { from, dst, .. } => vec![("from", from), ("dst", dst)],
            CometEvent::Withdraw { src, to, .. } => vec![("src", src), ("to", to)],
            CometEvent::SupplyCollateral { from, dst, .. } => vec![("from", from), ("dst", dst)],
            CometEvent::WithdrawCollateral { src, to, .. } => vec![("src", src), ("to", to)],
            CometEvent::TransferCollateral { from, to, .. } => vec![("from", from), ("to", to)],
            CometEvent::AbsorbCollateral {
                absorber, borrower, ..
            }
            | CometEvent::AbsorbDebt {
                absorber, borrower, ..
            } => vec![("absorber", absorber), ("borrower", borrower)],
            CometEvent::BuyCollateral { buyer, .. } => vec![("buyer", buyer)],
            CometEvent::Transfer { from, to, .. } => vec![("from", from), ("to", to)],
            CometEvent::RewardClaimed { src, recipient, .. } => {
                vec![("src", src), ("recipient", recipient)]
            }
            CometEvent::Unrecognized { .. } => vec![],
        }
    }

    /// Decoded fields keyed by ABI parameter name. Addresses are lowercase hex,
    /// integers are decimal strings.
    pub fn fields_json(&self) -> serde_json::Value {
        match self {
            CometEvent::Supply { from, dst, amount } => json!({
                "from": hex_address(from),
                "dst": hex_address(dst),
                "amount": amount.to_string(),
            }),
            CometEvent::Withdraw { src, to, amount } => json!({
                "src": hex_address(src),
                "to": hex_address(to),
                "amount": amount.to_string(),
            }),
            CometEvent::SupplyCollateral {
                from,
                dst,
                asset,
                amount,
            } => json!({
                "from": hex_address(from),
                "dst": hex_address(dst),
                "asset": hex_address(asset),
                "amount": amount.to_string(),
            }),
            CometEvent::WithdrawCollateral {
                src,
                to,
                asset,
                amount,
            } => json!({
                "src": hex_address(src),
                "to": hex_address(to),
                "asset": hex_address(asset),
                "amount": amount.to_string(),
            }),
            CometEvent::TransferCollateral {
                from,
                to,
                asset,
                amount,
            } => json!({
                "from": hex_address(from),
                "to": hex_address(to),
                "asset": hex_address(asset),
                "amount": amount.to_string(),
            }),
            CometEvent::AbsorbCollateral {
                absorber,
                borrower,
                asset,
                collateral_absorbed,
                usd_value,
            } => json!({
                "absorber": hex_address(absorber),
                "borrower": hex_address(borrower),
                "asset": hex_address(asset),
                "collateralAbsorbed": collateral_absorbed.to_string(),
                "usdValue": usd_value.to_string(),
            }),
            CometEvent::AbsorbDebt {
                absorber,
                borrower,
                base_paid_out,
                usd_value,
            } => json!({
                "absorber": hex_address(absorber),
                "borrower": hex_address(borrower),
                "basePaidOut": base_paid_out.to_string(),
                "usdValue": usd_value.to_string(),
            }),
            CometEvent::BuyCollateral {
                buyer,
                asset,
                base_amount,
                collateral_amount,
            } => json!({
                "buyer": hex_address(buyer),
                "asset": hex_address(asset),
                "baseAmount": base_amount.to_string(),
                "collateralAmount": collateral_amount.to_string(),
            }),
            CometEvent::Transfer { from, to, amount } => json!({
                "from": hex_address(from),
                "to": hex_address(to),
                "amount": amount.to_string(),
            }),
            CometEvent::RewardClaimed {
                src,
                recipient,
                token,
                amount,
            } => json!({
                "src": hex_address(src),
                "recipient": hex_address(recipient),
                "token": hex_address(token),
                "amount": amount.to_string(),
            }),
            CometEvent::Unrecognized { .. } => json!({}),
        }
    }
}

/// A classified log with its chain coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub event: CometEvent,
    pub contract_address: Address,
    pub block_number: u64,
    pub transaction_hash: B256,
    pub log_index: u64,
    pub timestamp: DateTime<Utc>,
}

impl DecodedEvent {
    pub fn event_name(&self) -> &'static str {
        self.event.name()
    }

    pub fn is_recognized(&self) -> bool {
        self.event.kind().is_some()
    }

    /// Whether `address` appears in any participant field.
    pub fn involves(&self, address: &Address) -> bool {
        self.event
            .participants()
            .iter()
            .any(|(_, participant)| participant == address)
    }
}

#[derive(Serialize)]
struct DecodedEventView<'a> {
    event_name: &'a str,
    tx_hash: String,
    block_number: u64,
    log_index: u64,
    timestamp: DateTime<Utc>,
    contract_address: String,
    decoded: serde_json::Value,
}

impl Serialize for DecodedEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        DecodedEventView {
            event_name: self.event_name(),
            tx_hash: format!("{:#x}", self.transaction_hash),
            block_number: self.block_number,
            log_index: self.log_index,
            timestamp: self.timestamp,
            contract_address: hex_address(&self.contract_address),
            decoded: self.event.fields_json(),
        }
        .serialize(serializer)
    }
}

/// A transaction sent to a tracked contract, as listed by the explorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractTransaction {
    #[serde(serialize_with = "serialize_hash")]
    pub tx_hash: B256,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(serialize_with = "serialize_address")]
    pub from: Address,
    pub to: Option<String>,
    #[serde(serialize_with = "serialize_decimal")]
    pub value: U256,
    pub gas_used: u64,
    #[serde(serialize_with = "serialize_decimal")]
    pub gas_price: U256,
    pub is_error: bool,
    /// Function name without its argument list, or the method id when unknown.
    pub function_name: String,
    pub method_id: String,
}

/// Lowercase `0x`-prefixed hex, the canonical address form in storage and responses.
pub fn hex_address(address: &Address) -> String {
    format!("{:#x}", address)
}

fn serialize_address<S: Serializer>(address: &Address, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex_address(address))
}

fn serialize_hash<S: Serializer>(hash: &B256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{:#x}", hash))
}

fn serialize_decimal<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

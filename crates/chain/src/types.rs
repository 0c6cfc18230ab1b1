//! Upstream response shapes and the normalized records built from them.
//!
//! Both the node and the explorer's `proxy` module return JSON-RPC objects whose
//! quantities are hex strings; the explorer's `account` module returns decimal strings.
//! The `Wire*` structs mirror those payloads and are converted with explicit parsing so
//! a malformed field surfaces as [`ChainError::Provider`] instead of a panic.

use std::str::FromStr;

use alloy::primitives::{Address, B256, Bytes, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use comet_common::types::{ContractTransaction, RawLog};

use crate::error::ChainError;

/// Block header fields the indexer needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockInfo {
    pub number: u64,
    /// Unix seconds.
    pub timestamp: u64,
}

impl BlockInfo {
    pub fn datetime(&self) -> DateTime<Utc> {
        unix_to_datetime(self.timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionInfo {
    pub hash: B256,
    pub block_number: Option<u64>,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub gas: u64,
    pub gas_price: Option<U256>,
    pub input: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptInfo {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
    /// `true` when the transaction succeeded.
    pub status: bool,
    pub gas_used: u64,
    pub effective_gas_price: Option<U256>,
    #[serde(skip)]
    pub logs: Vec<RawLog>,
}

/// Sort direction for explorer listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// A paginated `logs/getLogs` window. Unlike [`crate::ChainDataClient::logs`] this is
/// bounded by `offset`, not by block span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub address: Address,
    pub from_block: u64,
    /// `None` means the latest block.
    pub to_block: Option<u64>,
    /// Restrict to one event signature.
    pub topic0: Option<B256>,
    pub page: u32,
    pub offset: u32,
}

// ───────────────────────────── wire types ──────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: String,
    #[serde(default)]
    pub time_stamp: Option<String>,
    pub log_index: String,
    pub transaction_hash: String,
}

impl WireLog {
    pub fn into_raw(self) -> Result<RawLog, ChainError> {
        let topics = self
            .topics
            .iter()
            .map(|topic| parse_hash(topic))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RawLog {
            contract_address: parse_address(&self.address)?,
            topics,
            data: parse_bytes(&self.data)?,
            block_number: parse_quantity(&self.block_number)?,
            transaction_hash: parse_hash(&self.transaction_hash)?,
            log_index: parse_quantity(&self.log_index)?,
            block_timestamp: self.time_stamp.as_deref().map(parse_quantity).transpose()?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireBlock {
    pub number: String,
    pub timestamp: String,
}

impl WireBlock {
    pub fn into_info(self) -> Result<BlockInfo, ChainError> {
        Ok(BlockInfo {
            number: parse_quantity(&self.number)?,
            timestamp: parse_quantity(&self.timestamp)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireTransaction {
    pub hash: String,
    #[serde(default)]
    pub block_number: Option<String>,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    pub value: String,
    pub gas: String,
    #[serde(default)]
    pub gas_price: Option<String>,
    pub input: String,
}

impl WireTransaction {
    pub fn into_info(self) -> Result<TransactionInfo, ChainError> {
        Ok(TransactionInfo {
            hash: parse_hash(&self.hash)?,
            block_number: self.block_number.as_deref().map(parse_quantity).transpose()?,
            from: parse_address(&self.from)?,
            to: self.to.as_deref().map(parse_address).transpose()?,
            value: parse_u256_quantity(&self.value)?,
            gas: parse_quantity(&self.gas)?,
            gas_price: self.gas_price.as_deref().map(parse_u256_quantity).transpose()?,
            input: parse_bytes(&self.input)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireReceipt {
    pub transaction_hash: String,
    #[serde(default)]
    pub block_number: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    pub gas_used: String,
    #[serde(default)]
    pub effective_gas_price: Option<String>,
    #[serde(default)]
    pub logs: Vec<WireLog>,
}

impl WireReceipt {
    pub fn into_info(self) -> Result<ReceiptInfo, ChainError> {
        Ok(ReceiptInfo {
            transaction_hash: parse_hash(&self.transaction_hash)?,
            block_number: self.block_number.as_deref().map(parse_quantity).transpose()?,
            // Pre-Byzantium receipts have no status; treat them as successful.
            status: match self.status.as_deref() {
                Some(status) => parse_quantity(status)? == 1,
                None => true,
            },
            gas_used: parse_quantity(&self.gas_used)?,
            effective_gas_price: self
                .effective_gas_price
                .as_deref()
                .map(parse_u256_quantity)
                .transpose()?,
            logs: self
                .logs
                .into_iter()
                .map(WireLog::into_raw)
                .collect::<Result<_, _>>()?,
        })
    }
}

/// One row of `account/txlist`. All numbers are decimal strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireTxListEntry {
    pub block_number: String,
    pub time_stamp: String,
    pub hash: String,
    pub from: String,
    #[serde(default)]
    pub to: String,
    pub value: String,
    #[serde(default)]
    pub gas_used: String,
    #[serde(default)]
    pub gas_price: String,
    #[serde(default)]
    pub is_error: String,
    #[serde(default)]
    pub method_id: String,
    #[serde(default)]
    pub function_name: String,
}

impl WireTxListEntry {
    pub fn into_transaction(self) -> Result<ContractTransaction, ChainError> {
        let function_name = self
            .function_name
            .split('(')
            .next()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.method_id.clone());

        Ok(ContractTransaction {
            tx_hash: parse_hash(&self.hash)?,
            block_number: parse_decimal(&self.block_number)?,
            timestamp: unix_to_datetime(parse_decimal(&self.time_stamp)?),
            from: parse_address(&self.from)?,
            to: Some(self.to.to_ascii_lowercase()).filter(|to| !to.is_empty()),
            value: parse_u256_decimal(&self.value)?,
            gas_used: parse_decimal_or_zero(&self.gas_used)?,
            gas_price: if self.gas_price.is_empty() {
                U256::ZERO
            } else {
                parse_u256_decimal(&self.gas_price)?
            },
            is_error: self.is_error == "1",
            function_name,
            method_id: self.method_id,
        })
    }
}

// ───────────────────────────── parsing ──────────────────────────────

/// Parse a `0x`-prefixed hex quantity. The explorer encodes zero as a bare `"0x"`.
pub fn parse_quantity(raw: &str) -> Result<u64, ChainError> {
    let digits = strip_hex_prefix(raw)?;
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| ChainError::Provider(format!("invalid hex quantity {raw:?}: {e}")))
}

pub fn parse_u256_quantity(raw: &str) -> Result<U256, ChainError> {
    let digits = strip_hex_prefix(raw)?;
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| ChainError::Provider(format!("invalid hex quantity {raw:?}: {e}")))
}

fn strip_hex_prefix(raw: &str) -> Result<&str, ChainError> {
    raw.strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| ChainError::Provider(format!("expected hex quantity, got {raw:?}")))
}

fn parse_decimal(raw: &str) -> Result<u64, ChainError> {
    raw.trim()
        .parse()
        .map_err(|e| ChainError::Provider(format!("invalid decimal {raw:?}: {e}")))
}

fn parse_decimal_or_zero(raw: &str) -> Result<u64, ChainError> {
    if raw.is_empty() { Ok(0) } else { parse_decimal(raw) }
}

fn parse_u256_decimal(raw: &str) -> Result<U256, ChainError> {
    U256::from_str_radix(raw.trim(), 10)
        .map_err(|e| ChainError::Provider(format!("invalid decimal {raw:?}: {e}")))
}

fn parse_address(raw: &str) -> Result<Address, ChainError> {
    Address::from_str(raw).map_err(|e| ChainError::Provider(format!("invalid address {raw:?}: {e}")))
}

fn parse_hash(raw: &str) -> Result<B256, ChainError> {
    B256::from_str(raw).map_err(|e| ChainError::Provider(format!("invalid hash {raw:?}: {e}")))
}

fn parse_bytes(raw: &str) -> Result<Bytes, ChainError> {
    Bytes::from_str(raw).map_err(|e| ChainError::Provider(format!("invalid hex data: {e}")))
}

pub fn unix_to_datetime(seconds: u64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds as i64, 0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x10").unwrap(), 16);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert!(parse_quantity("16").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_wire_log_with_bare_zero_log_index() {
        let wire = WireLog {
            address: "0x2943ac1216979ad8db76d9147f64e61adc126e96".into(),
            topics: vec![format!("{:#x}", B256::repeat_byte(0x01))],
            data: "0x".into(),
            block_number: "0x4c4b40".into(),
            time_stamp: Some("0x65920080".into()),
            log_index: "0x".into(),
            transaction_hash: format!("{:#x}", B256::repeat_byte(0x02)),
        };

        let raw = wire.into_raw().unwrap();
        assert_eq!(raw.block_number, 5_000_000);
        assert_eq!(raw.log_index, 0);
        assert_eq!(raw.block_timestamp, Some(1_704_067_200));
        assert!(raw.data.is_empty());
    }

    #[test]
    fn test_txlist_entry_function_name() {
        let entry = WireTxListEntry {
            block_number: "5000000".into(),
            time_stamp: "1704067200".into(),
            hash: format!("{:#x}", B256::repeat_byte(0x03)),
            from: "0x000000000000000000000000000000000000000a".into(),
            to: "0x2943AC1216979AD8DB76D9147F64E61ADC126E96".into(),
            value: "0".into(),
            gas_used: "21000".into(),
            gas_price: "1000000000".into(),
            is_error: "0".into(),
            method_id: "0xf2b9fdb8".into(),
            function_name: "supply(address asset, uint256 amount)".into(),
        };

        let tx = entry.into_transaction().unwrap();
        assert_eq!(tx.function_name, "supply");
        assert_eq!(tx.to.as_deref(), Some("0x2943ac1216979ad8db76d9147f64e61adc126e96"));
        assert_eq!(tx.gas_used, 21_000);
        assert!(!tx.is_error);
        assert_eq!(tx.timestamp.timestamp(), 1_704_067_200);
    }

    #[test]
    fn test_txlist_entry_without_function_name_falls_back_to_method_id() {
        let entry = WireTxListEntry {
            block_number: "1".into(),
            time_stamp: "1".into(),
            hash: format!("{:#x}", B256::ZERO),
            from: "0x000000000000000000000000000000000000000a".into(),
            to: String::new(),
            value: "1".into(),
            gas_used: String::new(),
            gas_price: String::new(),
            is_error: "1".into(),
            method_id: "0x".into(),
            function_name: String::new(),
        };

        let tx = entry.into_transaction().unwrap();
        assert_eq!(tx.function_name, "0x");
        assert_eq!(tx.to, None);
        assert!(tx.is_error);
    }
}

//! Block-explorer HTTP client (Etherscan V2 style API).
//!
//! Every request is a GET carrying `module`, `action`, `chainid` and (when configured)
//! `apikey`. Two response shapes come back:
//!
//! - `account` / `logs` modules: `{status, message, result}`. `status = "0"` with a
//!   "No records found" / "No transactions found" message is an empty result; any other
//!   `status = "0"` is an error.
//! - `proxy` module: a JSON-RPC object `{jsonrpc, id, result}` or `{..., error}`.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use comet_common::types::{ContractTransaction, Network, RawLog, hex_address};

use crate::error::ChainError;
use crate::rate_limiter::RateLimiter;
use crate::types::{
    BlockInfo, LogQuery, ReceiptInfo, SortOrder, TransactionInfo, WireBlock, WireLog,
    WireReceipt, WireTransaction, WireTxListEntry, parse_quantity,
};
use crate::{ChainDataClient, ExplorerApi, check_span};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size used when the indexer pulls a span-bounded window through `logs`.
const LOGS_PAGE_SIZE: u32 = 1000;

/// The explorer refuses windows where `page * offset` exceeds 10 000 records.
const MAX_LOG_PAGES: u32 = 10;

const EMPTY_MARKERS: [&str; 2] = ["No records found", "No transactions found"];

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
struct ProxyEnvelope {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

pub struct ExplorerClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    chain_id: u64,
    limiter: Arc<RateLimiter>,
    max_block_span: u64,
}

impl ExplorerClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        network: Network,
        limiter: Arc<RateLimiter>,
        max_block_span: u64,
    ) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
            chain_id: network.chain_id(),
            limiter,
            max_block_span,
        })
    }

    /// Issue one rate-limited GET and return the decoded JSON body.
    async fn fetch(&self, params: &[(&str, String)]) -> Result<Value, ChainError> {
        let mut query: Vec<(&str, String)> = vec![("chainid", self.chain_id.to_string())];
        query.extend(params.iter().cloned());
        if let Some(key) = &self.api_key {
            query.push(("apikey", key.clone()));
        }

        self.limiter.acquire().await;
        tracing::debug!(
            module = ?params.iter().find(|(k, _)| *k == "module").map(|(_, v)| v),
            action = ?params.iter().find(|(k, _)| *k == "action").map(|(_, v)| v),
            "Explorer request"
        );

        let response = self
            .client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    /// Call an `account` / `logs` action whose result is a list.
    async fn list_call<T: DeserializeOwned>(
        &self,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, ChainError> {
        let envelope: Envelope = serde_json::from_value(self.fetch(params).await?)?;

        if envelope.status == "1" {
            return Ok(serde_json::from_value(envelope.result)?);
        }

        let result_text = envelope.result.as_str().unwrap_or_default();
        if EMPTY_MARKERS
            .iter()
            .any(|marker| envelope.message.contains(marker) || result_text.contains(marker))
        {
            return Ok(vec![]);
        }

        Err(ChainError::Provider(format!(
            "explorer returned status 0: {} ({})",
            envelope.message, envelope.result
        )))
    }

    /// Call a `proxy` action. A null result is `None`.
    async fn proxy_call<T: DeserializeOwned>(
        &self,
        action: &str,
        params: &[(&str, String)],
    ) -> Result<Option<T>, ChainError> {
        let mut all = vec![("module", "proxy".to_string()), ("action", action.to_string())];
        all.extend(params.iter().cloned());

        let envelope: ProxyEnvelope = serde_json::from_value(self.fetch(&all).await?)?;

        if let Some(error) = envelope.error {
            return Err(ChainError::Provider(format!("{action} failed: {error}")));
        }
        // Rate-limit and key errors come back in the account-style envelope.
        if envelope.status.as_deref() == Some("0") {
            return Err(ChainError::Provider(format!(
                "{action} failed: {} ({})",
                envelope.message.unwrap_or_default(),
                envelope.result.unwrap_or(Value::Null)
            )));
        }

        match envelope.result {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    async fn fetch_logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: Option<u64>,
        topic0: Option<B256>,
        page: u32,
        offset: u32,
    ) -> Result<Vec<RawLog>, ChainError> {
        let mut params = vec![
            ("module", "logs".to_string()),
            ("action", "getLogs".to_string()),
            ("address", hex_address(&address)),
            ("fromBlock", from_block.to_string()),
            (
                "toBlock",
                to_block.map_or_else(|| "latest".to_string(), |b| b.to_string()),
            ),
            ("page", page.to_string()),
            ("offset", offset.to_string()),
        ];
        if let Some(topic0) = topic0 {
            params.push(("topic0", format!("{topic0:#x}")));
        }

        let wire: Vec<WireLog> = self.list_call(&params).await?;
        wire.into_iter().map(WireLog::into_raw).collect()
    }
}

#[async_trait]
impl ChainDataClient for ExplorerClient {
    fn max_block_span(&self) -> u64 {
        self.max_block_span
    }

    async fn current_height(&self) -> Result<u64, ChainError> {
        let height: Option<String> = self.proxy_call("eth_blockNumber", &[]).await?;
        let height = height
            .ok_or_else(|| ChainError::Provider("eth_blockNumber returned null".to_string()))?;
        parse_quantity(&height)
    }

    async fn logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, ChainError> {
        if !check_span(from_block, to_block, self.max_block_span)? {
            return Ok(vec![]);
        }

        let mut logs = Vec::new();
        for page in 1..=MAX_LOG_PAGES {
            let batch = self
                .fetch_logs(address, from_block, Some(to_block), None, page, LOGS_PAGE_SIZE)
                .await?;
            let full = batch.len() >= LOGS_PAGE_SIZE as usize;
            logs.extend(batch);
            if !full {
                return Ok(logs);
            }
            tracing::debug!(from_block, to_block, page, "Log page full, fetching next");
        }

        Err(ChainError::Provider(format!(
            "more than {} logs in blocks {from_block}..={to_block}",
            MAX_LOG_PAGES * LOGS_PAGE_SIZE
        )))
    }

    async fn block(&self, number: u64) -> Result<Option<BlockInfo>, ChainError> {
        let block: Option<WireBlock> = self
            .proxy_call(
                "eth_getBlockByNumber",
                &[
                    ("tag", format!("{number:#x}")),
                    ("boolean", "false".to_string()),
                ],
            )
            .await?;
        block.map(WireBlock::into_info).transpose()
    }

    async fn transaction(&self, hash: B256) -> Result<Option<TransactionInfo>, ChainError> {
        let tx: Option<WireTransaction> = self
            .proxy_call("eth_getTransactionByHash", &[("txhash", format!("{hash:#x}"))])
            .await?;
        tx.map(WireTransaction::into_info).transpose()
    }

    async fn receipt(&self, hash: B256) -> Result<Option<ReceiptInfo>, ChainError> {
        let receipt: Option<WireReceipt> = self
            .proxy_call(
                "eth_getTransactionReceipt",
                &[("txhash", format!("{hash:#x}"))],
            )
            .await?;
        receipt.map(WireReceipt::into_info).transpose()
    }
}

#[async_trait]
impl ExplorerApi for ExplorerClient {
    async fn contract_transactions(
        &self,
        address: Address,
        page: u32,
        offset: u32,
        sort: SortOrder,
    ) -> Result<Vec<ContractTransaction>, ChainError> {
        let params = [
            ("module", "account".to_string()),
            ("action", "txlist".to_string()),
            ("address", hex_address(&address)),
            ("startblock", "0".to_string()),
            ("endblock", "99999999".to_string()),
            ("page", page.to_string()),
            ("offset", offset.to_string()),
            ("sort", sort.as_str().to_string()),
        ];

        let wire: Vec<WireTxListEntry> = self.list_call(&params).await?;
        wire.into_iter()
            .map(WireTxListEntry::into_transaction)
            .collect()
    }

    async fn event_logs(&self, query: &LogQuery) -> Result<Vec<RawLog>, ChainError> {
        self.fetch_logs(
            query.address,
            query.from_block,
            query.to_block,
            query.topic0,
            query.page,
            query.offset,
        )
        .await
    }
}

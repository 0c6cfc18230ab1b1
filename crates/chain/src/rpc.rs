use std::sync::Arc;

use alloy::consensus::Transaction as ConsensusTransaction;
use alloy::network::{ReceiptResponse, TransactionResponse};
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use async_trait::async_trait;

use comet_common::types::RawLog;

use crate::error::ChainError;
use crate::rate_limiter::RateLimiter;
use crate::types::{BlockInfo, ReceiptInfo, TransactionInfo};
use crate::{ChainDataClient, check_span};

/// JSON-RPC node client.
pub struct RpcClient {
    provider: DynProvider,
    limiter: Arc<RateLimiter>,
    max_block_span: u64,
}

impl RpcClient {
    pub fn new(
        rpc_url: &str,
        limiter: Arc<RateLimiter>,
        max_block_span: u64,
    ) -> Result<Self, ChainError> {
        let url: reqwest::Url = rpc_url
            .parse()
            .map_err(|e| ChainError::Provider(format!("invalid RPC url {rpc_url:?}: {e}")))?;
        let provider = ProviderBuilder::new().connect_http(url).erased();

        Ok(Self {
            provider,
            limiter,
            max_block_span,
        })
    }
}

#[async_trait]
impl ChainDataClient for RpcClient {
    fn max_block_span(&self) -> u64 {
        self.max_block_span
    }

    async fn current_height(&self) -> Result<u64, ChainError> {
        self.limiter.acquire().await;
        self.provider
            .get_block_number()
            .await
            .map_err(ChainError::provider)
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

        let filter = Filter::new()
            .address(address)
            .from_block(from_block)
            .to_block(to_block);

        self.limiter.acquire().await;
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(ChainError::provider)?;

        let raw_logs: Vec<RawLog> = logs.iter().filter_map(raw_log).collect();
        if raw_logs.len() < logs.len() {
            tracing::warn!(
                %address,
                skipped = logs.len() - raw_logs.len(),
                "Skipping logs without block position"
            );
        }
        Ok(raw_logs)
    }

    async fn block(&self, number: u64) -> Result<Option<BlockInfo>, ChainError> {
        self.limiter.acquire().await;
        let block = self
            .provider
            .get_block_by_number(number.into())
            .await
            .map_err(ChainError::provider)?;

        Ok(block.map(|block| BlockInfo {
            number: block.header.number,
            timestamp: block.header.timestamp,
        }))
    }

    async fn transaction(&self, hash: B256) -> Result<Option<TransactionInfo>, ChainError> {
        self.limiter.acquire().await;
        let tx = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .map_err(ChainError::provider)?;

        Ok(tx.map(|tx| TransactionInfo {
            hash: TransactionResponse::tx_hash(&tx),
            block_number: tx.block_number,
            from: TransactionResponse::from(&tx),
            to: ConsensusTransaction::to(&tx),
            value: ConsensusTransaction::value(&tx),
            gas: ConsensusTransaction::gas_limit(&tx),
            gas_price: ConsensusTransaction::gas_price(&tx).map(U256::from),
            input: ConsensusTransaction::input(&tx).clone(),
        }))
    }

    async fn receipt(&self, hash: B256) -> Result<Option<ReceiptInfo>, ChainError> {
        self.limiter.acquire().await;
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(ChainError::provider)?;

        Ok(receipt.map(|receipt| ReceiptInfo {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            status: ReceiptResponse::status(&receipt),
            gas_used: receipt.gas_used,
            effective_gas_price: Some(U256::from(receipt.effective_gas_price)),
            logs: receipt.inner.logs().iter().filter_map(raw_log).collect(),
        }))
    }
}

/// Pending logs have no position yet and cannot be keyed.
fn raw_log(log: &Log) -> Option<RawLog> {
    Some(RawLog {
        contract_address: log.inner.address,
        topics: log.inner.data.topics().to_vec(),
        data: log.inner.data.data.clone(),
        block_number: log.block_number?,
        transaction_hash: log.transaction_hash?,
        log_index: log.log_index?,
        block_timestamp: log.block_timestamp,
    })
}

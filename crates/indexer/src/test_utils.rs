use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use alloy::primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use comet_chain::{BlockInfo, ChainDataClient, ChainError, ReceiptInfo, TransactionInfo, check_span};
use comet_common::contracts::{ContractKind, TrackedContract};
use comet_common::types::{EventKind, RawLog};
use comet_decoders::DecoderRegistry;

pub const GENESIS_TS: u64 = 1_700_000_000;

/// Scripted chain: a fixed log set, a settable height, injectable `logs` failures
/// and an optional stop signal fired from inside a `logs` call.
pub struct MockChainClient {
    height: AtomicU64,
    max_span: u64,
    logs: Mutex<Vec<RawLog>>,
    fail_calls: Mutex<HashSet<usize>>,
    log_calls: Mutex<Vec<(u64, u64)>>,
    block_calls: AtomicUsize,
    cancel_on_call: Mutex<Option<(usize, CancellationToken)>>,
}

impl MockChainClient {
    pub fn new(height: u64, logs: Vec<RawLog>) -> Self {
        Self {
            height: AtomicU64::new(height),
            max_span: 9,
            logs: Mutex::new(logs),
            fail_calls: Mutex::new(HashSet::new()),
            log_calls: Mutex::new(Vec::new()),
            block_calls: AtomicUsize::new(0),
            cancel_on_call: Mutex::new(None),
        }
    }

    /// Make the `n`th (0-based) `logs` call fail with a provider error.
    pub fn fail_logs_call(&self, n: usize) {
        self.fail_calls.lock().unwrap().insert(n);
    }

    /// Cancel `token` while the `n`th (0-based) `logs` call is in flight.
    pub fn cancel_during_logs_call(&self, n: usize, token: CancellationToken) {
        *self.cancel_on_call.lock().unwrap() = Some((n, token));
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn log_calls(&self) -> Vec<(u64, u64)> {
        self.log_calls.lock().unwrap().clone()
    }

    pub fn block_calls(&self) -> usize {
        self.block_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainDataClient for MockChainClient {
    fn max_block_span(&self) -> u64 {
        self.max_span
    }

    async fn current_height(&self) -> Result<u64, ChainError> {
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, ChainError> {
        let call = {
            let mut calls = self.log_calls.lock().unwrap();
            calls.push((from_block, to_block));
            calls.len() - 1
        };
        if let Some((n, token)) = self.cancel_on_call.lock().unwrap().as_ref() {
            if *n == call {
                token.cancel();
            }
        }
        if self.fail_calls.lock().unwrap().contains(&call) {
            return Err(ChainError::Provider("connection reset".into()));
        }
        if !check_span(from_block, to_block, self.max_span)? {
            return Ok(vec![]);
        }

        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| {
                log.contract_address == address
                    && (from_block..=to_block).contains(&log.block_number)
            })
            .cloned()
            .collect())
    }

    async fn block(&self, number: u64) -> Result<Option<BlockInfo>, ChainError> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(BlockInfo {
            number,
            timestamp: GENESIS_TS + number * 12,
        }))
    }

    async fn transaction(&self, _hash: B256) -> Result<Option<TransactionInfo>, ChainError> {
        Ok(None)
    }

    async fn receipt(&self, _hash: B256) -> Result<Option<ReceiptInfo>, ChainError> {
        Ok(None)
    }
}

pub fn market(address: Address, deploy_block: u64) -> TrackedContract {
    TrackedContract {
        name: "cTESTv3",
        address,
        kind: ContractKind::Market,
        base_token: None,
        deploy_block,
    }
}

fn address_topic(address: Address) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[12..].copy_from_slice(address.as_slice());
    B256::from(bytes)
}

/// A `Supply(from, dst, amount)` log.
pub fn supply_log(
    contract: Address,
    block_number: u64,
    tx: u8,
    log_index: u64,
    from: Address,
    dst: Address,
) -> RawLog {
    let topic0 = DecoderRegistry::new()
        .topic0(EventKind::Supply)
        .unwrap();
    RawLog {
        contract_address: contract,
        topics: vec![topic0, address_topic(from), address_topic(dst)],
        data: Bytes::from(U256::from(1_000u64).to_be_bytes::<32>().to_vec()),
        block_number,
        transaction_hash: B256::repeat_byte(tx),
        log_index,
        block_timestamp: None,
    }
}

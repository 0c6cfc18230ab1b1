pub mod error;
pub mod explorer;
pub mod rate_limiter;
pub mod rpc;
pub mod types;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;

use comet_common::types::{ContractTransaction, RawLog};

pub use crate::error::ChainError;
pub use crate::explorer::ExplorerClient;
pub use crate::rate_limiter::RateLimiter;
pub use crate::rpc::RpcClient;
pub use crate::types::{
    BlockInfo, LogQuery, ReceiptInfo, SortOrder, TransactionInfo, unix_to_datetime,
};

/// Read access to chain data, independent of the upstream that serves it.
///
/// Implementations route every outbound request through a shared [`RateLimiter`].
#[async_trait]
pub trait ChainDataClient: Send + Sync {
    /// Widest inclusive block range accepted by [`ChainDataClient::logs`].
    fn max_block_span(&self) -> u64;

    async fn current_height(&self) -> Result<u64, ChainError>;

    /// Logs emitted by `address` in `[from_block, to_block]`.
    ///
    /// Fails with [`ChainError::RangeTooWide`] when `to_block - from_block` exceeds
    /// [`ChainDataClient::max_block_span`]. An inverted range is empty.
    async fn logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, ChainError>;

    async fn block(&self, number: u64) -> Result<Option<BlockInfo>, ChainError>;

    async fn transaction(&self, hash: B256) -> Result<Option<TransactionInfo>, ChainError>;

    async fn receipt(&self, hash: B256) -> Result<Option<ReceiptInfo>, ChainError>;
}

/// Explorer-only listings used by the read path.
#[async_trait]
pub trait ExplorerApi: ChainDataClient {
    /// Transactions sent to `address`, one page at a time.
    async fn contract_transactions(
        &self,
        address: Address,
        page: u32,
        offset: u32,
        sort: SortOrder,
    ) -> Result<Vec<ContractTransaction>, ChainError>;

    /// One page of logs for a block window of any width.
    async fn event_logs(&self, query: &LogQuery) -> Result<Vec<RawLog>, ChainError>;
}

/// Validate a `logs` request range.
///
/// `span` is the block difference `to_block - from_block`, so a limit of 9 admits ten
/// blocks. Returns `Ok(false)` for an inverted range, which callers answer with an
/// empty list.
pub fn check_span(from_block: u64, to_block: u64, max_span: u64) -> Result<bool, ChainError> {
    if from_block > to_block {
        return Ok(false);
    }
    let span = to_block - from_block;
    if span > max_span {
        return Err(ChainError::RangeTooWide {
            from: from_block,
            to: to_block,
            span,
            max: max_span,
        });
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_span() {
        assert!(check_span(100, 108, 9).unwrap());
        assert!(check_span(100, 100, 9).unwrap());
        assert!(!check_span(101, 100, 9).unwrap());
        // Ten blocks, difference of nine
        assert!(check_span(100, 109, 9).unwrap());

        match check_span(100, 110, 9) {
            Err(ChainError::RangeTooWide { span, max, .. }) => {
                assert_eq!(span, 10);
                assert_eq!(max, 9);
            }
            other => panic!("expected RangeTooWide, got {other:?}"),
        }
    }
}

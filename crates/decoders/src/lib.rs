pub mod market;
pub mod rewards;
pub mod signature;


use alloy::primitives::B256;
use chrono::{DateTime, Utc};
use comet_common::types::{CometEvent, DecodedEvent, EventKind, RawLog};

use crate::signature::EventSignature;

/// Trait that all contract-specific decoders must implement.
pub trait EventDecoder: Send + Sync {
    /// The event signatures this decoder handles.
    fn signatures(&self) -> &[EventSignature];

    /// Attempt to decode a raw log entry into a typed event.
    /// Returns `None` if this decoder doesn't handle the log's topic, or if the log is
    /// too short for the matched layout.
    fn decode(&self, log: &RawLog) -> Option<CometEvent>;

    /// Human-readable name for this decoder (e.g., "Comet market").
    fn name(&self) -> &'static str;
}

/// Registry of all available decoders, used by the indexer and the read path.
pub struct DecoderRegistry {
    decoders: Vec<Box<dyn EventDecoder>>,
}

impl DecoderRegistry {
    /// Create a new registry with the Comet market and rewards decoders.
    pub fn new() -> Self {
        Self {
            decoders: vec![
                Box::new(market::CometMarketDecoder::new()),
                Box::new(rewards::CometRewardsDecoder::new()),
            ],
        }
    }

    /// Classify a log. Logs no decoder accepts come back as [`CometEvent::Unrecognized`].
    pub fn classify(&self, log: &RawLog) -> CometEvent {
        for decoder in &self.decoders {
            if let Some(event) = decoder.decode(log) {
                tracing::debug!(
                    decoder = decoder.name(),
                    event_type = event.name(),
                    "Decoded event"
                );
                return event;
            }
        }

        tracing::trace!(
            topic0 = ?log.topic0(),
            tx_hash = %log.transaction_hash,
            "Unrecognized log"
        );
        CometEvent::Unrecognized {
            topic0: log.topic0().copied(),
        }
    }

    /// Decode a log into a [`DecodedEvent`] stamped with its block timestamp.
    ///
    /// Pure: the same log and timestamp always produce the same event.
    pub fn decode(&self, log: &RawLog, block_timestamp: DateTime<Utc>) -> DecodedEvent {
        DecodedEvent {
            event: self.classify(log),
            contract_address: log.contract_address,
            block_number: log.block_number,
            transaction_hash: log.transaction_hash,
            log_index: log.log_index,
            timestamp: block_timestamp,
        }
    }

    /// topic0 for a known event kind.
    pub fn topic0(&self, kind: EventKind) -> Option<B256> {
        self.decoders
            .iter()
            .flat_map(|d| d.signatures())
            .find(|s| s.kind == kind)
            .map(EventSignature::topic0)
    }

    /// Get all event signatures across all registered decoders.
    pub fn all_signatures(&self) -> Vec<B256> {
        self.decoders
            .iter()
            .flat_map(|d| d.signatures())
            .map(EventSignature::topic0)
            .collect()
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

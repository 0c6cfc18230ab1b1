use comet_common::types::{CometEvent, EventKind, RawLog};

use crate::EventDecoder;
use crate::signature::{DecodedValue, EventSignature, Param, ParamType};

const REWARD_CLAIMED: &[Param] = &[
    Param::indexed("src", ParamType::Address),
    Param::indexed("recipient", ParamType::Address),
    Param::indexed("token", ParamType::Address),
    Param::data("amount", ParamType::Uint256),
];

/// CometRewards decoder: `RewardClaimed(address src, address recipient, address token, uint256 amount)`.
pub struct CometRewardsDecoder {
    signatures: Vec<EventSignature>,
}

impl CometRewardsDecoder {
    pub fn new() -> Self {
        Self {
            signatures: vec![EventSignature::new(EventKind::RewardClaimed, REWARD_CLAIMED)],
        }
    }
}

impl Default for CometRewardsDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDecoder for CometRewardsDecoder {
    fn signatures(&self) -> &[EventSignature] {
        &self.signatures
    }

    fn decode(&self, log: &RawLog) -> Option<CometEvent> {
        let topic0 = log.topic0()?;
        let signature = self.signatures.iter().find(|s| s.topic0() == *topic0)?;
        let values = signature.decode_values(log)?;

        let addr = |i: usize| values.get(i).and_then(DecodedValue::as_address);
        Some(CometEvent::RewardClaimed {
            src: addr(0)?,
            recipient: addr(1)?,
            token: addr(2)?,
            amount: values.get(3).and_then(DecodedValue::as_uint)?,
        })
    }

    fn name(&self) -> &'static str {
        "Comet rewards"
    }
}

use alloy::primitives::B256;
use comet_common::types::{CometEvent, EventKind, RawLog};

use crate::EventDecoder;
use crate::signature::{DecodedValue, EventSignature, Param, ParamType};

use ParamType::{Address, Uint256};

const SUPPLY: &[Param] = &[
    Param::indexed("from", Address),
    Param::indexed("dst", Address),
    Param::data("amount", Uint256),
];

const WITHDRAW: &[Param] = &[
    Param::indexed("src", Address),
    Param::indexed("to", Address),
    Param::data("amount", Uint256),
];

const SUPPLY_COLLATERAL: &[Param] = &[
    Param::indexed("from", Address),
    Param::indexed("dst", Address),
    Param::indexed("asset", Address),
    Param::data("amount", Uint256),
];

const WITHDRAW_COLLATERAL: &[Param] = &[
    Param::indexed("src", Address),
    Param::indexed("to", Address),
    Param::indexed("asset", Address),
    Param::data("amount", Uint256),
];

const TRANSFER_COLLATERAL: &[Param] = &[
    Param::indexed("from", Address),
    Param::indexed("to", Address),
    Param::indexed("asset", Address),
    Param::data("amount", Uint256),
];

const ABSORB_COLLATERAL: &[Param] = &[
    Param::indexed("absorber", Address),
    Param::indexed("borrower", Address),
    Param::indexed("asset", Address),
    Param::data("collateralAbsorbed", Uint256),
    Param::data("usdValue", Uint256),
];

const ABSORB_DEBT: &[Param] = &[
    Param::indexed("absorber", Address),
    Param::indexed("borrower", Address),
    Param::data("basePaidOut", Uint256),
    Param::data("usdValue", Uint256),
];

const BUY_COLLATERAL: &[Param] = &[
    Param::indexed("buyer", Address),
    Param::indexed("asset", Address),
    Param::data("baseAmount", Uint256),
    Param::data("collateralAmount", Uint256),
];

const TRANSFER: &[Param] = &[
    Param::indexed("from", Address),
    Param::indexed("to", Address),
    Param::data("amount", Uint256),
];

/// Comet market decoder.
///
/// Handles the base/collateral lifecycle, liquidation and ERC-20 events emitted by a
/// Comet proxy:
/// - `Supply`, `Withdraw`, `Transfer`
/// - `SupplyCollateral`, `WithdrawCollateral`, `TransferCollateral`
/// - `AbsorbCollateral`, `AbsorbDebt`, `BuyCollateral`
pub struct CometMarketDecoder {
    signatures: Vec<EventSignature>,
}

impl CometMarketDecoder {
    pub fn new() -> Self {
        Self {
            signatures: vec![
                EventSignature::new(EventKind::Supply, SUPPLY),
                EventSignature::new(EventKind::Withdraw, WITHDRAW),
                EventSignature::new(EventKind::SupplyCollateral, SUPPLY_COLLATERAL),
                EventSignature::new(EventKind::WithdrawCollateral, WITHDRAW_COLLATERAL),
                EventSignature::new(EventKind::TransferCollateral, TRANSFER_COLLATERAL),
                EventSignature::new(EventKind::AbsorbCollateral, ABSORB_COLLATERAL),
                EventSignature::new(EventKind::AbsorbDebt, ABSORB_DEBT),
                EventSignature::new(EventKind::BuyCollateral, BUY_COLLATERAL),
                EventSignature::new(EventKind::Transfer, TRANSFER),
            ],
        }
    }

    fn build(kind: EventKind, values: &[DecodedValue]) -> Option<CometEvent> {
        let addr = |i: usize| values.get(i).and_then(DecodedValue::as_address);
        let uint = |i: usize| values.get(i).and_then(DecodedValue::as_uint);

        let event = match kind {
            EventKind::Supply => CometEvent::Supply {
                from: addr(0)?,
                dst: addr(1)?,
                amount: uint(2)?,
            },
            EventKind::Withdraw => CometEvent::Withdraw {
                src: addr(0)?,
                to: addr(1)?,
                amount: uint(2)?,
            },
            EventKind::SupplyCollateral => CometEvent::SupplyCollateral {
                from: addr(0)?,
                dst: addr(1)?,
                asset: addr(2)?,
                amount: uint(3)?,
            },
            EventKind::WithdrawCollateral => CometEvent::WithdrawCollateral {
                src: addr(0)?,
                to: addr(1)?,
                asset: addr(2)?,
                amount: uint(3)?,
            },
            EventKind::TransferCollateral => CometEvent::TransferCollateral {
                from: addr(0)?,
                to: addr(1)?,
                asset: addr(2)?,
                amount: uint(3)?,
            },
            EventKind::AbsorbCollateral => CometEvent::AbsorbCollateral {
                absorber: addr(0)?,
                borrower: addr(1)?,
                asset: addr(2)?,
                collateral_absorbed: uint(3)?,
                usd_value: uint(4)?,
            },
            EventKind::AbsorbDebt => CometEvent::AbsorbDebt {
                absorber: addr(0)?,
                borrower: addr(1)?,
                base_paid_out: uint(2)?,
                usd_value: uint(3)?,
            },
            EventKind::BuyCollateral => CometEvent::BuyCollateral {
                buyer: addr(0)?,
                asset: addr(1)?,
                base_amount: uint(2)?,
                collateral_amount: uint(3)?,
            },
            EventKind::Transfer => CometEvent::Transfer {
                from: addr(0)?,
                to: addr(1)?,
                amount: uint(2)?,
            },
            EventKind::RewardClaimed => return None,
        };
        Some(event)
    }
}

impl Default for CometMarketDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDecoder for CometMarketDecoder {
    fn signatures(&self) -> &[EventSignature] {
        &self.signatures
    }

    fn decode(&self, log: &RawLog) -> Option<CometEvent> {
        let topic0: &B256 = log.topic0()?;
        let signature = self.signatures.iter().find(|s| s.topic0() == *topic0)?;
        let values = signature.decode_values(log)?;
        Self::build(signature.kind, &values)
    }

    fn name(&self) -> &'static str {
        "Comet market"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_signatures() {
        let decoder = CometMarketDecoder::new();
        assert_eq!(decoder.signatures().len(), 9);
    }

    #[test]
    fn test_canonical_signatures() {
        let decoder = CometMarketDecoder::new();
        let canonical: Vec<String> = decoder.signatures().iter().map(|s| s.canonical()).collect();
        assert!(canonical.contains(&"Supply(address,address,uint256)".to_string()));
        assert!(canonical.contains(&"AbsorbCollateral(address,address,address,uint256,uint256)".to_string()));
        assert!(canonical.contains(&"BuyCollateral(address,address,uint256,uint256)".to_string()));
    }
}

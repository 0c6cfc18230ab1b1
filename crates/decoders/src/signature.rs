//! Static event-signature descriptions and positional ABI decoding.
//!
//! Every supported event is described once as an [`EventSignature`]: its name and the
//! ordered parameter list with indexed flags. topic0 is derived from the canonical
//! signature (`Supply(address,address,uint256)`), and field values are read back by
//! walking the parameters: indexed ones consume topics 1..=3 in order, the rest consume
//! consecutive 32-byte words of the data payload.

use alloy::primitives::{Address, B256, U256, keccak256};
use comet_common::types::{EventKind, RawLog};

/// ABI types used by Comet events. Everything we decode is a static 32-byte slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Address,
    Uint256,
}

impl ParamType {
    fn canonical(&self) -> &'static str {
        match self {
            ParamType::Address => "address",
            ParamType::Uint256 => "uint256",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub ty: ParamType,
    pub indexed: bool,
}

impl Param {
    pub const fn indexed(name: &'static str, ty: ParamType) -> Self {
        Self {
            name,
            ty,
            indexed: true,
        }
    }

    pub const fn data(name: &'static str, ty: ParamType) -> Self {
        Self {
            name,
            ty,
            indexed: false,
        }
    }
}

/// A value recovered from a topic or data word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedValue {
    Address(Address),
    Uint(U256),
}

impl DecodedValue {
    pub fn as_address(&self) -> Option<Address> {
        match self {
            DecodedValue::Address(address) => Some(*address),
            DecodedValue::Uint(_) => None,
        }
    }

    pub fn as_uint(&self) -> Option<U256> {
        match self {
            DecodedValue::Uint(value) => Some(*value),
            DecodedValue::Address(_) => None,
        }
    }

    fn from_word(ty: ParamType, word: &[u8]) -> Self {
        match ty {
            ParamType::Address => DecodedValue::Address(Address::from_slice(&word[12..32])),
            ParamType::Uint256 => DecodedValue::Uint(U256::from_be_slice(word)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSignature {
    pub kind: EventKind,
    pub params: &'static [Param],
    topic0: B256,
}

impl EventSignature {
    pub fn new(kind: EventKind, params: &'static [Param]) -> Self {
        let topic0 = keccak256(canonical_signature(kind, params));
        Self {
            kind,
            params,
            topic0,
        }
    }

    pub fn topic0(&self) -> B256 {
        self.topic0
    }

    pub fn canonical(&self) -> String {
        canonical_signature(self.kind, self.params)
    }

    /// Read every parameter of this event out of `log`, in declaration order.
    ///
    /// Returns `None` when the log carries fewer topics or data words than the layout
    /// requires.
    pub fn decode_values(&self, log: &RawLog) -> Option<Vec<DecodedValue>> {
        let data = log.data.as_ref();
        let mut next_topic = 1;
        let mut next_word = 0;
        let mut values = Vec::with_capacity(self.params.len());

        for param in self.params {
            let word: &[u8] = if param.indexed {
                let topic = log.topics.get(next_topic)?;
                next_topic += 1;
                topic.as_slice()
            } else {
                let start = next_word * 32;
                next_word += 1;
                data.get(start..start + 32)?
            };
            values.push(DecodedValue::from_word(param.ty, word));
        }

        Some(values)
    }
}

fn canonical_signature(kind: EventKind, params: &[Param]) -> String {
    let types: Vec<&str> = params.iter().map(|p| p.ty.canonical()).collect();
    format!("{}({})", kind.name(), types.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Bytes;

    const TRANSFER: &[Param] = &[
        Param::indexed("from", ParamType::Address),
        Param::indexed("to", ParamType::Address),
        Param::data("amount", ParamType::Uint256),
    ];

    fn log(topics: Vec<B256>, data: Vec<u8>) -> RawLog {
        RawLog {
            contract_address: Address::ZERO,
            topics,
            data: Bytes::from(data),
            block_number: 1,
            transaction_hash: B256::ZERO,
            log_index: 0,
            block_timestamp: None,
        }
    }

    #[test]
    fn test_transfer_topic0_matches_erc20() {
        let sig = EventSignature::new(EventKind::Transfer, TRANSFER);
        assert_eq!(sig.canonical(), "Transfer(address,address,uint256)");
        assert_eq!(
            format!("{:#x}", sig.topic0()),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn test_missing_topic_yields_none() {
        let sig = EventSignature::new(EventKind::Transfer, TRANSFER);
        let short = log(vec![sig.topic0(), B256::ZERO], vec![0u8; 32]);
        assert!(sig.decode_values(&short).is_none());
    }

    #[test]
    fn test_short_data_yields_none() {
        let sig = EventSignature::new(EventKind::Transfer, TRANSFER);
        let short = log(vec![sig.topic0(), B256::ZERO, B256::ZERO], vec![0u8; 31]);
        assert!(sig.decode_values(&short).is_none());
    }
}

//! Compound V3 (Comet) deployments tracked per network.

use alloy::primitives::{Address, address};

use crate::types::Network;

/// Role of a tracked contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractKind {
    /// A Comet market proxy (cUSDCv3, cWETHv3, ...).
    Market,
    /// CometRewards, source of `RewardClaimed`.
    Rewards,
    /// Configurator, factory, bulker and other contracts that are registered but not scanned.
    Infrastructure,
}

impl ContractKind {
    /// Whether the indexer pulls logs for contracts of this kind.
    pub fn is_scanned(&self) -> bool {
        matches!(self, ContractKind::Market | ContractKind::Rewards)
    }
}

impl std::fmt::Display for ContractKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContractKind::Market => write!(f, "market"),
            ContractKind::Rewards => write!(f, "rewards"),
            ContractKind::Infrastructure => write!(f, "infrastructure"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseToken {
    pub address: Address,
    pub symbol: &'static str,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedContract {
    pub name: &'static str,
    pub address: Address,
    pub kind: ContractKind,
    pub base_token: Option<BaseToken>,
    /// First block worth scanning. Zero when unknown.
    pub deploy_block: u64,
}

const fn market(
    name: &'static str,
    address: Address,
    base_token: BaseToken,
    deploy_block: u64,
) -> TrackedContract {
    TrackedContract {
        name,
        address,
        kind: ContractKind::Market,
        base_token: Some(base_token),
        deploy_block,
    }
}

const fn other(name: &'static str, address: Address, kind: ContractKind) -> TrackedContract {
    TrackedContract {
        name,
        address,
        kind,
        base_token: None,
        deploy_block: 0,
    }
}

const SEPOLIA: &[TrackedContract] = &[
    market(
        "cWETHv3",
        address!("0x2943ac1216979aD8dB76D9147F64E61adc126e96"),
        BaseToken {
            address: address!("0x7b79995e5f793A07Bc00c21412e50Ecae098E7f9"),
            symbol: "WETH",
            decimals: 18,
        },
        4_500_000,
    ),
    // Not deployed on Sepolia yet.
    market(
        "cUSDCv3",
        Address::ZERO,
        BaseToken {
            address: Address::ZERO,
            symbol: "USDC",
            decimals: 6,
        },
        0,
    ),
    other("rewards", Address::ZERO, ContractKind::Rewards),
];

const MAINNET: &[TrackedContract] = &[
    market(
        "cUSDCv3",
        address!("0xc3d688B66703497DAA19211EEdff47f25384cdc3"),
        BaseToken {
            address: address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            symbol: "USDC",
            decimals: 6,
        },
        15_331_586,
    ),
    market(
        "cWETHv3",
        address!("0xA17581A9E3356d9A858b789D68B4d866e593aE94"),
        BaseToken {
            address: address!("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
            symbol: "WETH",
            decimals: 18,
        },
        18_040_181,
    ),
    market(
        "cUSDTv3",
        address!("0x3Afdc9BCA9213A35503b077a6072F3D0d5AB0840"),
        BaseToken {
            address: address!("0xdAC17F958D2ee523a2206206994597C13D831ec7"),
            symbol: "USDT",
            decimals: 6,
        },
        19_297_761,
    ),
    other(
        "rewards",
        address!("0x1B0e765F6224C21223AeA2af16c1C46E38885a40"),
        ContractKind::Rewards,
    ),
    other(
        "configurator",
        address!("0x316f9708bB98af7dA9c68C1C3b5e79039cD336E3"),
        ContractKind::Infrastructure,
    ),
    other(
        "configuratorProxy",
        address!("0xcFC1fA6b7ca982176529899D99f0e67945355d63"),
        ContractKind::Infrastructure,
    ),
    other(
        "proxyAdmin",
        address!("0x1EC63B5883C3481134FD50D5DAebc83Ecd2E8779"),
        ContractKind::Infrastructure,
    ),
    other(
        "cometFactory",
        address!("0xa7F7De6cCad4D83d81676717053883337aC2c1b4"),
        ContractKind::Infrastructure,
    ),
    other(
        "bulker",
        address!("0xa397a8C2086C554B531c02E29f3291c9704B00c7"),
        ContractKind::Infrastructure,
    ),
];

/// All deployed contracts for `network`. Placeholder (zero-address) entries are skipped.
pub fn tracked_contracts(network: Network) -> Vec<TrackedContract> {
    let table = match network {
        Network::Sepolia => SEPOLIA,
        Network::Mainnet => MAINNET,
    };

    table
        .iter()
        .filter(|contract| contract.address != Address::ZERO)
        .cloned()
        .collect()
}

/// The market served by the explorer-backed read path.
pub fn primary_market(network: Network) -> Option<TrackedContract> {
    tracked_contracts(network)
        .into_iter()
        .find(|contract| contract.kind == ContractKind::Market)
}

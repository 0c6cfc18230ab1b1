//! Read path: cached explorer queries and date-range aggregation for one market.

pub mod cache;
pub mod range;
pub mod service;

pub use cache::{QueryCache, QueryClass};
pub use range::{AddressRangeActivity, DateRange, RangeReport};
pub use service::{
    AddressEvents, AddressSummary, ContractStats, QueryService, QuerySettings,
    TransactionDetails,
};

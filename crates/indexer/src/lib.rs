pub mod addresses;
pub mod cursor;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod poller;
pub mod projections;
pub mod store;

#[cfg(test)]
mod test_utils;

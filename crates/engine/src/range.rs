//! Date-range aggregation over the recent activity window.
//!
//! The window is bounded (a few hundred transactions and events fetched through the
//! cache), so a range query only sees what falls inside it. It is never a full-history
//! scan.

use std::collections::{BTreeMap, HashMap, HashSet};

use alloy::primitives::Address;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use comet_common::error::AppError;
use comet_common::types::{ContractTransaction, DecodedEvent, hex_address};

/// Transactions kept per address in a range report.
pub const MAX_EMBEDDED_TRANSACTIONS: usize = 10;
/// Events kept per address in a range report.
pub const MAX_EMBEDDED_EVENTS: usize = 20;

/// Inclusive time interval, second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Parse both bounds. A bare `YYYY-MM-DD` start means the start of that day and a
    /// bare end date means its last second, both UTC. RFC 3339 instants are taken as is.
    pub fn parse(start: &str, end: &str) -> Result<Self, AppError> {
        let start = parse_bound(start, Bound::Start)?;
        let end = parse_bound(end, Bound::End)?;
        if start > end {
            return Err(AppError::InvalidRange(format!(
                "start {} is after end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let seconds = at.timestamp();
        seconds >= self.start.timestamp() && seconds <= self.end.timestamp()
    }
}

#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

fn parse_bound(raw: &str, bound: Bound) -> Result<DateTime<Utc>, AppError> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let time = match bound {
            Bound::Start => NaiveTime::MIN,
            Bound::End => NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN),
        };
        return Ok(date.and_time(time).and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| AppError::InvalidDate(raw.to_string()))
}

/// One address's activity inside a date range.
#[derive(Debug, Clone, Serialize)]
pub struct AddressRangeActivity {
    pub address: String,
    pub total_transactions: usize,
    pub total_events: usize,
    pub total_activity: usize,
    /// Calls per function name, over every matching transaction.
    pub functions: BTreeMap<String, usize>,
    /// Participations per event name, over every matching event.
    pub event_types: BTreeMap<String, usize>,
    pub first_activity: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub transactions: Vec<ContractTransaction>,
    pub events: Vec<DecodedEvent>,
}

impl AddressRangeActivity {
    fn new(address: String, at: DateTime<Utc>) -> Self {
        Self {
            address,
            total_transactions: 0,
            total_events: 0,
            total_activity: 0,
            functions: BTreeMap::new(),
            event_types: BTreeMap::new(),
            first_activity: at,
            last_activity: at,
            transactions: Vec::new(),
            events: Vec::new(),
        }
    }

    fn widen(&mut self, at: DateTime<Utc>) {
        self.first_activity = self.first_activity.min(at);
        self.last_activity = self.last_activity.max(at);
    }

    fn add_transaction(&mut self, tx: &ContractTransaction) {
        self.widen(tx.timestamp);
        self.total_transactions += 1;
        *self.functions.entry(tx.function_name.clone()).or_default() += 1;
        if self.transactions.len() < MAX_EMBEDDED_TRANSACTIONS {
            self.transactions.push(tx.clone());
        }
    }

    fn add_event(&mut self, event: &DecodedEvent) {
        self.widen(event.timestamp);
        self.total_events += 1;
        *self.event_types.entry(event.event_name().to_string()).or_default() += 1;
        if self.events.len() < MAX_EMBEDDED_EVENTS {
            self.events.push(event.clone());
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RangeReport {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_addresses: usize,
    pub total_transactions: usize,
    pub total_events: usize,
    pub addresses: Vec<AddressRangeActivity>,
}

/// Aggregate the part of the window that falls inside `range`, per address.
///
/// Transactions are attributed to their sender. Events are attributed to each distinct
/// participant other than the zero address. Addresses are ordered by total activity,
/// busiest first, ties broken by address.
pub fn aggregate(
    range: DateRange,
    transactions: &[ContractTransaction],
    events: &[DecodedEvent],
) -> RangeReport {
    let mut by_address: HashMap<String, AddressRangeActivity> = HashMap::new();

    let transactions: Vec<&ContractTransaction> = transactions
        .iter()
        .filter(|tx| range.contains(tx.timestamp))
        .collect();
    for tx in &transactions {
        let address = hex_address(&tx.from);
        by_address
            .entry(address.clone())
            .or_insert_with(|| AddressRangeActivity::new(address, tx.timestamp))
            .add_transaction(tx);
    }

    let events: Vec<&DecodedEvent> = events
        .iter()
        .filter(|event| range.contains(event.timestamp))
        .collect();
    for event in &events {
        let mut seen = HashSet::new();
        for (_, participant) in event.event.participants() {
            if participant == Address::ZERO || !seen.insert(participant) {
                continue;
            }
            let address = hex_address(&participant);
            by_address
                .entry(address.clone())
                .or_insert_with(|| AddressRangeActivity::new(address, event.timestamp))
                .add_event(event);
        }
    }

    let mut addresses: Vec<AddressRangeActivity> = by_address
        .into_values()
        .map(|mut entry| {
            entry.total_activity = entry.total_transactions + entry.total_events;
            entry
        })
        .collect();
    addresses.sort_by(|a, b| {
        b.total_activity
            .cmp(&a.total_activity)
            .then_with(|| a.address.cmp(&b.address))
    });

    RangeReport {
        start_date: range.start,
        end_date: range.end,
        total_addresses: addresses.len(),
        total_transactions: transactions.len(),
        total_events: events.len(),
        addresses,
    }
}

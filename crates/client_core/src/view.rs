//! Derived, presentation-ready views over a committed [`Snapshot`].
//!
//! Everything here is pure: sorting and filtering never reach back into the
//! store or the record source.

use std::cmp::Ordering;

use alloy_primitives::{Address, U256};
use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use shared::domain::{Record, RecordIndex, SortKey};

use crate::Snapshot;

const ETHER_DECIMALS: usize = 18;

/// Sort control of the board list. Starts at expiration, earliest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SortState {
    pub key: SortKey,
    pub ascending: bool,
}

impl Default for SortState {
    fn default() -> Self {
        Self {
            key: SortKey::Expiration,
            ascending: true,
        }
    }
}

impl SortState {
    pub fn new(key: SortKey, ascending: bool) -> Self {
        Self { key, ascending }
    }

    /// Selecting the active key flips the direction; any other key becomes
    /// active in ascending order.
    pub fn toggle(&mut self, key: SortKey) {
        if key == self.key {
            self.ascending = !self.ascending;
        } else {
            self.key = key;
            self.ascending = true;
        }
    }

    pub fn toggled(mut self, key: SortKey) -> Self {
        self.toggle(key);
        self
    }

    pub fn direction_label(&self, key: SortKey) -> Option<&'static str> {
        if key != self.key {
            return None;
        }
        Some(match (key, self.ascending) {
            (SortKey::Expiration, true) => "Earliest First",
            (SortKey::Expiration, false) => "Latest First",
            (SortKey::Reward, true) => "Lowest First",
            (SortKey::Reward, false) => "Highest First",
        })
    }

    /// Caption for the sort button of `key`.
    pub fn label(&self, key: SortKey) -> String {
        let name = match key {
            SortKey::Expiration => "Expiration",
            SortKey::Reward => "Reward",
        };
        match self.direction_label(key) {
            Some(direction) => format!("Sort by {name}: {direction}"),
            None => format!("Sort by {name}"),
        }
    }

    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let by_key = self.key.value_of(a).cmp(self.key.value_of(b));
        let by_key = if self.ascending {
            by_key
        } else {
            by_key.reverse()
        };
        by_key.then_with(|| a.index.cmp(&b.index))
    }
}

/// Visible records of `snapshot` in display order. Records without a creator
/// are dropped; equal sort values fall back to ascending index.
pub fn build_view(snapshot: &Snapshot, sort: SortState) -> Vec<&Record> {
    let mut visible: Vec<&Record> = snapshot
        .records()
        .values()
        .filter(|record| record.creator.is_present())
        .collect();
    visible.sort_by(|a, b| sort.compare(a, b));
    visible
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordCard {
    pub index: RecordIndex,
    pub heading: String,
    pub creator: String,
    pub reward: String,
    pub expires_on: Option<NaiveDate>,
}

impl RecordCard {
    pub fn from_record(record: &Record) -> Self {
        Self {
            index: record.index,
            heading: format!("#{} {}", record.id, record.title),
            creator: short_address(&record.creator.address()),
            reward: format_reward(&record.reward),
            expires_on: expiration_date(&record.expires_at),
        }
    }
}

pub fn cards(snapshot: &Snapshot, sort: SortState) -> Vec<RecordCard> {
    build_view(snapshot, sort)
        .into_iter()
        .map(RecordCard::from_record)
        .collect()
}

/// Renders an 18-decimal amount the way wallets show ether: `1.5`, `100.0`.
pub fn format_reward(amount: &U256) -> String {
    let unit = U256::from(10u64).pow(U256::from(ETHER_DECIMALS));
    let whole = *amount / unit;
    let fraction = (*amount % unit).to_string();
    let fraction = format!("{fraction:0>width$}", width = ETHER_DECIMALS);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        format!("{whole}.0")
    } else {
        format!("{whole}.{fraction}")
    }
}

/// `0xAbCd...1234` form of the checksummed address.
pub fn short_address(address: &Address) -> String {
    let full = address.to_checksum(None);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

/// UTC calendar day of a unix timestamp; `None` for zero (no expiration
/// recorded) or values chrono cannot represent.
pub fn expiration_date(timestamp: &U256) -> Option<NaiveDate> {
    if timestamp.is_zero() {
        return None;
    }
    let seconds = i64::try_from(u64::try_from(*timestamp).ok()?).ok()?;
    DateTime::from_timestamp(seconds, 0).map(|moment| moment.date_naive())
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;

use chrono::NaiveDateTime;
use core_types::StateSnapshot;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bumped whenever the shape of `HistoryEntry` changes.
pub const HISTORY_SCHEMA_VERSION: u32 = 1;

/// A history-stripped copy of the position map, keyed by ticker.
pub type Structure = BTreeMap<String, StateSnapshot>;

/// One committed batch of trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub schema_version: u32,
    /// Starts at 1 and grows by exactly one per entry.
    pub sequence: u64,
    pub timestamp: NaiveDateTime,
    /// `full_balance` right after the batch was committed.
    pub balance: Decimal,
    pub structure_before: Structure,
    /// The fills of the batch, as quantity/price/trigger records.
    pub structure_received: Structure,
    pub structure_after: Structure,
}

/// Append-only audit trail of the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryLog {
    entries: Vec<HistoryEntry>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new entry with the next sequence number.
    pub fn record(
        &mut self,
        timestamp: NaiveDateTime,
        balance: Decimal,
        structure_before: Structure,
        structure_received: Structure,
        structure_after: Structure,
    ) -> &HistoryEntry {
        let sequence = self.entries.last().map_or(1, |last| last.sequence + 1);
        self.entries.push(HistoryEntry {
            schema_version: HISTORY_SCHEMA_VERSION,
            sequence,
            timestamp,
            balance,
            structure_before,
            structure_received,
            structure_after,
        });
        tracing::debug!(sequence, %timestamp, %balance, "History entry recorded");
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// The `n` most recent entries, oldest first.
    pub fn tail(&self, n: usize) -> &[HistoryEntry] {
        &self.entries[self.entries.len().saturating_sub(n)..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when sequence numbers run 1, 2, 3, ... without gaps.
    pub fn is_contiguous(&self) -> bool {
        self.entries.iter().zip(1u64..).all(|(entry, expected)| entry.sequence == expected)
    }
}

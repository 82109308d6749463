//! Per-station daily history, one JSON file per station.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::StoreError,
    model::{MeasurementSet, Snapshot, StationResult},
    store,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub values: MeasurementSet,
    pub last_fetched: DateTime<Utc>,
}

impl HistoryEntry {
    /// Entry dated by the civil day (at `offset`) the result was fetched on.
    pub fn from_result(result: &StationResult, offset: FixedOffset) -> Self {
        Self {
            date: result.metadata.last_fetched.with_timezone(&offset).date_naive(),
            values: result.values,
            last_fetched: result.metadata.last_fetched,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    Appended,
    /// An entry for the same date existed and was replaced in place.
    Replaced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalLog {
    pub station: String,
    #[serde(default)]
    pub data: Vec<HistoryEntry>,
}

impl HistoricalLog {
    pub fn new(station: impl Into<String>) -> Self {
        Self { station: station.into(), data: Vec::new() }
    }

    /// Record `entry`, keeping at most one entry per date and at most
    /// `max_entries` entries overall (oldest dates evicted first).
    pub fn record(&mut self, entry: HistoryEntry, max_entries: usize) -> Recorded {
        let recorded = match self.data.iter_mut().find(|e| e.date == entry.date) {
            Some(existing) => {
                *existing = entry;
                Recorded::Replaced
            }
            None => {
                self.data.push(entry);
                self.data.sort_by_key(|e| e.date);
                Recorded::Appended
            }
        };

        if self.data.len() > max_entries {
            let excess = self.data.len() - max_entries;
            self.data.drain(..excess);
        }

        recorded
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

pub fn history_path(dir: &Path, code: &str) -> PathBuf {
    dir.join(format!("{code}.json"))
}

/// Load the log for `code`, or start an empty one if none exists yet.
pub fn load_or_new(path: &Path, code: &str) -> Result<HistoricalLog, StoreError> {
    match store::read_json::<HistoricalLog>(path) {
        Ok(log) => Ok(log),
        Err(StoreError::NotFound(_)) => Ok(HistoricalLog::new(code)),
        Err(e) => Err(e),
    }
}

/// Read-modify-write the log of one station.
pub fn append(
    dir: &Path,
    code: &str,
    entry: HistoryEntry,
    max_entries: usize,
) -> Result<Recorded, StoreError> {
    let path = history_path(dir, code);
    let mut log = load_or_new(&path, code)?;
    let recorded = log.record(entry, max_entries);
    store::write_json(&path, &log)?;
    Ok(recorded)
}

/// Append every successful result of `snapshot`. A failure on one station
/// is logged and does not stop the others; returns how many were written.
pub fn append_snapshot(
    dir: &Path,
    snapshot: &Snapshot,
    offset: FixedOffset,
    max_entries: usize,
) -> usize {
    let mut written = 0;

    for (code, result) in snapshot.stations.iter().filter(|(_, r)| r.success) {
        let entry = HistoryEntry::from_result(result, offset);
        match append(dir, code, entry, max_entries) {
            Ok(recorded) => {
                log::debug!("History for {code}: {recorded:?}");
                written += 1;
            }
            Err(e) => log::warn!("Could not update history for {code}: {e}"),
        }
    }

    written
}

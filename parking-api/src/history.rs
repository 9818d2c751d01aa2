//! Turns stored parking sessions into the per-plate timeline returned by
//! the history endpoint.

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::store::SessionRow;

/// One line of a plate's parking history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HistoryEntry {
    pub id: i32,
    /// Time spent parked, e.g. `"25 minutes"`.
    pub time: String,
    pub paid: bool,
    pub left: bool,
}

/// Renders the time between `from` and `to` in whole minutes.
///
/// Negative spans (clock skew between writers) render as zero.
pub fn format_elapsed(from: NaiveDateTime, to: NaiveDateTime) -> String {
    let elapsed = (to - from).max(TimeDelta::zero());
    let minutes = elapsed.num_milliseconds() as f64 / 60_000.0;
    format!("{:.0} minutes", minutes)
}

/// Builds the history entry for a single session.
///
/// A session without a checkout is still parked: its time runs up to `now`
/// and it is not marked as `left`.
pub fn entry(row: &SessionRow, now: NaiveDateTime) -> HistoryEntry {
    let until = row.checkout.unwrap_or(now);
    HistoryEntry {
        id: row.id,
        time: format_elapsed(row.checkin, until),
        paid: row.paid,
        left: row.checkout.is_some(),
    }
}

/// Maps every row to its entry, keeping the order the store returned.
pub fn aggregate(rows: &[SessionRow], now: NaiveDateTime) -> Vec<HistoryEntry> {
    rows.iter().map(|row| entry(row, now)).collect()
}

//! The persistence contract the parking lifecycle depends on.
//!
//! `ParkingService` only talks to storage through [`SessionStore`], so the
//! lifecycle rules can run against SQLite in production and against plain
//! in-memory doubles in tests.

use chrono::NaiveDateTime;
use thiserror::Error;

/// Failures reported by a [`SessionStore`].
///
/// `NotFound` and `Conflict` are kept apart from every other failure so the
/// lifecycle can turn them into domain outcomes instead of internal errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    /// A conditional write found the row already in its target state.
    #[error("conditional write lost: record already updated")]
    Conflict,
    #[error("storage failure: {0}")]
    Backend(String),
}

/// A parking session as read back for history, with payment presence
/// resolved to an explicit flag.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRow {
    pub id: i32,
    pub plate: String,
    pub checkin: NaiveDateTime,
    pub checkout: Option<NaiveDateTime>,
    pub paid: bool,
}

pub trait SessionStore {
    /// Persists a new session and returns its identifier.
    fn create_session(&mut self, plate: &str, checkin: NaiveDateTime) -> Result<i32, StoreError>;

    /// All sessions recorded for `plate`, oldest first.
    fn find_sessions_by_plate(&mut self, plate: &str) -> Result<Vec<SessionRow>, StoreError>;

    fn is_paid(&mut self, id: i32) -> Result<bool, StoreError>;

    fn has_checked_out(&mut self, id: i32) -> Result<bool, StoreError>;

    /// Records the payment for `id`. Returns `Conflict` when one already exists.
    fn record_payment(&mut self, id: i32) -> Result<(), StoreError>;

    /// Sets the checkout time for `id`. Returns `Conflict` when it is already set.
    fn set_checkout(&mut self, id: i32, at: NaiveDateTime) -> Result<(), StoreError>;
}

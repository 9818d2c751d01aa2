//! Parking session lifecycle: reservation, payment, checkout and history.
//!
//! A session moves from reserved to paid to checked out. Checkout requires
//! payment; payment does not imply checkout. Inputs are validated before the
//! store is touched, so a rejected request never leaves a partial write.

use chrono::{NaiveDateTime, Utc};
use plate::{Plate, validate as is_valid_plate};
use thiserror::Error;

use crate::history::{self, HistoryEntry};
use crate::store::{SessionStore, StoreError};

/// Every outcome of a lifecycle operation other than plain success.
///
/// `AlreadyPaid` and `AlreadyCheckedOut` are settled outcomes: the request
/// was a repeat of something that already happened. Callers should treat
/// them as success (see [`ParkingError::is_settled`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParkingError {
    #[error("Plate must be valid, format: AAA-1234")]
    InvalidPlate,
    #[error("ID must be valid")]
    InvalidId,
    #[error("Not found")]
    NotFound,
    #[error("You have already paid")]
    AlreadyPaid,
    #[error("You have already checked out")]
    AlreadyCheckedOut,
    #[error("You have to pay first")]
    PayFirst,
    #[error("Image recognition failed")]
    RecognitionFailed,
    /// Recognition produced text, but not a valid plate. Carries the text.
    #[error("Text recognized `{0}` is not in the right format: AAA-1234")]
    UnreadablePlate(String),
    #[error("Internal server error")]
    Internal,
}

impl ParkingError {
    /// True for the idempotent "already done" outcomes.
    pub fn is_settled(&self) -> bool {
        matches!(self, ParkingError::AlreadyPaid | ParkingError::AlreadyCheckedOut)
    }
}

/// Maps lookup failures: a missing record is `NotFound`, anything else is internal.
fn lookup_error(err: StoreError) -> ParkingError {
    match err {
        StoreError::NotFound => ParkingError::NotFound,
        other => {
            error!("Session lookup failed: {}", other);
            ParkingError::Internal
        }
    }
}

/// Parses a session identifier taken from a request path.
///
/// Only plain decimal digits are accepted, and zero is rejected. Numbers
/// beyond the identifier range cannot name a stored session and resolve to
/// `NotFound` without consulting the store.
pub fn parse_id(raw: &str) -> Result<i32, ParkingError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParkingError::InvalidId);
    }
    let value: u64 = raw.parse().map_err(|_| ParkingError::NotFound)?;
    match value {
        0 => Err(ParkingError::InvalidId),
        v => i32::try_from(v).map_err(|_| ParkingError::NotFound),
    }
}

fn utc_now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Runs the lifecycle rules against a [`SessionStore`].
///
/// The service is built per request around whatever store the caller
/// supplies; it holds no state of its own between calls.
pub struct ParkingService<S> {
    store: S,
    clock: fn() -> NaiveDateTime,
}

impl<S: SessionStore> ParkingService<S> {
    pub fn new(store: S) -> Self {
        ParkingService { store, clock: utc_now }
    }

    /// Replaces the wall clock used for check-in, checkout and history durations.
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Opens a new session for `plate` and returns its id.
    pub fn reserve(&mut self, raw_plate: &str) -> Result<i32, ParkingError> {
        let plate: Plate = raw_plate.parse().map_err(|e| {
            warn!("Reservation rejected: {}", e);
            ParkingError::InvalidPlate
        })?;

        let id = self
            .store
            .create_session(plate.as_str(), (self.clock)())
            .map_err(|e| {
                error!("Error creating parking session for {}: {}", plate, e);
                ParkingError::Internal
            })?;

        info!("Parking session {} reserved for {} ({:?})", id, plate, plate.format());
        Ok(id)
    }

    /// Reserves from OCR output. An invalid plate reports the recognized text
    /// back instead of the generic plate error.
    pub fn reserve_recognized(&mut self, recognized: &str) -> Result<i32, ParkingError> {
        match self.reserve(recognized) {
            Err(ParkingError::InvalidPlate) => {
                Err(ParkingError::UnreadablePlate(recognized.to_string()))
            }
            other => other,
        }
    }

    /// Returns every session recorded for `plate`, in store order.
    pub fn history(&mut self, plate: &str) -> Result<Vec<HistoryEntry>, ParkingError> {
        if !is_valid_plate(plate) {
            return Err(ParkingError::InvalidPlate);
        }

        let rows = self.store.find_sessions_by_plate(plate).map_err(|e| {
            error!("Error loading parking history for {}: {}", plate, e);
            ParkingError::Internal
        })?;

        if rows.is_empty() {
            return Err(ParkingError::NotFound);
        }

        Ok(history::aggregate(&rows, (self.clock)()))
    }

    /// Marks the session as paid.
    pub fn pay(&mut self, raw_id: &str) -> Result<(), ParkingError> {
        let id = parse_id(raw_id)?;

        if self.store.is_paid(id).map_err(lookup_error)? {
            return Err(ParkingError::AlreadyPaid);
        }

        match self.store.record_payment(id) {
            Ok(()) => {
                info!("Parking session {} paid", id);
                Ok(())
            }
            // Another request paid between our read and write.
            Err(StoreError::Conflict) => Err(ParkingError::AlreadyPaid),
            Err(StoreError::NotFound) => Err(ParkingError::NotFound),
            Err(e) => {
                error!("Error recording payment for session {}: {}", id, e);
                Err(ParkingError::Internal)
            }
        }
    }

    /// Closes a paid session.
    pub fn checkout(&mut self, raw_id: &str) -> Result<(), ParkingError> {
        let id = parse_id(raw_id)?;

        if !self.store.is_paid(id).map_err(lookup_error)? {
            warn!("Checkout of session {} refused: not paid", id);
            return Err(ParkingError::PayFirst);
        }

        if self.store.has_checked_out(id).map_err(lookup_error)? {
            return Err(ParkingError::AlreadyCheckedOut);
        }

        match self.store.set_checkout(id, (self.clock)()) {
            Ok(()) => {
                info!("Parking session {} checked out", id);
                Ok(())
            }
            Err(StoreError::Conflict) => Err(ParkingError::AlreadyCheckedOut),
            Err(StoreError::NotFound) => Err(ParkingError::NotFound),
            Err(e) => {
                error!("Error checking out session {}: {}", id, e);
                Err(ParkingError::Internal)
            }
        }
    }
}

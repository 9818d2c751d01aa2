//! SQLite persistence for parking sessions and their payments.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

use super::db::configure_connection;
use crate::models::{NewParking, NewPayment, Parking, Payment};
use crate::schema::{parkings, payments};
use crate::store::{SessionRow, SessionStore, StoreError};

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => StoreError::NotFound,
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                StoreError::Conflict
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                StoreError::NotFound
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Creates a new parking session.
pub fn insert_parking(
    conn: &mut SqliteConnection,
    plate: &str,
    checkin: NaiveDateTime,
) -> Result<Parking, DieselError> {
    let new_parking = NewParking {
        plate: plate.to_string(),
        checkin,
    };

    diesel::insert_into(parkings::table)
        .values(&new_parking)
        .execute(conn)?;

    // Return the inserted session
    parkings::table
        .order(parkings::id.desc())
        .select(Parking::as_select())
        .first(conn)
}

/// Gets a parking session by its ID.
pub fn get_parking_by_id(
    conn: &mut SqliteConnection,
    parking_id: i32,
) -> Result<Option<Parking>, DieselError> {
    parkings::table
        .find(parking_id)
        .select(Parking::as_select())
        .first(conn)
        .optional()
}

/// Gets every session for a plate together with its payment flag, oldest first.
pub fn get_parkings_with_payment_by_plate(
    conn: &mut SqliteConnection,
    lookup_plate: &str,
) -> Result<Vec<(Parking, bool)>, DieselError> {
    let rows = parkings::table
        .left_join(payments::table)
        .filter(parkings::plate.eq(lookup_plate))
        .order(parkings::id.asc())
        .select((Parking::as_select(), payments::paid.nullable()))
        .load::<(Parking, Option<bool>)>(conn)?;

    Ok(rows
        .into_iter()
        .map(|(parking, paid)| (parking, paid.unwrap_or(false)))
        .collect())
}

/// Gets the payment recorded for a session, if any.
pub fn get_payment_by_parking(
    conn: &mut SqliteConnection,
    lookup_parking_id: i32,
) -> Result<Option<Payment>, DieselError> {
    payments::table
        .filter(payments::parking_id.eq(lookup_parking_id))
        .select(Payment::as_select())
        .first(conn)
        .optional()
}

/// Records a payment for a session (no duplicate check; see `SqliteSessionStore`).
pub fn insert_payment(
    conn: &mut SqliteConnection,
    parking_id: i32,
    paid_at: NaiveDateTime,
) -> Result<Payment, DieselError> {
    let new_payment = NewPayment {
        parking_id,
        paid: true,
        created_at: paid_at,
    };

    diesel::insert_into(payments::table)
        .values(&new_payment)
        .execute(conn)?;

    payments::table
        .order(payments::id.desc())
        .select(Payment::as_select())
        .first(conn)
}

/// Sets the checkout time of a session that has not checked out yet.
///
/// Returns the number of rows changed: zero if the session is missing or
/// already checked out.
pub fn update_checkout_if_open(
    conn: &mut SqliteConnection,
    parking_id: i32,
    at: NaiveDateTime,
) -> Result<usize, DieselError> {
    diesel::update(
        parkings::table
            .filter(parkings::id.eq(parking_id))
            .filter(parkings::checkout.is_null()),
    )
    .set(parkings::checkout.eq(Some(at)))
    .execute(conn)
}

/// [`SessionStore`] over a single SQLite connection.
///
/// Built per request from a pooled connection inside `DbConn::run`. Writes
/// that check and then modify a session run in `BEGIN IMMEDIATE`
/// transactions, so two connections racing on the same session serialize
/// on the write lock and the second one sees the first one's write.
pub struct SqliteSessionStore<'a> {
    conn: &'a mut SqliteConnection,
}

impl<'a> SqliteSessionStore<'a> {
    /// Configures the connection (see [`configure_connection`]) and wraps it.
    pub fn open(conn: &'a mut SqliteConnection) -> Result<Self, StoreError> {
        configure_connection(conn)?;
        Ok(SqliteSessionStore { conn })
    }
}

impl SessionStore for SqliteSessionStore<'_> {
    fn create_session(&mut self, plate: &str, checkin: NaiveDateTime) -> Result<i32, StoreError> {
        // Insert and read-back must see the same row.
        let parking = self
            .conn
            .immediate_transaction(|conn| insert_parking(conn, plate, checkin))?;
        Ok(parking.id)
    }

    fn find_sessions_by_plate(&mut self, plate: &str) -> Result<Vec<SessionRow>, StoreError> {
        let rows = get_parkings_with_payment_by_plate(self.conn, plate)?;
        Ok(rows
            .into_iter()
            .map(|(parking, paid)| SessionRow {
                id: parking.id,
                plate: parking.plate,
                checkin: parking.checkin,
                checkout: parking.checkout,
                paid,
            })
            .collect())
    }

    fn is_paid(&mut self, id: i32) -> Result<bool, StoreError> {
        get_parking_by_id(self.conn, id)?.ok_or(StoreError::NotFound)?;
        Ok(get_payment_by_parking(self.conn, id)?.is_some())
    }

    fn has_checked_out(&mut self, id: i32) -> Result<bool, StoreError> {
        let parking = get_parking_by_id(self.conn, id)?.ok_or(StoreError::NotFound)?;
        Ok(parking.checkout.is_some())
    }

    fn record_payment(&mut self, id: i32) -> Result<(), StoreError> {
        self.conn.immediate_transaction(|conn| {
            get_parking_by_id(conn, id)?.ok_or(StoreError::NotFound)?;
            if get_payment_by_parking(conn, id)?.is_some() {
                return Err(StoreError::Conflict);
            }
            insert_payment(conn, id, Utc::now().naive_utc())?;
            Ok(())
        })
    }

    fn set_checkout(&mut self, id: i32, at: NaiveDateTime) -> Result<(), StoreError> {
        self.conn.immediate_transaction(|conn| {
            if update_checkout_if_open(conn, id, at)? == 1 {
                return Ok(());
            }
            match get_parking_by_id(conn, id)? {
                Some(_) => Err(StoreError::Conflict),
                None => Err(StoreError::NotFound),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{ParkingError, ParkingService};
    use crate::orm::run_pending_migrations;
    use crate::orm::testing::setup_test_db;
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use uuid::Uuid;

    /// A migrated SQLite file that several connections can open at once.
    struct SharedDbFile(PathBuf);

    impl SharedDbFile {
        fn new() -> Self {
            let path = std::env::temp_dir().join(format!("parking-test-{}.sqlite", Uuid::new_v4()));
            let mut conn = SqliteConnection::establish(&path.to_string_lossy())
                .expect("Failed to create database file");
            run_pending_migrations(&mut conn).expect("Failed to run pending migrations");
            SharedDbFile(path)
        }

        fn connect(&self) -> SqliteConnection {
            SqliteConnection::establish(&self.0.to_string_lossy()).expect("Failed to open database file")
        }
    }

    impl Drop for SharedDbFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    /// Runs `op` for every id on two connections at once, in lockstep, and
    /// returns each connection's outcomes.
    fn race<T: Send + 'static>(
        db: &SharedDbFile,
        ids: &[i32],
        op: fn(&mut ParkingService<SqliteSessionStore<'_>>, &str) -> T,
    ) -> Vec<Vec<T>> {
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let mut conn = db.connect();
                let ids = ids.to_vec();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let store = SqliteSessionStore::open(&mut conn).expect("Failed to configure connection");
                    let mut service = ParkingService::new(store);
                    ids.iter()
                        .map(|id| {
                            barrier.wait();
                            op(&mut service, &id.to_string())
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().expect("racing thread panicked"))
            .collect()
    }

    fn assert_one_winner(outcomes: &[Vec<Result<(), ParkingError>>], settled: ParkingError) {
        for (first, second) in outcomes[0].iter().zip(&outcomes[1]) {
            let mut pair = vec![first.clone(), second.clone()];
            pair.sort_by_key(|outcome| outcome.is_err());
            assert_eq!(pair, vec![Ok(()), Err(settled.clone())]);
        }
    }

    fn at(hour: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(hour, min, 0)
            .unwrap()
    }

    #[test]
    fn test_insert_parking() {
        let mut conn = setup_test_db();

        let first = insert_parking(&mut conn, "ABC-1234", at(9, 0)).expect("Failed to insert parking");
        let second = insert_parking(&mut conn, "ABC1D23", at(9, 5)).expect("Failed to insert parking");

        assert!(first.id > 0);
        assert!(first.id < second.id);
        assert_eq!(first.plate, "ABC-1234");
        assert_eq!(first.checkin, at(9, 0));
        assert_eq!(first.checkout, None);

        let fetched = get_parking_by_id(&mut conn, second.id).unwrap().unwrap();
        assert_eq!(fetched, second);
        assert_eq!(get_parking_by_id(&mut conn, 9999).unwrap(), None);
    }

    #[test]
    fn test_history_rows_carry_payment_flag() {
        let mut conn = setup_test_db();

        let first = insert_parking(&mut conn, "ABC-1234", at(8, 0)).unwrap();
        insert_parking(&mut conn, "XYZ-9876", at(8, 30)).unwrap();
        let third = insert_parking(&mut conn, "ABC-1234", at(10, 0)).unwrap();
        insert_payment(&mut conn, first.id, at(9, 0)).unwrap();

        let rows = get_parkings_with_payment_by_plate(&mut conn, "ABC-1234").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0.id, first.id);
        assert!(rows[0].1);
        assert_eq!(rows[1].0.id, third.id);
        assert!(!rows[1].1);

        assert!(get_parkings_with_payment_by_plate(&mut conn, "NOP-0000").unwrap().is_empty());
    }

    #[test]
    fn test_store_lookups_distinguish_missing_sessions() {
        let mut conn = setup_test_db();
        let mut store = SqliteSessionStore::open(&mut conn).unwrap();

        assert_eq!(store.is_paid(42), Err(StoreError::NotFound));
        assert_eq!(store.has_checked_out(42), Err(StoreError::NotFound));
        assert_eq!(store.record_payment(42), Err(StoreError::NotFound));
        assert_eq!(store.set_checkout(42, at(12, 0)), Err(StoreError::NotFound));
    }

    #[test]
    fn test_store_payment_is_recorded_once() {
        let mut conn = setup_test_db();
        let mut store = SqliteSessionStore::open(&mut conn).unwrap();

        let id = store.create_session("ABC-1234", at(9, 0)).unwrap();
        assert_eq!(store.is_paid(id), Ok(false));

        assert_eq!(store.record_payment(id), Ok(()));
        assert_eq!(store.is_paid(id), Ok(true));
        assert_eq!(store.record_payment(id), Err(StoreError::Conflict));

        let count: i64 = payments::table
            .filter(payments::parking_id.eq(id))
            .count()
            .get_result(&mut conn)
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_duplicate_payment_rejected_by_schema() {
        let mut conn = setup_test_db();
        let parking = insert_parking(&mut conn, "ABC-1234", at(9, 0)).unwrap();
        insert_payment(&mut conn, parking.id, at(9, 30)).unwrap();

        let err = insert_payment(&mut conn, parking.id, at(9, 31)).unwrap_err();
        assert_eq!(StoreError::from(err), StoreError::Conflict);
    }

    #[test]
    fn test_store_checkout_is_set_once() {
        let mut conn = setup_test_db();
        let mut store = SqliteSessionStore::open(&mut conn).unwrap();

        let id = store.create_session("ABC1D23", at(9, 0)).unwrap();
        assert_eq!(store.has_checked_out(id), Ok(false));

        assert_eq!(store.set_checkout(id, at(10, 0)), Ok(()));
        assert_eq!(store.has_checked_out(id), Ok(true));
        assert_eq!(store.set_checkout(id, at(11, 0)), Err(StoreError::Conflict));

        let rows = store.find_sessions_by_plate("ABC1D23").unwrap();
        assert_eq!(rows[0].checkout, Some(at(10, 0)));
    }

    #[test]
    fn test_concurrent_payments_pay_once() {
        let db = SharedDbFile::new();
        let mut conn = db.connect();
        let ids: Vec<i32> = (0..20)
            .map(|minute| insert_parking(&mut conn, "ABC-1234", at(9, minute)).unwrap().id)
            .collect();
        drop(conn);

        let outcomes = race(&db, &ids, |service, id| service.pay(id));
        assert_one_winner(&outcomes, ParkingError::AlreadyPaid);

        let mut conn = db.connect();
        let count: i64 = payments::table.count().get_result(&mut conn).unwrap();
        assert_eq!(count, ids.len() as i64);
    }

    #[test]
    fn test_concurrent_checkouts_check_out_once() {
        let db = SharedDbFile::new();
        let mut conn = db.connect();
        let ids: Vec<i32> = (0..20)
            .map(|minute| {
                let parking = insert_parking(&mut conn, "ABC1D23", at(9, minute)).unwrap();
                insert_payment(&mut conn, parking.id, at(10, minute)).unwrap();
                parking.id
            })
            .collect();
        drop(conn);

        let outcomes = race(&db, &ids, |service, id| service.checkout(id));
        assert_one_winner(&outcomes, ParkingError::AlreadyCheckedOut);
    }
}

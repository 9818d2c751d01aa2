use diesel::{Identifiable, Insertable, Queryable, Selectable};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::schema::parkings;

/// One parking session: a single check-in of one vehicle.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[diesel(table_name = parkings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export)]
pub struct Parking {
    pub id: i32,
    pub plate: String,
    #[ts(type = "string")]
    pub checkin: chrono::NaiveDateTime,
    #[ts(type = "string | null")]
    pub checkout: Option<chrono::NaiveDateTime>, // None while the vehicle is still parked
}

#[derive(Insertable)]
#[diesel(table_name = parkings)]
pub struct NewParking {
    pub plate: String,
    pub checkin: chrono::NaiveDateTime,
}

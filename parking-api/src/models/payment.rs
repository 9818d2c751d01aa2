use diesel::{Associations, Identifiable, Insertable, Queryable, Selectable};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::schema::payments;

#[derive(
    Queryable, Selectable, Identifiable, Associations, Debug, Clone, Serialize, Deserialize, TS,
)]
#[diesel(belongs_to(crate::models::parking::Parking))]
#[diesel(table_name = payments)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export)]
pub struct Payment {
    pub id: i32,
    pub parking_id: i32, // Foreign key to Parking
    pub paid: bool,
    #[ts(type = "string")]
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = payments)]
pub struct NewPayment {
    pub parking_id: i32,
    pub paid: bool,
    pub created_at: chrono::NaiveDateTime,
}

//! API version 1 - Status endpoints
//!
//! Health check used by load balancers and deploy scripts. It reports the
//! build that is running and whether the database answers a trivial query.

use diesel::RunQueryDsl;
use rocket::{Route, serde::json::Json};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::built_info;
use crate::orm::DbConn;

#[derive(Debug, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HealthStatus {
    pub status: String,
    pub database: String,
    pub version: String,
    pub built: String,
    pub git_commit: Option<String>,
}

/// Health Status endpoint.
///
/// - **URL:** `/api/1/status`
/// - **Method:** `GET`
/// - **Purpose:** Returns the health status of the application
///
/// # Response
///
/// **Success (HTTP 200 OK):**
/// ```json
/// {
///   "status": "running",
///   "database": "ok",
///   "version": "0.1.0",
///   "built": "Fri, 15 Aug 2025 18:13:43 +0000",
///   "git_commit": "cd51275141a2e7d49737aa7dd4e8ff7c9a804d67"
/// }
/// ```
///
/// `database` is `"unavailable"` when the connection cannot run `SELECT 1`.
#[rocket::get("/1/status")]
pub async fn health_status(db: DbConn) -> Json<HealthStatus> {
    let database = match db.run(|c| diesel::sql_query("SELECT 1").execute(c)).await {
        Ok(_) => "ok",
        Err(e) => {
            warn!("Health check query failed: {}", e);
            "unavailable"
        }
    };

    Json(HealthStatus {
        status: "running".to_string(),
        database: database.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        built: built_info::BUILT_TIME_UTC.to_string(),
        git_commit: built_info::GIT_COMMIT_HASH.map(str::to_string),
    })
}

/// Returns a vector of all routes defined in this module.
pub fn routes() -> Vec<Route> {
    routes![health_status]
}

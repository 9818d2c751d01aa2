//! Database and server fixtures shared by unit and integration tests.

use std::path::PathBuf;
use std::sync::Arc;

use diesel::connection::SimpleConnection;
use diesel::sqlite::SqliteConnection;
use rocket::fairing::AdHoc;
use rocket::figment::{
    util::map,
    value::{Map, Value},
};
use rocket::{Build, Rocket};
use uuid::Uuid;

use super::db::{DbConn, configure_connection, run_pending_migrations};
use crate::recognition::{PlateRecognizer, SharedRecognizer, TesseractCli};

/// Configures SQLite with performance-optimized settings for testing.
///
/// Sets the following PRAGMAs:
/// - `synchronous = OFF`: Disables synchronous writes for faster performance
/// - `journal_mode = OFF`: Disables rollback journal
///
/// These settings make SQLite faster but less durable - only use for testing.
fn set_sqlite_test_pragmas(conn: &mut diesel::SqliteConnection) -> diesel::QueryResult<()> {
    conn.batch_execute(
        r#"
        PRAGMA synchronous = OFF;
        PRAGMA journal_mode = OFF;
        "#,
    )
}

fn set_sqlite_test_pragmas_fairing() -> AdHoc {
    AdHoc::on_ignite("Set SQLite Test Pragmas", |rocket| async {
        if let Some(conn) = DbConn::get_one(&rocket).await {
            if let Err(e) = conn.run(set_sqlite_test_pragmas).await {
                eprintln!("[test-db] Failed to set SQLite pragmas: {}", e);
            }
        }
        rocket
    })
}

/// Upload directory shared by every test Rocket. Uploads get unique names
/// and are removed after recognition, so the directory never grows.
pub fn test_upload_dir() -> PathBuf {
    std::env::temp_dir().join("parking-api-test-uploads")
}

/// Creates a Rocket instance backed by a fresh in-memory SQLite database
/// and the given plate recognizer.
///
/// The returned Rocket instance will have:
/// - A uniquely named shared-cache in-memory database
/// - Foreign keys enabled, testing pragmas set and all migrations run
/// - Uploads written to [`test_upload_dir`]
/// - API routes and JSON catchers registered
pub fn test_rocket_with_recognizer<R: PlateRecognizer + 'static>(recognizer: R) -> Rocket<Build> {
    let unique_db_name = format!("file:test_db_{}?mode=memory&cache=shared", Uuid::new_v4());

    let db_config: Map<_, Value> = map! {
        "url" => unique_db_name.into(),
        "pool_size" => 5.into(),
        "timeout" => 5.into(),
    };

    let upload_dir = test_upload_dir();

    let figment = rocket::Config::figment()
        .merge(("databases", map!["sqlite_db" => db_config]))
        .merge(("parking.upload_dir", upload_dir.to_string_lossy().to_string()));

    let recognizer: SharedRecognizer = Arc::new(recognizer);

    let rocket = rocket::custom(figment)
        .attach(DbConn::fairing())
        .attach(super::db::configure_connection_fairing())
        .attach(set_sqlite_test_pragmas_fairing())
        .attach(super::db::run_migrations_fairing())
        .attach(crate::config::config_fairing())
        .manage(recognizer);

    crate::register_catchers(crate::mount_api_routes(rocket))
}

/// Same as [`test_rocket_with_recognizer`] with the `tesseract` recognizer.
pub fn test_rocket() -> Rocket<Build> {
    test_rocket_with_recognizer(TesseractCli::default())
}

/// Creates a synchronous in-memory SQLite database connection for unit tests.
///
/// Runs all embedded migrations and enables foreign keys. Each call returns
/// a new, independent database.
///
/// # Panics
/// Panics if the database cannot be created or migrated.
pub fn setup_test_db() -> SqliteConnection {
    use diesel::Connection;

    let mut conn = SqliteConnection::establish(":memory:")
        .expect("Failed to create in-memory SQLite database");
    configure_connection(&mut conn).expect("Failed to configure connection");
    run_pending_migrations(&mut conn).expect("Failed to run pending migrations");
    conn
}

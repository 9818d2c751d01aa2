use diesel::connection::SimpleConnection;
use diesel::result::QueryResult;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use rocket::fairing::AdHoc;
use rocket_sync_db_pools::database;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[database("sqlite_db")]
pub struct DbConn(diesel::SqliteConnection);

/// Milliseconds a connection waits on a locked database before giving up.
pub const BUSY_TIMEOUT_MS: u32 = 5000;

/// Applies the per-connection settings the session store relies on.
///
/// Foreign keys are disabled by default in SQLite for backwards
/// compatibility; payments rely on them to reference existing sessions.
/// The busy timeout lets a writer wait for a concurrent transaction instead
/// of failing with "database is locked". Both settings are connection-local,
/// so this runs on every connection the store is built from.
pub fn configure_connection(conn: &mut diesel::SqliteConnection) -> QueryResult<()> {
    conn.batch_execute(&format!(
        "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
        BUSY_TIMEOUT_MS
    ))
}

/// Runs all pending database migrations on the provided connection.
pub fn run_pending_migrations(
    conn: &mut diesel::SqliteConnection,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    conn.run_pending_migrations(MIGRATIONS)?;
    Ok(())
}

/// Creates a Rocket fairing that checks, on ignition, that a pooled
/// connection accepts [`configure_connection`]. Ignition is aborted if it
/// does not.
pub fn configure_connection_fairing() -> AdHoc {
    AdHoc::try_on_ignite("Configure SQLite", |rocket| async {
        let Some(conn) = DbConn::get_one(&rocket).await else {
            error!("No database connection available to configure");
            return Err(rocket);
        };
        match conn.run(configure_connection).await {
            Ok(()) => Ok(rocket),
            Err(e) => {
                error!("Failed to configure SQLite connection: {}", e);
                Err(rocket)
            }
        }
    })
}

/// Creates a Rocket fairing that runs the embedded Diesel migrations on
/// ignition. Ignition is aborted if any migration fails.
pub fn run_migrations_fairing() -> AdHoc {
    AdHoc::try_on_ignite("Diesel Migrations", |rocket| async {
        let Some(conn) = DbConn::get_one(&rocket).await else {
            error!("No database connection available for migrations");
            return Err(rocket);
        };
        match conn.run(|c| run_pending_migrations(c).map_err(|e| e.to_string())).await {
            Ok(()) => {
                info!("Database migrations are up to date");
                Ok(rocket)
            }
            Err(e) => {
                error!("Failed to run pending migrations: {}", e);
                Err(rocket)
            }
        }
    })
}

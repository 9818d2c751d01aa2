mod db;
pub mod parking;
pub mod testing;

pub use db::*;
pub use parking::SqliteSessionStore;

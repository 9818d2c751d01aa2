#[macro_use]
extern crate rocket;

use rocket::figment::value::Map;
use rocket::figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use rocket::request::Request;
use rocket::serde::json::{Json, Value, json};
use rocket::{Build, Rocket};

pub mod api;
pub mod config;
pub mod history;
pub mod lifecycle;
pub mod logged_json;
pub mod models;
pub mod orm;
pub use orm::DbConn;
pub mod recognition;
pub mod schema;
pub mod store;

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

#[catch(400)]
fn bad_request(req: &Request) -> Json<Value> {
    Json(json!({
        "error": "Bad Request",
        "path": req.uri().path().to_string(),
        "status": 400
    }))
}

#[catch(404)]
fn not_found(req: &Request) -> Json<Value> {
    Json(json!({
        "error": "Not Found",
        "path": req.uri().path().to_string(),
        "status": 404
    }))
}

#[catch(422)]
fn unprocessable_entity(req: &Request) -> Json<Value> {
    Json(json!({
        "error": "Unprocessable Entity",
        "path": req.uri().path().to_string(),
        "status": 422
    }))
}

#[catch(500)]
fn internal_server_error(req: &Request) -> Json<Value> {
    Json(json!({
        "error": "Internal Server Error",
        "path": req.uri().path().to_string(),
        "status": 500
    }))
}

#[catch(default)]
fn default_catcher(status: rocket::http::Status, req: &Request) -> Json<Value> {
    Json(json!({
        "error": status.reason().unwrap_or("Unknown Error"),
        "path": req.uri().path().to_string(),
        "status": status.code
    }))
}

pub fn mount_api_routes(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/api", api::routes())
}

pub fn register_catchers(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.register(
        "/",
        catchers![
            bad_request,
            not_found,
            unprocessable_entity,
            internal_server_error,
            default_catcher
        ],
    )
}

fn log_rocket_info(rocket: &Rocket<Build>) {
    let figment = rocket.figment();

    if let Ok(address) = figment.extract_inner::<String>("address") {
        info!("Rocket is running at: {}", address);
    }

    if let Ok(port) = figment.extract_inner::<u16>("port") {
        info!("Rocket is listening on port: {}", port);
    }

    match figment.extract_inner::<Map<String, Value>>("databases.sqlite_db") {
        Ok(db_config) => {
            if let Some(Value::String(url)) = db_config.get("url") {
                info!("Database URL: {}", url);
            } else {
                warn!("Database URL not found in configuration");
            }
        }
        Err(e) => {
            warn!("Failed to extract database configuration: {}", e);
        }
    }
}

/// Builds the configuration: `Rocket.toml`, then `ROCKET_*` variables, then
/// `DATABASE_URL` if it is set.
pub fn figment() -> Figment {
    let figment = Figment::from(rocket::Config::default())
        .merge(Toml::file("Rocket.toml").nested())
        .merge(Env::prefixed("ROCKET_").global());

    match std::env::var("DATABASE_URL") {
        Ok(database_url) => figment.merge(("databases.sqlite_db.url", database_url)),
        Err(_) => figment,
    }
}

/// Builds the production server. Tests build theirs with
/// `orm::testing::test_rocket`, which uses an in-memory database.
pub fn rocket() -> Rocket<Build> {
    let rocket = rocket::custom(figment())
        .attach(DbConn::fairing())
        .attach(orm::configure_connection_fairing())
        .attach(orm::run_migrations_fairing())
        .attach(config::config_fairing())
        .attach(recognition::recognizer_fairing());

    log_rocket_info(&rocket);

    register_catchers(mount_api_routes(rocket))
}

//! API endpoints for parking sessions.
//!
//! This module exposes the parking lifecycle over HTTP: reserving a spot
//! (by typed plate or by plate image), paying, checking out and reading a
//! plate's history. The lifecycle rules live in [`crate::lifecycle`]; this
//! module only decodes requests and maps outcomes to HTTP statuses.
//!
//! Every failure body has the shape `{"response": "<message>"}`. Repeated
//! payments and checkouts answer HTTP 200 with their own message, so clients
//! that retry are not told they failed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use diesel::SqliteConnection;
use rocket::form::{Errors, Form};
use rocket::fs::TempFile;
use rocket::http::{Method, Status};
use rocket::response::status;
use rocket::route::{self, Handler};
use rocket::serde::json::Json;
use rocket::{Data, FromForm, Request, Route, State};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::config::ParkingConfig;
use crate::history::HistoryEntry;
use crate::lifecycle::{ParkingError, ParkingService};
use crate::logged_json::LoggedJson;
use crate::orm::{DbConn, SqliteSessionStore};
use crate::recognition::{SharedRecognizer, recognize_plate};

/// Plain message body used for confirmations and errors.
#[derive(Debug, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MessageResponse {
    pub response: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Self {
        MessageResponse {
            response: message.into(),
        }
    }
}

/// Request payload for reserving a spot.
#[derive(Debug, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct ReservationRequest {
    pub plate: String,
}

#[derive(Debug, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct ReservationResponse {
    pub id: i32,
}

/// Multipart form for the image reservation endpoint.
#[derive(FromForm)]
pub struct PlateImageUpload<'r> {
    pub plate: TempFile<'r>,
}

type ApiError = status::Custom<Json<MessageResponse>>;

/// HTTP status for each lifecycle outcome.
pub fn status_for(err: &ParkingError) -> Status {
    match err {
        ParkingError::InvalidPlate | ParkingError::InvalidId | ParkingError::UnreadablePlate(_) => {
            Status::BadRequest
        }
        ParkingError::NotFound => Status::NotFound,
        ParkingError::AlreadyPaid | ParkingError::AlreadyCheckedOut => Status::Ok,
        ParkingError::PayFirst => Status::PaymentRequired,
        ParkingError::RecognitionFailed | ParkingError::Internal => Status::InternalServerError,
    }
}

fn api_error(err: ParkingError) -> ApiError {
    status::Custom(status_for(&err), Json(MessageResponse::new(err.to_string())))
}

fn bad_request() -> ApiError {
    status::Custom(Status::BadRequest, Json(MessageResponse::new("Bad request")))
}

/// Runs one lifecycle operation against a pooled connection.
fn with_service<T>(
    conn: &mut SqliteConnection,
    op: impl FnOnce(&mut ParkingService<SqliteSessionStore<'_>>) -> Result<T, ParkingError>,
) -> Result<T, ParkingError> {
    let store = SqliteSessionStore::open(conn).map_err(|e| {
        error!("Error configuring database connection: {}", e);
        ParkingError::Internal
    })?;
    op(&mut ParkingService::new(store))
}

/// Reserve endpoint.
///
/// - **URL:** `/api/1/parking`
/// - **Method:** `POST`
/// - **Purpose:** Opens a parking session for a plate
///
/// # Request Format
///
/// ```json
/// { "plate": "ABC-1234" }
/// ```
///
/// # Response
///
/// **Success (HTTP 200 OK):**
/// ```json
/// { "id": 1 }
/// ```
///
/// **Failure (HTTP 400 Bad Request):**
/// ```json
/// { "response": "Plate must be valid, format: AAA-1234" }
/// ```
#[post("/1/parking", data = "<request>")]
pub async fn reserve(
    db: DbConn,
    request: Result<LoggedJson<ReservationRequest>, rocket::serde::json::Error<'_>>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let request = match request {
        Ok(request) => request.into_inner(),
        Err(e) => {
            warn!("Malformed reservation request: {}", e);
            return Err(bad_request());
        }
    };

    db.run(move |conn| with_service(conn, |service| service.reserve(&request.plate)))
        .await
        .map(|id| Json(ReservationResponse { id }))
        .map_err(api_error)
}

/// History endpoint.
///
/// - **URL:** `/api/1/parking/<plate>`
/// - **Method:** `GET`
/// - **Purpose:** Lists every session for a plate, oldest first
///
/// # Response
///
/// **Success (HTTP 200 OK):**
/// ```json
/// [
///   { "id": 1, "time": "25 minutes", "paid": true, "left": true },
///   { "id": 4, "time": "3 minutes", "paid": false, "left": false }
/// ]
/// ```
///
/// **Failure:** 400 for a malformed plate, 404 when the plate has no sessions.
#[get("/1/parking/<plate>")]
pub async fn history(db: DbConn, plate: &str) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let plate = plate.to_string();
    db.run(move |conn| with_service(conn, |service| service.history(&plate)))
        .await
        .map(Json)
        .map_err(api_error)
}

/// Pay endpoint.
///
/// - **URL:** `/api/1/parking/<id>/pay`
/// - **Method:** `PUT`
/// - **Purpose:** Records the payment for a session
///
/// Answers `{"response": "Paid"}`. Paying an already-paid session answers
/// HTTP 200 with `{"response": "You have already paid"}`.
#[put("/1/parking/<id>/pay")]
pub async fn pay(db: DbConn, id: &str) -> Result<Json<MessageResponse>, ApiError> {
    let id = id.to_string();
    db.run(move |conn| with_service(conn, |service| service.pay(&id)))
        .await
        .map(|()| Json(MessageResponse::new("Paid")))
        .map_err(api_error)
}

/// Checkout endpoint.
///
/// - **URL:** `/api/1/parking/<id>/out`
/// - **Method:** `PUT`
/// - **Purpose:** Closes a paid session
///
/// Answers `{"response": "Checked out"}`, HTTP 402 if the session is not
/// paid yet, and HTTP 200 with `{"response": "You have already checked out"}`
/// on repeats.
#[put("/1/parking/<id>/out")]
pub async fn checkout(db: DbConn, id: &str) -> Result<Json<MessageResponse>, ApiError> {
    let id = id.to_string();
    db.run(move |conn| with_service(conn, |service| service.checkout(&id)))
        .await
        .map(|()| Json(MessageResponse::new("Checked out")))
        .map_err(api_error)
}

/// Copies the uploaded image into `upload_dir` under a unique name.
async fn store_upload(file: &mut TempFile<'_>, upload_dir: &Path) -> std::io::Result<PathBuf> {
    rocket::tokio::fs::create_dir_all(upload_dir).await?;
    let path = upload_dir.join(format!("upload-{}.png", Uuid::new_v4()));
    file.copy_to(&path).await?;
    Ok(path)
}

/// Image reservation endpoint.
///
/// - **URL:** `/api/1/parking/in`
/// - **Method:** `POST`
/// - **Purpose:** Reads the plate from an uploaded image and reserves a spot
///
/// Expects `multipart/form-data` with the image in a file field named
/// `plate`. Answers like the reserve endpoint; recognition failures answer
/// HTTP 500, and recognized text that is not a plate answers HTTP 400 with
/// the text in the message.
#[post("/1/parking/in", data = "<upload>")]
pub async fn reserve_by_image(
    db: DbConn,
    config: &State<ParkingConfig>,
    recognizer: &State<SharedRecognizer>,
    upload: Result<Form<PlateImageUpload<'_>>, Errors<'_>>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let mut upload = match upload {
        Ok(form) => form.into_inner(),
        Err(e) => {
            warn!("Error getting plate image: {}", e);
            return Err(bad_request());
        }
    };

    let image = store_upload(&mut upload.plate, &config.upload_dir)
        .await
        .map_err(|e| {
            error!("Error storing uploaded plate image: {}", e);
            api_error(ParkingError::Internal)
        })?;

    let recognizer = Arc::clone(recognizer.inner());
    let image_path = image.clone();
    let recognized =
        rocket::tokio::task::spawn_blocking(move || recognize_plate(recognizer.as_ref(), &image_path))
            .await;

    if let Err(e) = rocket::tokio::fs::remove_file(&image).await {
        warn!("Could not remove uploaded image {}: {}", image.display(), e);
    }

    let text = match recognized {
        Ok(result) => result.map_err(api_error)?,
        Err(e) => {
            error!("Plate recognition task failed: {}", e);
            return Err(api_error(ParkingError::Internal));
        }
    };

    db.run(move |conn| with_service(conn, |service| service.reserve_recognized(&text)))
        .await
        .map(|id| Json(ReservationResponse { id }))
        .map_err(api_error)
}

/// Answers 405 with a JSON body for a known path hit with the wrong method.
#[derive(Clone)]
struct MethodNotAllowed;

#[rocket::async_trait]
impl Handler for MethodNotAllowed {
    async fn handle<'r>(&self, req: &'r Request<'_>, _data: Data<'r>) -> route::Outcome<'r> {
        warn!("{} {} is not allowed", req.method(), req.uri().path());
        route::Outcome::from(
            req,
            status::Custom(
                Status::MethodNotAllowed,
                Json(MessageResponse::new("Method not allowed")),
            ),
        )
    }
}

/// Rank of the 405 fallbacks; above every generated route rank.
const FALLBACK_RANK: isize = 100;

/// Each parking path with the methods its routes accept.
const PARKING_PATHS: &[(&str, &[Method])] = &[
    ("/1/parking", &[Method::Post]),
    ("/1/parking/<plate>", &[Method::Get]),
    ("/1/parking/<id>/pay", &[Method::Put]),
    ("/1/parking/<id>/out", &[Method::Put]),
];

/// Fallback routes answering 405 on every parking path for the methods
/// that path does not accept. `POST /1/parking/in` shares the `<plate>`
/// shape and outranks its fallback.
fn method_not_allowed_routes() -> Vec<Route> {
    let methods = [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Delete,
        Method::Patch,
    ];

    PARKING_PATHS
        .iter()
        .flat_map(|(path, allowed)| {
            methods
                .iter()
                .filter(move |method| !allowed.contains(*method))
                .map(move |method| Route::ranked(FALLBACK_RANK, *method, *path, MethodNotAllowed))
        })
        .collect()
}

/// Returns a vector of all routes defined in this module.
pub fn routes() -> Vec<Route> {
    let mut routes = routes![reserve, history, pay, checkout, reserve_by_image];
    routes.extend(method_not_allowed_routes());
    routes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&ParkingError::InvalidPlate), Status::BadRequest);
        assert_eq!(status_for(&ParkingError::InvalidId), Status::BadRequest);
        assert_eq!(
            status_for(&ParkingError::UnreadablePlate("X".to_string())),
            Status::BadRequest
        );
        assert_eq!(status_for(&ParkingError::NotFound), Status::NotFound);
        assert_eq!(status_for(&ParkingError::AlreadyPaid), Status::Ok);
        assert_eq!(status_for(&ParkingError::AlreadyCheckedOut), Status::Ok);
        assert_eq!(status_for(&ParkingError::PayFirst), Status::PaymentRequired);
        assert_eq!(
            status_for(&ParkingError::RecognitionFailed),
            Status::InternalServerError
        );
        assert_eq!(status_for(&ParkingError::Internal), Status::InternalServerError);
    }

    #[test]
    fn test_fallbacks_cover_only_unaccepted_methods() {
        let fallbacks = method_not_allowed_routes();

        assert_eq!(fallbacks.len(), 16);
        assert!(fallbacks.iter().all(|route| route.rank == FALLBACK_RANK));

        let count = |method: Method| fallbacks.iter().filter(|route| route.method == method).count();
        assert_eq!(count(Method::Get), 3);
        assert_eq!(count(Method::Post), 3);
        assert_eq!(count(Method::Put), 2);
        assert_eq!(count(Method::Delete), 4);
        assert_eq!(count(Method::Patch), 4);
    }

    #[test]
    fn test_settled_outcomes_map_to_success() {
        for err in [ParkingError::AlreadyPaid, ParkingError::AlreadyCheckedOut] {
            assert!(err.is_settled());
            assert_eq!(status_for(&err), Status::Ok);
        }
    }
}

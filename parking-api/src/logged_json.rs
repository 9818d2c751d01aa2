//! JSON data guard that logs every request body it accepts.
//!
//! `LoggedJson<T>` parses exactly like `Json<T>` and can be used in its place.
//! Parse failures are returned unchanged so routes can wrap the guard in a
//! `Result` and answer with their own error body.

use std::ops::Deref;

use rocket::data::{self, FromData};
use rocket::serde::json::Json;
use rocket::{Data, Request};
use serde::{Deserialize, Serialize};

pub struct LoggedJson<T>(pub T);

impl<T> LoggedJson<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for LoggedJson<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for LoggedJson<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[rocket::async_trait]
impl<'r, T: Deserialize<'r> + Serialize> FromData<'r> for LoggedJson<T> {
    type Error = rocket::serde::json::Error<'r>;

    async fn from_data(req: &'r Request<'_>, data: Data<'r>) -> data::Outcome<'r, Self> {
        Json::<T>::from_data(req, data).await.map(|json| {
            let body = serde_json::to_string(&json.0)
                .unwrap_or_else(|_| "<failed to serialize>".to_string());
            info!("Request body: {} {} | {}", req.method(), req.uri().path(), body);
            LoggedJson(json.into_inner())
        })
    }
}

pub mod parking;
pub mod status;

use rocket::Route;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(parking::routes());
    routes.extend(status::routes());
    routes
}

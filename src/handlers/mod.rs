pub mod auth;
pub mod bookings;
pub mod slots;
pub mod users;

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde_json::json;

use crate::errors::ApiError;

// Same work factor the original service used.
pub(crate) const BCRYPT_COST: u32 = 10;

/// bcrypt is deliberately slow; run it off the async executor.
pub(crate) async fn hash_password(password: String) -> Result<String, ApiError> {
    web::block(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health))
            .route("/auth/login", web::post().to(auth::login))
            .route(
                "/auth/bootstrap-admin",
                web::post().to(auth::bootstrap_admin),
            )
            .route("/slots", web::get().to(slots::list))
            .route("/slots", web::post().to(slots::create))
            .route("/slots", web::delete().to(slots::delete_all))
            .route("/slots/bulk", web::post().to(slots::bulk_generate))
            .route("/slots/{id}/attendees", web::get().to(slots::attendees))
            .route("/slots/{id}", web::delete().to(slots::delete))
            .route("/bookings", web::get().to(bookings::list))
            .route("/bookings", web::post().to(bookings::create))
            .route("/bookings/{id}", web::delete().to(bookings::cancel))
            // Fixed /users/... paths are registered before the `{id}` routes.
            .route("/users/payments", web::get().to(users::month_payments))
            .route(
                "/users/payments/deadline",
                web::get().to(users::get_deadline),
            )
            .route(
                "/users/payments/deadline",
                web::post().to(users::set_deadline),
            )
            .route("/users", web::get().to(users::list))
            .route("/users", web::post().to(users::create))
            .route("/users/{id}/pay", web::post().to(users::pay))
            .route("/users/{id}", web::patch().to(users::update))
            .route("/users/{id}", web::delete().to(users::delete)),
    );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "ok": true, "time": Utc::now().to_rfc3339() }))
}

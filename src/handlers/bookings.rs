use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthUser;
use crate::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub slot_id: Option<i64>,
}

pub async fn create(
    auth: AuthUser,
    state: web::Data<AppState>,
    body: web::Json<CreateBookingRequest>,
) -> Result<HttpResponse, ApiError> {
    let Some(slot_id) = body.slot_id else {
        return Err(ApiError::Validation("slot_id is required".to_string()));
    };
    let booking = state.bookings.create_booking(&auth.0, slot_id).await?;
    Ok(HttpResponse::Created().json(booking))
}

pub async fn list(auth: AuthUser, state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let bookings = state.bookings.list_bookings(&auth.0).await?;
    Ok(HttpResponse::Ok().json(bookings))
}

pub async fn cancel(
    auth: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    state.bookings.cancel_booking(&auth.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

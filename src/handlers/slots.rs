use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthUser;
use crate::booking::BulkGeneration;
use crate::errors::ApiError;
use crate::state::AppState;
use crate::store::NewSlot;
use crate::timeutil;

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub date: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Public listing with remaining capacity. `date` selects one local
/// calendar day; `from`/`to` an inclusive day range.
pub async fn list(
    state: web::Data<AppState>,
    query: web::Query<SlotsQuery>,
) -> Result<HttpResponse, ApiError> {
    let window = match (
        query.date.as_deref(),
        query.from.as_deref(),
        query.to.as_deref(),
    ) {
        (_, Some(from), Some(to)) => {
            let from = timeutil::parse_date(from)
                .ok_or_else(|| ApiError::Validation("invalid from date".to_string()))?;
            let to = timeutil::parse_date(to)
                .ok_or_else(|| ApiError::Validation("invalid to date".to_string()))?;
            Some(timeutil::range_bounds(from, to))
        }
        (Some(date), _, _) => {
            let day = timeutil::parse_date(date)
                .ok_or_else(|| ApiError::Validation("invalid date".to_string()))?;
            Some(timeutil::day_bounds(day))
        }
        _ => None,
    };
    let slots = state.store.list_slots(window).await?;
    Ok(HttpResponse::Ok().json(slots))
}

#[derive(Debug, Deserialize)]
pub struct CreateSlotRequest {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub capacity: Option<i32>,
}

pub async fn create(
    auth: AuthUser,
    state: web::Data<AppState>,
    body: web::Json<CreateSlotRequest>,
) -> Result<HttpResponse, ApiError> {
    auth.0.require_admin()?;
    let (Some(start), Some(end), Some(capacity)) =
        (&body.start_time, &body.end_time, body.capacity)
    else {
        return Err(ApiError::Validation(
            "start_time, end_time and capacity are required".to_string(),
        ));
    };
    let start_time = timeutil::parse_local_datetime(start)
        .ok_or_else(|| ApiError::Validation("invalid start_time".to_string()))?;
    let end_time = timeutil::parse_local_datetime(end)
        .ok_or_else(|| ApiError::Validation("invalid end_time".to_string()))?;
    if end_time <= start_time {
        return Err(ApiError::Validation(
            "end_time must be after start_time".to_string(),
        ));
    }
    if capacity <= 0 {
        return Err(ApiError::Validation("capacity must be positive".to_string()));
    }
    let slot = state
        .store
        .create_slot(NewSlot {
            start_time,
            end_time,
            capacity,
        })
        .await?;
    Ok(HttpResponse::Created().json(slot))
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default)]
    pub weekdays: Vec<u8>,
    pub time_start: Option<String>,
    pub time_end: Option<String>,
    pub slot_minutes: Option<i64>,
    pub capacity: Option<i32>,
}

pub async fn bulk_generate(
    auth: AuthUser,
    state: web::Data<AppState>,
    body: web::Json<BulkRequest>,
) -> Result<HttpResponse, ApiError> {
    auth.0.require_admin()?;
    let body = body.into_inner();
    let (Some(start_date), Some(end_date), Some(time_start), Some(time_end)) = (
        body.start_date.as_deref(),
        body.end_date.as_deref(),
        body.time_start.as_deref(),
        body.time_end.as_deref(),
    ) else {
        return Err(ApiError::Validation(
            "start_date, end_date, time_start and time_end are required".to_string(),
        ));
    };
    let params = BulkGeneration {
        start_date: timeutil::parse_date(start_date)
            .ok_or_else(|| ApiError::Validation("invalid start_date".to_string()))?,
        end_date: timeutil::parse_date(end_date)
            .ok_or_else(|| ApiError::Validation("invalid end_date".to_string()))?,
        weekdays: body.weekdays,
        time_start: timeutil::parse_time(time_start)
            .ok_or_else(|| ApiError::Validation("invalid time_start".to_string()))?,
        time_end: timeutil::parse_time(time_end)
            .ok_or_else(|| ApiError::Validation("invalid time_end".to_string()))?,
        slot_minutes: body.slot_minutes.unwrap_or(30),
        capacity: body.capacity.unwrap_or(1),
    };
    let created = state.bookings.generate_slots(&params).await?;
    Ok(HttpResponse::Created().json(json!({ "created": created })))
}

pub async fn delete(
    auth: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    auth.0.require_admin()?;
    state.store.delete_slot(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

pub async fn delete_all(
    auth: AuthUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    auth.0.require_admin()?;
    state.store.delete_all_slots().await?;
    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

pub async fn attendees(
    auth: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    auth.0.require_admin()?;
    let slot_id = path.into_inner();
    let slot = state
        .store
        .get_slot(slot_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("slot not found".to_string()))?;
    let attendees = state.store.slot_attendees(slot_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "slot": slot, "attendees": attendees })))
}

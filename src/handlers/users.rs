use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthUser;
use crate::errors::ApiError;
use crate::models::Role;
use crate::state::AppState;
use crate::store::{NewUser, UserPatch};
use crate::timeutil;

use super::hash_password;

fn month_key_checked(year: Option<i32>, month: Option<u32>) -> Result<(i32, u32, String), ApiError> {
    let (Some(year), Some(month)) = (year, month) else {
        return Err(ApiError::Validation("year and month are required".to_string()));
    };
    if !(1..=12).contains(&month) {
        return Err(ApiError::Validation("month must be 1-12".to_string()));
    }
    Ok((year, month, timeutil::month_key_of(year, month)))
}

pub async fn list(auth: AuthUser, state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    auth.0.require_admin()?;
    let users = state.store.list_users().await?;
    Ok(HttpResponse::Ok().json(users))
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
}

pub async fn create(
    auth: AuthUser,
    state: web::Data<AppState>,
    body: web::Json<CreateUserRequest>,
) -> Result<HttpResponse, ApiError> {
    auth.0.require_admin()?;
    let body = body.into_inner();
    let (Some(name), Some(email), Some(password)) = (body.name, body.email, body.password) else {
        return Err(ApiError::Validation(
            "name, email and password are required".to_string(),
        ));
    };
    if name.is_empty() || email.is_empty() || password.is_empty() {
        return Err(ApiError::Validation(
            "name, email and password are required".to_string(),
        ));
    }
    let hash = hash_password(password).await?;
    let user = state
        .store
        .create_user(NewUser {
            name,
            email,
            password_hash: hash,
            role: body.role.unwrap_or(Role::User),
        })
        .await?;
    Ok(HttpResponse::Created().json(json!({
        "id": user.id,
        "name": user.name,
        "email": user.email,
        "role": user.role,
    })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
}

pub async fn update(
    auth: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse, ApiError> {
    auth.0.require_admin()?;
    let body = body.into_inner();
    let mut patch = UserPatch {
        name: body.name.filter(|s| !s.is_empty()),
        email: body.email.filter(|s| !s.is_empty()),
        role: body.role,
        password_hash: None,
    };
    if let Some(password) = body.password.filter(|s| !s.is_empty()) {
        patch.password_hash = Some(hash_password(password).await?);
    }
    if patch.is_empty() {
        return Ok(HttpResponse::Ok().json(json!({ "ok": true })));
    }
    let user = state
        .store
        .update_user(path.into_inner(), patch)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".to_string()))?;
    Ok(HttpResponse::Ok().json(json!({
        "id": user.id,
        "name": user.name,
        "email": user.email,
        "role": user.role,
    })))
}

pub async fn delete(
    auth: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    auth.0.require_admin()?;
    state.store.delete_user(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct PayRequest {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub paid: Option<bool>,
}

pub async fn pay(
    auth: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<PayRequest>,
) -> Result<HttpResponse, ApiError> {
    auth.0.require_admin()?;
    let Some(paid) = body.paid else {
        return Err(ApiError::Validation("paid flag is required".to_string()));
    };
    let (_, _, month_key) = month_key_checked(body.year, body.month)?;
    let user = state
        .store
        .get_user(path.into_inner())
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".to_string()))?;
    state.store.set_paid(user.id, &month_key, paid).await?;
    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

pub async fn month_payments(
    auth: AuthUser,
    state: web::Data<AppState>,
    query: web::Query<MonthQuery>,
) -> Result<HttpResponse, ApiError> {
    auth.0.require_admin()?;
    let (year, month, month_key) = month_key_checked(query.year, query.month)?;
    let rows = state.store.month_payments(&month_key).await?;
    let items: Vec<_> = rows
        .into_iter()
        .map(|(user_id, paid)| {
            json!({ "user_id": user_id, "year": year, "month": month, "paid": paid })
        })
        .collect();
    Ok(HttpResponse::Ok().json(items))
}

pub async fn get_deadline(
    auth: AuthUser,
    state: web::Data<AppState>,
    query: web::Query<MonthQuery>,
) -> Result<HttpResponse, ApiError> {
    auth.0.require_admin()?;
    let (year, month, month_key) = month_key_checked(query.year, query.month)?;
    match state.store.get_deadline(&month_key).await? {
        Some(deadline) => Ok(HttpResponse::Ok().json(json!({
            "year": year,
            "month": month,
            "deadline": deadline.format("%Y-%m-%d").to_string(),
        }))),
        None => Ok(HttpResponse::Ok().json(serde_json::Value::Null)),
    }
}

#[derive(Debug, Deserialize)]
pub struct DeadlineRequest {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub deadline: Option<String>,
}

pub async fn set_deadline(
    auth: AuthUser,
    state: web::Data<AppState>,
    body: web::Json<DeadlineRequest>,
) -> Result<HttpResponse, ApiError> {
    auth.0.require_admin()?;
    let (_, _, month_key) = month_key_checked(body.year, body.month)?;
    let deadline = body
        .deadline
        .as_deref()
        .and_then(timeutil::parse_date)
        .ok_or_else(|| ApiError::Validation("invalid deadline date".to_string()))?;
    state.store.set_deadline(&month_key, deadline).await?;
    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

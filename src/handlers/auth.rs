use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::auth::issue_token;
use crate::errors::ApiError;
use crate::models::Role;
use crate::state::AppState;
use crate::store::NewUser;

use super::hash_password;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

pub async fn login(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    if body.email.is_empty() || body.password.is_empty() {
        return Err(ApiError::Validation(
            "email and password are required".to_string(),
        ));
    }
    // Unknown email and wrong password answer identically.
    let Some(user) = state.store.find_user_by_email(&body.email).await? else {
        return Err(ApiError::Unauthorized("invalid credentials".to_string()));
    };
    let password = body.password.clone();
    let hash = user.password_hash.clone();
    let matches = web::block(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(format!("password verification failed: {e}")))?;
    if !matches {
        return Err(ApiError::Unauthorized("invalid credentials".to_string()));
    }
    let token = issue_token(&user, &state.config.jwt_secret)?;
    Ok(HttpResponse::Ok().json(json!({
        "token": token,
        "user": {
            "id": user.id,
            "name": user.name,
            "email": user.email,
            "role": user.role,
        },
    })))
}

#[derive(Debug, Deserialize)]
pub struct BootstrapRequest {
    pub token: Option<String>,
}

/// Creates the initial admin when none exists yet, guarded by a shared
/// token from the environment.
pub async fn bootstrap_admin(
    state: web::Data<AppState>,
    body: web::Json<BootstrapRequest>,
) -> Result<HttpResponse, ApiError> {
    let Some(expected) = state.config.bootstrap_token.as_deref() else {
        return Err(ApiError::Forbidden("bootstrap is disabled".to_string()));
    };
    if body.token.as_deref() != Some(expected) {
        return Err(ApiError::Forbidden("invalid bootstrap token".to_string()));
    }
    if state.store.count_admins().await? > 0 {
        return Ok(HttpResponse::Ok().json(json!({ "ok": true, "detail": "admin already exists" })));
    }
    let hash = hash_password(state.config.bootstrap_admin_password.clone()).await?;
    let admin = state
        .store
        .create_user(NewUser {
            name: state.config.bootstrap_admin_name.clone(),
            email: state.config.bootstrap_admin_email.clone(),
            password_hash: hash,
            role: Role::Admin,
        })
        .await?;
    Ok(HttpResponse::Created().json(json!({
        "ok": true,
        "admin": {
            "id": admin.id,
            "name": admin.name,
            "email": admin.email,
            "role": admin.role,
        },
    })))
}

use axum::{
    extract::State,
    routing::post,
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use super::{self_link, validate_attributes};
use crate::error::{AppError, AppResult};
use crate::jsonapi::{Document, JsonApi, JsonApiBody, Resource};
use crate::middleware::issue_token;
use crate::models::{NewUser, User};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/session", post(create_session))
        .route("/users", post(create_user))
}

/* ---------- SESSION ---------- */

// POST /v1/auth/session
#[derive(Debug, Deserialize)]
struct SessionRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    access_token: String,
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    JsonApiBody(req): JsonApiBody<SessionRequest>,
) -> AppResult<Json<SessionResponse>> {
    let user = state.store.find_user_by_email(&req.email.to_lowercase()).await?;

    let user = match user {
        Some(user) if user.verify_password(&req.password) => user,
        _ => {
            tracing::info!(email = %req.email, "rejected login");
            return Err(AppError::Unauthorized("invalid credentials".to_string()));
        }
    };

    let access_token = issue_token(&state.config.jwt, user.id)?;
    Ok(Json(SessionResponse { access_token }))
}

/* ---------- USERS ---------- */

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "kebab-case")]
struct UserAttributes {
    #[validate(email(message = "Invalid email address"))]
    email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserOut {
    pub email: String,
    pub is_admin: bool,
    pub is_super_admin: bool,
    pub created_at: NaiveDateTime,
}

pub fn user_resource(user: &User) -> Resource<UserOut> {
    Resource::new(
        "user",
        user.id,
        self_link("users", user.id),
        UserOut {
            email: user.email.clone(),
            is_admin: user.is_admin,
            is_super_admin: user.is_super_admin,
            created_at: user.created_at,
        },
    )
}

// POST /v1/users
async fn create_user(
    State(state): State<Arc<AppState>>,
    JsonApiBody(doc): JsonApiBody<Document<UserAttributes>>,
) -> AppResult<JsonApi<Resource<UserOut>>> {
    let attrs = doc.data.attributes;
    validate_attributes(&attrs)?;

    let password = attrs.password;
    let password_hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|e| AppError::Internal(format!("hashing task failed: {e}")))?
        .map_err(|e| AppError::Internal(format!("failed to hash password: {e}")))?;

    let user = state
        .store
        .create_user(NewUser { email: attrs.email.to_lowercase(), password_hash, is_admin: false })
        .await?;
    tracing::info!(user_id = user.id, "user registered");

    Ok(JsonApi::created(user_resource(&user)))
}

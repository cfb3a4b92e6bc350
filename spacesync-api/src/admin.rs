use axum::{
    extract::State,
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use spacesync_core::pii::Masked;
use spacesync_core::repository::ProfileRepository;
use spacesync_core::{Requester, Role, UserProfile};

use crate::error::AppError;
use crate::middleware::{authenticate, require_role};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignRoleRequest {
    target_email: Option<String>,
    role: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevokeRoleRequest {
    target_email: Option<String>,
}

#[derive(Debug, Serialize)]
struct UserListResponse {
    count: usize,
    users: Vec<UserProfile>,
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/assign-role", post(assign_role))
        .route("/revoke-role", post(revoke_role))
        .route("/users", get(list_users))
        .route_layer(from_fn_with_state(state, authenticate))
}

async fn find_target(state: &AppState, email: Option<&str>) -> Result<UserProfile, AppError> {
    let email = email
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::Validation("targetEmail is required".to_string()))?;

    state
        .store
        .find_profile_by_email(email)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No user with email {}", Masked(email))))
}

async fn assign_role(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Json(req): Json<AssignRoleRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&requester, &[Role::Admin])?;

    let role = req
        .role
        .as_deref()
        .and_then(|r| r.parse::<Role>().ok())
        .ok_or(AppError::InvalidRole)?;

    let mut profile = find_target(&state, req.target_email.as_deref()).await?;
    let metadata = match req.metadata {
        Some(Value::Object(map)) => Value::Object(map),
        _ => json!({}),
    };
    profile.assign_role(role, metadata, &requester.uid, Utc::now());
    state.store.save_profile(&profile).await?;

    info!("Role {} assigned to {} by {}", role, profile.uid, requester.uid);

    Ok(Json(json!({
        "message": "Role assigned successfully",
        "user": profile.email,
        "role": role,
        "batch": profile.batch,
        "note": "The new role applies to the profile immediately; token claims follow on the next sign-in",
    })))
}

async fn revoke_role(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Json(req): Json<RevokeRoleRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&requester, &[Role::Admin])?;

    let mut profile = find_target(&state, req.target_email.as_deref()).await?;
    profile.revoke_role(&requester.uid, Utc::now());
    state.store.save_profile(&profile).await?;

    info!("Role revoked from {} by {}", profile.uid, requester.uid);

    Ok(Json(json!({
        "message": "Role revoked",
        "user": profile.email,
    })))
}

async fn list_users(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
) -> Result<Json<UserListResponse>, AppError> {
    require_role(&requester, &[Role::Admin])?;

    let users = state.store.list_profiles().await?;
    Ok(Json(UserListResponse {
        count: users.len(),
        users,
    }))
}

use axum::{
    extract::State,
    middleware::from_fn_with_state,
    routing::get,
    Extension, Json, Router,
};
use serde_json::{json, Value};

use spacesync_core::repository::ProfileRepository;
use spacesync_core::Requester;

use crate::error::AppError;
use crate::middleware::authenticate;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/me", get(me))
        .route_layer(from_fn_with_state(state, authenticate))
}

/// The caller's effective role and permissions, followed by the stored profile fields.
async fn me(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
) -> Result<Json<Value>, AppError> {
    let mut body = json!({
        "uid": requester.uid,
        "email": requester.email,
        "role": requester.role,
        "batch": requester.batch,
        "permissions": requester.role.permissions(),
    });

    if let Some(profile) = state.store.get_profile(&requester.uid).await? {
        let stored = serde_json::to_value(profile).map_err(anyhow::Error::from)?;
        if let (Value::Object(out), Value::Object(stored)) = (&mut body, stored) {
            for (key, value) in stored {
                // The effective role wins over the stored one
                out.entry(key).or_insert(value);
            }
        }
    }

    Ok(Json(body))
}

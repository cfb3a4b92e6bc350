use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use spacesync_core::pii::Masked;
use spacesync_core::{Requester, Role, UserProfile};

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: Option<String>,
    /// Custom claim set by role assignment. Absent for ordinary users.
    pub role: Option<String>,
    pub batch: Option<String>,
    pub exp: usize,
}

// ============================================================================
// Authentication Middleware
// ============================================================================

/// Verifies the bearer token, mirrors the user into its profile and injects a
/// [`Requester`] into the request extensions.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = {
        let token = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::Authentication("Missing or invalid token".to_string()))?;

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(state.auth.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| {
            debug!("Token rejected: {}", e);
            AppError::Authorization("Invalid or expired token".to_string())
        })?
        .claims
    };

    let profile = mirror_profile(&state, &claims).await;
    let requester = Requester {
        role: effective_role(claims.role.as_deref(), profile.as_ref()),
        batch: claims.batch.or_else(|| profile.and_then(|p| p.batch)),
        uid: claims.sub,
        email: claims.email,
    };

    req.extensions_mut().insert(requester);
    Ok(next.run(req).await)
}

/// Creates the profile on first sight, otherwise records the login. A storage
/// failure here is logged and does not reject the request.
async fn mirror_profile(state: &AppState, claims: &Claims) -> Option<UserProfile> {
    let now = Utc::now();
    let existing = match state.store.get_profile(&claims.sub).await {
        Ok(found) => found,
        Err(e) => {
            warn!("Profile lookup failed for {}: {}", claims.sub, e);
            return None;
        }
    };

    match existing {
        Some(profile) => {
            if let Err(e) = state.store.touch_last_login(&claims.sub, now).await {
                warn!("Failed to record login for {}: {}", claims.sub, e);
            }
            Some(profile)
        }
        None => {
            let profile = UserProfile::first_seen(&claims.sub, claims.email.clone(), now);
            match state.store.save_profile(&profile).await {
                Ok(()) => {
                    if let Some(email) = claims.email.as_deref() {
                        debug!("Created profile for {}", Masked(email));
                    }
                }
                Err(e) => warn!("Failed to create profile for {}: {}", claims.sub, e),
            }
            Some(profile)
        }
    }
}

/// Token claim first, then the stored profile, then student.
pub fn effective_role(claim: Option<&str>, profile: Option<&UserProfile>) -> Role {
    if let Some(raw) = claim {
        match raw.parse::<Role>() {
            Ok(role) => return role,
            Err(e) => debug!("Ignoring role claim: {}", e),
        }
    }
    profile.map(|p| p.role).unwrap_or_default()
}

// ============================================================================
// Role Gate
// ============================================================================

pub fn require_role(requester: &Requester, allowed: &[Role]) -> Result<(), AppError> {
    if requester.has_role(allowed) {
        Ok(())
    } else {
        Err(AppError::InsufficientRole {
            required: allowed.to_vec(),
            current: requester.role,
        })
    }
}

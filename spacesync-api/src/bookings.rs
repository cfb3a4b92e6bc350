use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use spacesync_booking::{BookingRequest, MarkFreeOutcome};
use spacesync_core::repository::{BookingRepository, ProfileRepository};
use spacesync_core::{Booking, CoreError, Requester, Role};

use crate::error::AppError;
use crate::middleware::{authenticate, require_role};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookRoomRequest {
    room_id: Option<String>,
    user_id: Option<String>,
    /// Minutes.
    duration: Option<i64>,
    purpose: Option<String>,
}

#[derive(Debug, Serialize)]
struct BookRoomResponse {
    message: String,
    booking_id: Uuid,
    expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkFreeRequest {
    room_id: Option<String>,
    notes: Option<String>,
}

#[derive(Debug, Serialize)]
struct MarkFreeResponse {
    message: String,
    #[serde(flatten)]
    outcome: MarkFreeOutcome,
}

#[derive(Debug, Serialize)]
struct CancelResponse {
    message: String,
    booking: Booking,
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(list_bookings))
        .route("/my-bookings", get(my_bookings))
        .route("/book", post(book_room))
        .route("/mark-free", post(mark_free))
        .route("/{booking_id}", delete(cancel_booking))
        .route_layer(from_fn_with_state(state, authenticate))
}

async fn book_room(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Json(req): Json<BookRoomRequest>,
) -> Result<(StatusCode, Json<BookRoomResponse>), AppError> {
    require_role(&requester, &[Role::ClubLead, Role::Admin])?;

    let user_id = req.user_id.unwrap_or_default().trim().to_string();
    let (user_email, user_role) = owner_identity(&state, &requester, &user_id).await?;

    let request = BookingRequest {
        room_id: req.room_id.unwrap_or_default(),
        user_id,
        user_email,
        user_role,
        duration_minutes: req.duration,
        purpose: req.purpose,
    };

    let outcome = state.transactor.book(request).await;
    let label = match &outcome {
        Ok(_) => "booked",
        Err(CoreError::RoomOccupied(_)) => "occupied",
        Err(CoreError::Upstream(_)) => "error",
        Err(_) => "rejected",
    };
    state.metrics.booking_requests.with_label_values(&[label]).inc();
    let booking = outcome?;

    Ok((
        StatusCode::CREATED,
        Json(BookRoomResponse {
            message: "Room booked successfully".to_string(),
            booking_id: booking.id,
            expires_at: booking.expires_at,
        }),
    ))
}

/// Email and role recorded with a booking. They always describe `user_id`: a
/// club lead books for themselves, an admin may book for anyone.
async fn owner_identity(
    state: &AppState,
    requester: &Requester,
    user_id: &str,
) -> Result<(Option<String>, Role), AppError> {
    // Blank ids are rejected by the transactor
    if user_id.is_empty() || user_id == requester.uid {
        return Ok((requester.email.clone(), requester.role));
    }
    if !requester.is_admin() {
        return Err(AppError::Authorization(
            "You can only book rooms for yourself".to_string(),
        ));
    }

    let profile = state.store.get_profile(user_id).await?;
    Ok((
        profile.as_ref().and_then(|p| p.email.clone()),
        profile.map(|p| p.role).unwrap_or_default(),
    ))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(booking_id): Path<String>,
) -> Result<Json<CancelResponse>, AppError> {
    // Unknown ids are simply not found, whatever their shape
    let booking_id = Uuid::parse_str(&booking_id)
        .map_err(|_| AppError::NotFound(format!("Booking not found: {}", booking_id)))?;

    let booking = state.canceller.cancel(booking_id, &requester).await?;
    state.metrics.bookings_cancelled.inc();

    Ok(Json(CancelResponse {
        message: "Booking cancelled".to_string(),
        booking,
    }))
}

async fn mark_free(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Json(req): Json<MarkFreeRequest>,
) -> Result<Json<MarkFreeResponse>, AppError> {
    require_role(&requester, &[Role::VerifiedRep, Role::Admin])?;

    let room_id = req.room_id.unwrap_or_default();
    if room_id.trim().is_empty() {
        return Err(AppError::Validation("roomId is required".to_string()));
    }

    let outcome = state
        .canceller
        .mark_free(room_id.trim(), &requester, req.notes)
        .await?;
    if outcome.cancelled_booking.is_some() {
        state.metrics.bookings_cancelled.inc();
    }

    let message = if outcome.was_occupied {
        "Room marked free"
    } else {
        "Room was already free"
    };
    info!("{} ({}) by {}", message, outcome.room_id, requester.uid);

    Ok(Json(MarkFreeResponse {
        message: message.to_string(),
        outcome,
    }))
}

async fn list_bookings(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
) -> Result<Json<Vec<Booking>>, AppError> {
    require_role(&requester, &[Role::Admin])?;
    Ok(Json(state.store.list_bookings().await?))
}

async fn my_bookings(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.store.list_bookings_for_user(&requester.uid).await?))
}

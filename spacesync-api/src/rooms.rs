use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use spacesync_core::repository::RoomRepository;
use spacesync_core::Room;
use spacesync_timetable::SyncReport;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct CreateRoomRequest {
    room_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FindFreeRequest {
    day: Option<String>,
    time: Option<String>,
}

#[derive(Debug, Serialize)]
struct SeedResponse {
    message: String,
    rooms: Vec<Room>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_rooms).post(create_room))
        .route("/seed", post(seed_rooms))
        .route("/sync-from-timetable", post(sync_from_timetable))
        .route("/find-free", post(find_free))
        .route("/{id}", get(get_room))
}

async fn list_rooms(State(state): State<AppState>) -> Result<Json<Vec<Room>>, AppError> {
    Ok(Json(state.store.list_rooms().await?))
}

/// Accepts the storage id or, failing that, the room's business key.
async fn get_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Room>, AppError> {
    let room = match Uuid::parse_str(&id) {
        Ok(uuid) => state.store.get_room(uuid).await?,
        Err(_) => state.store.find_room(&id).await?,
    };
    room.map(Json)
        .ok_or_else(|| AppError::NotFound("Room not found".to_string()))
}

async fn create_room(
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<Room>), AppError> {
    let room = state
        .rooms
        .create_room(req.room_id.as_deref().unwrap_or_default())
        .await?;
    Ok((StatusCode::CREATED, Json(room)))
}

async fn seed_rooms(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SeedResponse>), AppError> {
    let rooms = state.rooms.seed_rooms().await?;
    Ok((
        StatusCode::CREATED,
        Json(SeedResponse {
            message: "Rooms seeded successfully".to_string(),
            rooms,
        }),
    ))
}

async fn sync_from_timetable(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SyncReport>), AppError> {
    let report = state.rooms.sync_from_lab_windows().await?;
    let status = if report.success {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    Ok((status, Json(report)))
}

async fn find_free(
    State(state): State<AppState>,
    Json(req): Json<FindFreeRequest>,
) -> Result<Json<Vec<Room>>, AppError> {
    let (Some(day), Some(time)) = (req.day, req.time) else {
        return Err(AppError::Validation("day and time are required".to_string()));
    };
    Ok(Json(state.finder.find_free(&day, &time).await?))
}

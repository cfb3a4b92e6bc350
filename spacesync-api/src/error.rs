use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use spacesync_core::{CoreError, Role, StoreError};
use spacesync_timetable::TimetableError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    Authorization(String),
    #[error("Insufficient permissions")]
    InsufficientRole { required: Vec<Role>, current: Role },
    #[error("Invalid role")]
    InvalidRole,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error("{0}")]
    InternalServerError(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Authentication(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Authorization(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::InsufficientRole { required, current } => {
                let body = Json(json!({
                    "error": "Insufficient permissions",
                    "required": required,
                    "current": current,
                }));
                return (StatusCode::FORBIDDEN, body).into_response();
            }
            AppError::InvalidRole => {
                let body = Json(json!({
                    "error": "Invalid role",
                    "valid_roles": Role::ALL,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::RoomNotFound(_) | CoreError::BookingNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            CoreError::RoomOccupied(_) | CoreError::AlreadyExists(_) | CoreError::InvalidState(_) => {
                AppError::Conflict(err.to_string())
            }
            CoreError::Forbidden(msg) => AppError::Authorization(msg),
            CoreError::Validation(msg) => AppError::Validation(msg),
            CoreError::Upstream(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<TimetableError> for AppError {
    fn from(err: TimetableError) -> Self {
        match err {
            TimetableError::Extraction(_) | TimetableError::EmptyDocument => {
                AppError::Validation(err.to_string())
            }
            TimetableError::NoLabSessions => AppError::Unprocessable(err.to_string()),
            TimetableError::Parser(msg) => AppError::InternalServerError(msg),
            TimetableError::Store(e) => e.into(),
            TimetableError::Rooms(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_core_errors_map_to_statuses() {
        let (status, body) = body_json(CoreError::RoomOccupied("B201".into()).into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Room is already occupied: B201");

        let (status, _) = body_json(CoreError::BookingNotFound("x".into()).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = body_json(CoreError::InvalidState("x".into()).into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_internal_errors_are_opaque() {
        let (status, body) =
            body_json(CoreError::Upstream("connection reset by 10.0.0.3".into()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal Server Error");
    }

    #[tokio::test]
    async fn test_insufficient_role_body() {
        let err = AppError::InsufficientRole {
            required: vec![Role::ClubLead, Role::Admin],
            current: Role::Student,
        };
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["required"], json!(["club_lead", "admin"]));
        assert_eq!(body["current"], "student");
    }

    #[tokio::test]
    async fn test_no_lab_sessions_is_unprocessable() {
        let (status, body) = body_json(TimetableError::NoLabSessions.into()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "No lab sessions detected");
    }
}

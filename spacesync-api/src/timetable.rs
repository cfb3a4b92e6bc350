use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    middleware::from_fn_with_state,
    routing::post,
    Extension, Json, Router,
};
use serde::Serialize;
use tracing::info;

use spacesync_core::{Requester, Role};
use spacesync_timetable::ImportReport;

use crate::error::AppError;
use crate::middleware::{authenticate, require_role};
use crate::state::AppState;

/// Room for the multipart framing around the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Serialize)]
struct UploadResponse {
    message: String,
    #[serde(flatten)]
    report: ImportReport,
}

pub fn routes(state: AppState) -> Router<AppState> {
    let limit = state.max_upload_bytes + MULTIPART_OVERHEAD;
    Router::new()
        .route("/upload", post(upload_timetable))
        .layer(DefaultBodyLimit::max(limit))
        .route_layer(from_fn_with_state(state, authenticate))
}

async fn upload_timetable(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    require_role(&requester, &[Role::Admin])?;

    let mut document = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.body_text()))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(e.body_text()))?;
            document = Some(bytes);
            break;
        }
    }

    let document = document.ok_or_else(|| AppError::Validation("PDF file is required".to_string()))?;
    if document.is_empty() {
        return Err(AppError::Validation("PDF file is required".to_string()));
    }
    if document.len() > state.max_upload_bytes {
        return Err(AppError::Validation(format!(
            "File exceeds the {} byte limit",
            state.max_upload_bytes
        )));
    }

    info!("Timetable upload of {} bytes by {}", document.len(), requester.uid);
    let report = state.importer.import(document.to_vec()).await?;

    Ok(Json(UploadResponse {
        message: "Success".to_string(),
        report,
    }))
}

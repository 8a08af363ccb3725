use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use serde::Serialize;

use crate::app_state::AppState;
use crate::db::queries;
use crate::models::api::VideoGenerateRequest;
use crate::models::fitting::FittingStatus;
use crate::models::task::{TaskEnvelope, TaskStep};
use crate::routes::fittings::UserQuery;
use crate::routes::{bad_gateway, bad_request, conflict, internal_error, not_found, ApiError};

#[derive(Debug, Serialize)]
pub struct VideoStatusResponse {
    pub product_id: i64,
    pub status: String,
    pub video_url: Option<String>,
}

/// POST /api/v1/fittings/{product_id}/videos — start the video leg for an
/// existing image result. The vendor accept moves the row to `processing`;
/// a queued poll task drives it to `completed` or `failed`.
pub async fn generate_video(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
    Json(request): Json<VideoGenerateRequest>,
) -> Result<(StatusCode, Json<VideoStatusResponse>), ApiError> {
    request
        .validate()
        .map_err(|e| bad_request(format!("invalid request: {e}")))?;

    let row = queries::get_fitting_result(&state.db, request.user_id, product_id)
        .await
        .map_err(|e| internal_error(format!("database error: {e}")))?
        .ok_or_else(|| not_found("no fitting result for this product"))?;

    let Some(image_url) = row.image_url else {
        return Err(bad_request("no image result to animate yet"));
    };
    if row.status == FittingStatus::Processing {
        return Err(conflict(
            "a video is already being generated for this fitting",
            "already_in_progress",
        ));
    }

    let job_handle = state
        .media
        .start_video(&image_url)
        .await
        .map_err(|e| bad_gateway(format!("video job rejected by vendor: {e}")))?;

    if !queries::mark_video_processing(&state.db, request.user_id, product_id, &job_handle)
        .await
        .map_err(|e| internal_error(format!("database error: {e}")))?
    {
        return Err(not_found("fitting result disappeared"));
    }

    let envelope = TaskEnvelope::new(
        request.user_id,
        TaskStep::VideoPoll {
            product_id,
            job_handle: job_handle.clone(),
        },
        vec![],
    );
    state
        .queue
        .enqueue(&envelope)
        .await
        .map_err(|e| internal_error(format!("failed to enqueue video poll: {e}")))?;

    tracing::info!(
        user_id = %request.user_id,
        product_id,
        job_handle = %job_handle,
        "video generation accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(VideoStatusResponse {
            product_id,
            status: FittingStatus::Processing.to_string(),
            video_url: None,
        }),
    ))
}

/// GET /api/v1/fittings/{product_id}/videos/status — video leg read path.
pub async fn video_status(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
    Query(query): Query<UserQuery>,
) -> Result<Json<VideoStatusResponse>, ApiError> {
    let row = queries::get_fitting_result(&state.db, query.user_id, product_id)
        .await
        .map_err(|e| internal_error(format!("database error: {e}")))?
        .ok_or_else(|| not_found("no fitting result for this product"))?;

    Ok(Json(VideoStatusResponse {
        product_id,
        status: row.status.to_string(),
        video_url: row.video_url,
    }))
}

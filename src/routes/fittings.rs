use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::queries;
use crate::models::api::{
    BackgroundEditRequest, BackgroundEditResponse, CatalogFanoutRequest, CatalogFanoutResponse,
    FittingStatusResponse, OneShotRequest, OneShotResponse, VariantResult,
};
use crate::routes::{
    bad_gateway, bad_request, conflict, gateway_timeout, internal_error, not_found, ApiError,
};
use crate::services::workflow::{self, WorkflowError};

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: Uuid,
}

/// POST /api/v1/fittings — interactive one-shot try-on with four prompt
/// variations. Blocks until the chord aggregates or the collect budget runs
/// out; partial failure is reported per index, not hidden.
pub async fn submit_one_shot(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<OneShotResponse>, ApiError> {
    let started = std::time::Instant::now();

    let mut person_image: Option<Vec<u8>> = None;
    let mut outfit_image: Option<Vec<u8>> = None;
    let mut user_id: Option<Uuid> = None;
    let mut category = None;
    let mut detail = None;
    let mut fit = None;
    let mut length = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| bad_request("malformed multipart body"))?
    {
        match field.name() {
            Some("person_image") => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|_| bad_request("unreadable person_image"))?;
                image::guess_format(&data)
                    .map_err(|_| bad_request("person_image is not a supported image"))?;
                person_image = Some(data.to_vec());
            }
            Some("outfit_image") => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|_| bad_request("unreadable outfit_image"))?;
                image::guess_format(&data)
                    .map_err(|_| bad_request("outfit_image is not a supported image"))?;
                outfit_image = Some(data.to_vec());
            }
            Some("user_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|_| bad_request("unreadable user_id"))?;
                user_id =
                    Some(text.parse().map_err(|_| bad_request("user_id is not a uuid"))?);
            }
            Some("category") => category = Some(read_text(field).await?),
            Some("detail") => detail = Some(read_text(field).await?),
            Some("fit") => fit = Some(read_text(field).await?),
            Some("length") => length = Some(read_text(field).await?),
            _ => {}
        }
    }

    let person_image = person_image.ok_or_else(|| bad_request("person_image is required"))?;
    let outfit_image = outfit_image.ok_or_else(|| bad_request("outfit_image is required"))?;
    let request = OneShotRequest {
        user_id: user_id.ok_or_else(|| bad_request("user_id is required"))?,
        category: category.ok_or_else(|| bad_request("category is required"))?,
        detail: detail.ok_or_else(|| bad_request("detail is required"))?,
        fit: fit.ok_or_else(|| bad_request("fit is required"))?,
        length: length.ok_or_else(|| bad_request("length is required"))?,
    };
    request
        .validate()
        .map_err(|e| bad_request(format!("invalid request: {e}")))?;

    if !queries::user_exists(&state.db, request.user_id)
        .await
        .map_err(|e| internal_error(format!("database error: {e}")))?
    {
        return Err(not_found("unknown user"));
    }

    // Keep a durable record of the uploaded source photo before anything
    // asynchronous happens.
    let person_prefix = format!("user_images/{}", request.user_id);
    let person_stored = state
        .storage
        .upload(&person_prefix, &person_image, "jpg")
        .await
        .map_err(|e| internal_error(format!("source photo upload failed: {e}")))?;
    queries::insert_user_image(&state.db, request.user_id, &person_stored)
        .await
        .map_err(|e| internal_error(format!("database error: {e}")))?;

    // Vendor-side uploads feed the id-based generation variant.
    let person_image_id = state
        .bitstudio
        .upload_image(person_image, "virtual-try-on-person")
        .await
        .map_err(|e| bad_gateway(format!("person upload rejected by vendor: {e}")))?;
    let outfit_image_id = state
        .bitstudio
        .upload_image(outfit_image, "virtual-try-on-outfit")
        .await
        .map_err(|e| bad_gateway(format!("outfit upload rejected by vendor: {e}")))?;

    let prompts = workflow::build_prompt_variants(
        &request.category,
        &request.detail,
        &request.fit,
        &request.length,
    );

    let chord_id = workflow::submit_chord(
        &state,
        request.user_id,
        &person_image_id,
        &outfit_image_id,
        &prompts,
    )
    .await
    .map_err(|e| internal_error(format!("chord submission failed: {e}")))?;

    let collected = workflow::collect(
        &state,
        chord_id,
        prompts.len(),
        Duration::from_secs(state.polling.chord_collect_timeout_secs),
    )
    .await
    .map_err(|e| match e {
        WorkflowError::AggregationTimeout => {
            gateway_timeout("variant aggregation timed out")
        }
        other => internal_error(format!("aggregation failed: {other}")),
    })?;

    metrics::histogram!("fitting_chord_seconds").record(started.elapsed().as_secs_f64());

    let failed = workflow::failed_indices(&collected);
    let results = collected
        .into_iter()
        .enumerate()
        .map(|(index, image_url)| VariantResult { index, image_url })
        .collect();

    Ok(Json(OneShotResponse {
        success: failed.is_empty(),
        results,
        failed_indices: failed,
    }))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|_| bad_request("unreadable text field"))
}

/// POST /api/v1/fittings/catalog — fire-and-forget fan-out over every live
/// product. Returns immediately with the group handle; 409 when a fan-out
/// for this user is already running.
pub async fn submit_catalog_fanout(
    State(state): State<AppState>,
    Json(request): Json<CatalogFanoutRequest>,
) -> Result<(StatusCode, Json<CatalogFanoutResponse>), ApiError> {
    request
        .validate()
        .map_err(|e| bad_request(format!("invalid request: {e}")))?;

    if !queries::user_exists(&state.db, request.user_id)
        .await
        .map_err(|e| internal_error(format!("database error: {e}")))?
    {
        return Err(not_found("unknown user"));
    }

    match workflow::submit_catalog_fanout(&state, request.user_id).await {
        Ok((group_id, item_count)) => {
            metrics::counter!("fitting_fanouts_total").increment(1);
            Ok((
                StatusCode::ACCEPTED,
                Json(CatalogFanoutResponse {
                    group_id,
                    item_count,
                }),
            ))
        }
        Err(WorkflowError::AlreadyInProgress) => Err(conflict(
            "a catalog fitting is already in progress for this user",
            "already_in_progress",
        )),
        Err(WorkflowError::MissingSourceImage) => {
            Err(bad_request("upload a source photo before starting a fitting"))
        }
        Err(e) => Err(internal_error(format!("fan-out submission failed: {e}"))),
    }
}

/// POST /api/v1/fittings/background — synchronous background replacement of
/// a hosted image; the media vendor answers with the edited bytes directly.
pub async fn edit_background(
    State(state): State<AppState>,
    Json(request): Json<BackgroundEditRequest>,
) -> Result<Json<BackgroundEditResponse>, ApiError> {
    request
        .validate()
        .map_err(|e| bad_request(format!("invalid request: {e}")))?;

    let edited = state
        .media
        .remove_background(&request.image_url, "white")
        .await
        .map_err(|e| bad_gateway(format!("background edit rejected by vendor: {e}")))?;

    let stored_url = state
        .storage
        .upload("background_edits", &edited, "png")
        .await
        .map_err(|e| internal_error(format!("storage upload failed: {e}")))?;

    Ok(Json(BackgroundEditResponse {
        image_url: stored_url,
    }))
}

/// GET /api/v1/fittings/{product_id} — status read path for a (user, product)
/// fitting result.
pub async fn get_fitting_status(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
    Query(query): Query<UserQuery>,
) -> Result<Json<FittingStatusResponse>, ApiError> {
    let row = queries::get_fitting_result(&state.db, query.user_id, product_id)
        .await
        .map_err(|e| internal_error(format!("database error: {e}")))?
        .ok_or_else(|| not_found("no fitting result for this product"))?;

    Ok(Json(FittingStatusResponse {
        product_id,
        status: row.status.to_string(),
        image_url: row.image_url,
        video_url: row.video_url,
    }))
}

//! Batch creation and lookup endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use ayu_common::auth::AuthContext;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::decode_photo;
use crate::error::ApiResult;
use crate::models::{Batch, GeoTagInput, Stage, StageTransitionRecord};
use crate::services::{CreatedBatch, PhotoUpload};
use crate::workflow::BatchInput;
use crate::AppState;

/// POST /api/batches request body
///
/// Batch fields plus an optional Stage-1 photo (base64) and notes.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBatchRequest {
    #[serde(default)]
    pub farmer_name: Option<String>,
    #[serde(default, alias = "farmId")]
    pub farmer_id: Option<String>,
    #[serde(default)]
    pub species: Option<String>,
    #[serde(default, alias = "startDate")]
    pub visit_date: Option<String>,
    #[serde(default, alias = "coords")]
    pub geotag: Option<GeoTagInput>,
    #[serde(default)]
    pub estimated_quantity: Option<f64>,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CreateBatchRequest {
    fn into_parts(self) -> (BatchInput, Option<String>, Option<String>) {
        let input = BatchInput {
            farmer_name: self.farmer_name,
            farmer_id: self.farmer_id,
            species: self.species,
            visit_date: self.visit_date,
            geotag: self.geotag,
            estimated_quantity: self.estimated_quantity,
        };
        (input, self.photo, self.notes)
    }
}

/// GET /api/batches/active response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveBatchResponse {
    pub batch_id: Uuid,
    pub current_stage: Stage,
    pub completed_stages: BTreeSet<Stage>,
    pub locked: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub batch_id: Uuid,
    pub transitions: Vec<StageTransitionRecord>,
}

/// POST /api/batches
pub async fn create_batch(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(request): Json<CreateBatchRequest>,
) -> ApiResult<(StatusCode, Json<CreatedBatch>)> {
    let (input, photo, notes) = request.into_parts();
    let upload = match photo.as_deref() {
        Some(encoded) if !encoded.trim().is_empty() => Some(PhotoUpload {
            bytes: decode_photo("photo", encoded)?,
            notes,
        }),
        _ => None,
    };

    let created = state.service.create_batch(&ctx, input, upload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/batches/active
pub async fn active_batch(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<Json<ActiveBatchResponse>> {
    let batch = state.service.active_batch(&ctx).await?;
    Ok(Json(ActiveBatchResponse {
        batch_id: batch.batch_id,
        current_stage: batch.current_stage,
        completed_stages: batch.completed_stages,
        locked: batch.locked,
    }))
}

/// GET /api/batches/:id
pub async fn get_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Json<Batch>> {
    Ok(Json(state.service.get_batch(batch_id).await?))
}

/// GET /api/batches/:id/history
pub async fn batch_history(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Json<HistoryResponse>> {
    let transitions = state.service.history(batch_id).await?;
    Ok(Json(HistoryResponse {
        batch_id,
        transitions,
    }))
}

pub fn batch_routes() -> Router<AppState> {
    Router::new()
        .route("/api/batches", post(create_batch))
        .route("/api/batches/active", get(active_batch))
        .route("/api/batches/:id", get(get_batch))
        .route("/api/batches/:id/history", get(batch_history))
}

//! Stage-5 endpoints: final photo, leaf verification, completion

use axum::{
    extract::{Path, State},
    routing::post,
    Extension, Json, Router,
};
use ayu_common::auth::AuthContext;
use serde::Deserialize;
use uuid::Uuid;

use super::decode_photo;
use super::stages::PhotoRequest;
use crate::error::ApiResult;
use crate::models::{Batch, GeoTagInput, VerificationResult};
use crate::services::{FinalPhotoReceipt, FinalizeInput, PhotoUpload};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default, alias = "image")]
    pub photo: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    #[serde(default)]
    pub final_quantity: Option<f64>,
    #[serde(default)]
    pub harvest_date: Option<String>,
    #[serde(default, alias = "finalGps", alias = "geotag")]
    pub final_geotag: Option<GeoTagInput>,
    /// Base64 final photo; the latest uploaded Stage-5 photo when absent
    #[serde(default)]
    pub photo: Option<String>,
}

/// POST /api/batches/:id/final/photo
pub async fn upload_final_photo(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(batch_id): Path<Uuid>,
    Json(request): Json<PhotoRequest>,
) -> ApiResult<Json<FinalPhotoReceipt>> {
    let upload = PhotoUpload {
        bytes: decode_photo("photo", &request.photo)?,
        notes: request.notes,
    };
    Ok(Json(state.service.replace_final_photo(&ctx, batch_id, upload).await?))
}

/// POST /api/batches/:id/verify
pub async fn verify_leaf(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(batch_id): Path<Uuid>,
    Json(request): Json<VerifyRequest>,
) -> ApiResult<Json<VerificationResult>> {
    // An empty photo is reported by the gate itself
    let photo = if request.photo.trim().is_empty() {
        Vec::new()
    } else {
        decode_photo("photo", &request.photo)?
    };
    Ok(Json(state.service.verify_leaf(&ctx, batch_id, photo).await?))
}

/// POST /api/batches/:id/final
pub async fn finalize_batch(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(batch_id): Path<Uuid>,
    Json(request): Json<FinalizeRequest>,
) -> ApiResult<Json<Batch>> {
    let photo = request
        .photo
        .as_deref()
        .filter(|encoded| !encoded.trim().is_empty())
        .map(|encoded| decode_photo("photo", encoded))
        .transpose()?;

    let input = FinalizeInput {
        final_quantity: request.final_quantity,
        harvest_date: request.harvest_date,
        final_geotag: request.final_geotag,
        photo,
    };
    Ok(Json(state.service.finalize(&ctx, batch_id, input).await?))
}

pub fn verification_routes() -> Router<AppState> {
    Router::new()
        .route("/api/batches/:id/final/photo", post(upload_final_photo))
        .route("/api/batches/:id/verify", post(verify_leaf))
        .route("/api/batches/:id/final", post(finalize_batch))
}

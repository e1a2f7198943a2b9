//! Stage evidence, submission and approval endpoints

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use ayu_common::auth::AuthContext;
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{decode_photo, parse_stage};
use crate::error::{ApiResult, ValidationError};
use crate::models::{Batch, Stage, StageSubmission};
use crate::services::{FinalPhotoReceipt, PhotoUpload, StageView, SubmissionInput};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PhotoRequest {
    #[serde(alias = "image")]
    pub photo: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmissionRequest {
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// Base64 photos
    #[serde(default)]
    pub photos: Vec<String>,
}

/// Response of a stage photo upload: stage 1 returns the confirmed batch,
/// stage 5 the stored photo
#[derive(Debug, serde::Serialize)]
#[serde(untagged)]
pub enum StagePhotoResponse {
    Confirmed(Batch),
    FinalPhoto(FinalPhotoReceipt),
}

/// GET /api/batches/:id/stages/:stage
pub async fn view_stage(
    State(state): State<AppState>,
    Path((batch_id, stage)): Path<(Uuid, u8)>,
) -> ApiResult<Json<StageView>> {
    let stage = parse_stage(stage)?;
    Ok(Json(state.service.stage_view(batch_id, stage).await?))
}

/// POST /api/batches/:id/stages/:stage/photo
///
/// Stage 1 confirms the batch (1 → 2). Stage 5 replaces the final photo.
/// Photos for stages 2-4 travel with the submission.
pub async fn upload_stage_photo(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path((batch_id, stage)): Path<(Uuid, u8)>,
    Json(request): Json<PhotoRequest>,
) -> ApiResult<Json<StagePhotoResponse>> {
    let stage = parse_stage(stage)?;
    let upload = PhotoUpload {
        bytes: decode_photo("photo", &request.photo)?,
        notes: request.notes,
    };

    match stage {
        Stage::Plantation => {
            let batch = state.service.upload_stage_one_photo(&ctx, batch_id, upload).await?;
            Ok(Json(StagePhotoResponse::Confirmed(batch)))
        }
        Stage::FinalVerification => {
            let receipt = state.service.replace_final_photo(&ctx, batch_id, upload).await?;
            Ok(Json(StagePhotoResponse::FinalPhoto(receipt)))
        }
        other => Err(ValidationError::invalid(
            "stage",
            format!("photos for stage {} are sent with the stage submission", other.number()),
        )
        .into()),
    }
}

/// POST /api/batches/:id/stages/:stage/submission
pub async fn submit_stage(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path((batch_id, stage)): Path<(Uuid, u8)>,
    Json(request): Json<SubmissionRequest>,
) -> ApiResult<Json<StageSubmission>> {
    let stage = parse_stage(stage)?;
    let photos = request
        .photos
        .iter()
        .map(|encoded| decode_photo("photos", encoded))
        .collect::<Result<Vec<_>, _>>()?;

    let input = SubmissionInput {
        notes: request.notes,
        fields: request.fields,
        photos,
    };
    Ok(Json(state.service.submit_stage(&ctx, batch_id, stage, input).await?))
}

/// POST /api/batches/:id/stages/:stage/approve
pub async fn approve_stage(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path((batch_id, stage)): Path<(Uuid, u8)>,
) -> ApiResult<Json<Batch>> {
    let stage = parse_stage(stage)?;
    Ok(Json(state.service.approve_stage(&ctx, batch_id, stage).await?))
}

pub fn stage_routes() -> Router<AppState> {
    Router::new()
        .route("/api/batches/:id/stages/:stage", get(view_stage))
        .route("/api/batches/:id/stages/:stage/photo", post(upload_stage_photo))
        .route("/api/batches/:id/stages/:stage/submission", post(submit_stage))
        .route("/api/batches/:id/stages/:stage/approve", post(approve_stage))
}

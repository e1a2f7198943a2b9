//! HTTP API handlers for ayu-bt
//!
//! JSON over HTTP. Every `/api` route requires a bearer token; `/health` and
//! `/events` are open (EventSource cannot send custom headers).

pub mod auth;
pub mod batches;
pub mod health;
pub mod notifications;
pub mod sse;
pub mod stages;
pub mod verification;

pub use batches::batch_routes;
pub use health::health_routes;
pub use notifications::notification_routes;
pub use sse::event_stream;
pub use stages::stage_routes;
pub use verification::verification_routes;

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{ApiError, ValidationError};
use crate::models::Stage;

/// Decode a base64 photo, accepting an optional `data:<mime>;base64,` prefix
pub(crate) fn decode_photo(field: &'static str, encoded: &str) -> Result<Vec<u8>, ValidationError> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| ValidationError::invalid(field, format!("not valid base64: {}", e)))?;
    if bytes.is_empty() {
        return Err(ValidationError::invalid(field, "photo must not be empty"));
    }
    Ok(bytes)
}

/// Path segment to stage number
pub(crate) fn parse_stage(stage: u8) -> Result<Stage, ApiError> {
    Stage::from_number(stage)
        .ok_or_else(|| ApiError::BadRequest(format!("stage must be between 1 and 5, got {}", stage)))
}

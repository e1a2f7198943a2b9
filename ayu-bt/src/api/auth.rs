//! Bearer-token authentication for `/api` routes
//!
//! Resolves `Authorization: Bearer <token>` against the `api_tokens` table
//! and attaches the caller's [`AuthContext`] to the request. Role checks are
//! made by the operations themselves (403), never here.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use ayu_common::auth::{lookup_token, parse_bearer, AuthError};

use crate::error::{ApiError, BatchError};
use crate::AppState;

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .map(|value| value.to_str().unwrap_or_default());

    let token = parse_bearer(header).map_err(auth_error)?;
    let ctx = lookup_token(&state.db, token).await.map_err(auth_error)?;

    tracing::debug!(user_id = %ctx.user_id, role = %ctx.role, path = %request.uri().path(), "Authenticated request");
    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

fn auth_error(err: AuthError) -> ApiError {
    match err {
        AuthError::DatabaseError(msg) => {
            ApiError::Batch(BatchError::Common(ayu_common::Error::Internal(msg)))
        }
        other => ApiError::Unauthorized(other.to_string()),
    }
}

//! ayu-bt library interface
//!
//! Batch traceability service: herb batches move through five stages
//! (plantation, growth, health, pre-harvest, final verification) and lock
//! once the final leaf photo is verified.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult};

use axum::{middleware, routing::get, Router};
use ayu_common::config::TomlConfig;
use ayu_common::events::EventBus;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::services::{
    BatchService, DisabledClassifier, HttpSpeciesClassifier, LeafVerificationGate,
    PhotoIntegrityBinder, SpeciesClassifier,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub service: Arc<BatchService>,
    pub startup_time: DateTime<Utc>,
    /// Upper bound on one `/api` request
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(db: SqlitePool, event_bus: EventBus, gate: LeafVerificationGate) -> Self {
        let service = Arc::new(BatchService::new(db.clone(), event_bus.clone(), gate));
        Self {
            db,
            event_bus,
            service,
            startup_time: Utc::now(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Build the leaf verification gate from configuration
///
/// Without a classifier endpoint every verification fails with
/// `ServiceUnavailable`.
pub fn build_verification_gate(config: &TomlConfig) -> Result<LeafVerificationGate, services::VerificationError> {
    let classifier: Arc<dyn SpeciesClassifier> = match &config.classifier.endpoint {
        Some(endpoint) if !endpoint.trim().is_empty() => Arc::new(HttpSpeciesClassifier::new(
            endpoint.trim(),
            config.classifier.bearer_token.clone(),
        )?),
        _ => {
            tracing::warn!("No classifier endpoint configured; leaf verification is unavailable");
            Arc::new(DisabledClassifier)
        }
    };

    Ok(LeafVerificationGate::new(
        classifier,
        PhotoIntegrityBinder::new(&config.hash_algorithm),
        ayu_common::time::secs_to_duration(config.classifier.timeout_secs),
    ))
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(api::batch_routes())
        .merge(api::stage_routes())
        .merge(api::verification_routes())
        .merge(api::notification_routes())
        .layer(middleware::from_fn_with_state(state.clone(), api::auth::require_auth))
        .layer(TimeoutLayer::new(state.request_timeout));

    Router::new()
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

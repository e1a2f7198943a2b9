//! Leaf verification gate
//!
//! Sends the Stage-5 leaf photo to the species-classification service and
//! turns its answer into a [`VerificationResult`] bound to the photo's
//! content hash.
//!
//! The gate never treats an unexpected answer as a pass: a non-2xx status,
//! an unparseable body, or a body without a boolean `match` and a non-empty
//! `predicted_species` all fail with `InvalidVerificationResponse`. The call
//! is bounded by a timeout and is not retried.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use super::photo_integrity::PhotoIntegrityBinder;
use crate::models::VerificationResult;

/// Default bound on one classifier call
pub const DEFAULT_VERIFICATION_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VerificationError {
    #[error("Leaf photo is empty")]
    EmptyPhoto,

    #[error("Leaf verification timed out after {0}s")]
    VerificationTimeout(u64),

    #[error("Invalid verification response: {0}")]
    InvalidVerificationResponse(String),

    /// The classifier refused our credentials; the caller must re-authenticate
    #[error("Classifier rejected the session (HTTP {0})")]
    SessionRejected(u16),

    #[error("Classifier unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Unsupported photo hash algorithm: {0}")]
    UnsupportedCryptoBackend(String),
}

impl VerificationError {
    pub fn code(&self) -> &'static str {
        match self {
            VerificationError::EmptyPhoto => "VALIDATION_ERROR",
            VerificationError::VerificationTimeout(_) => "VERIFICATION_TIMEOUT",
            VerificationError::InvalidVerificationResponse(_) => "INVALID_VERIFICATION_RESPONSE",
            VerificationError::SessionRejected(_) => "SESSION_REJECTED",
            VerificationError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            VerificationError::UnsupportedCryptoBackend(_) => "UNSUPPORTED_CRYPTO_BACKEND",
        }
    }
}

/// Status and body exactly as the classifier returned them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawClassifierResponse {
    pub status: u16,
    pub body: String,
}

/// Species-classification backend
///
/// Implementations only transport the request; interpreting the answer is
/// the gate's job.
#[async_trait]
pub trait SpeciesClassifier: Send + Sync {
    async fn classify(
        &self,
        batch_id: Uuid,
        photo: &[u8],
    ) -> Result<RawClassifierResponse, VerificationError>;
}

/// Classifier reached over HTTP with a multipart `{image, batchId}` upload
pub struct HttpSpeciesClassifier {
    http_client: Client,
    endpoint: String,
    /// Sent as `Authorization: Bearer`; always passed in explicitly
    bearer_token: Option<String>,
}

impl HttpSpeciesClassifier {
    pub fn new(endpoint: impl Into<String>, bearer_token: Option<String>) -> Result<Self, VerificationError> {
        let http_client = Client::builder()
            .build()
            .map_err(|e| VerificationError::ServiceUnavailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
            bearer_token,
        })
    }
}

#[async_trait]
impl SpeciesClassifier for HttpSpeciesClassifier {
    async fn classify(
        &self,
        batch_id: Uuid,
        photo: &[u8],
    ) -> Result<RawClassifierResponse, VerificationError> {
        let image = Part::bytes(photo.to_vec())
            .file_name("leaf.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| VerificationError::ServiceUnavailable(format!("multipart: {}", e)))?;
        let form = Form::new()
            .part("image", image)
            .text("batchId", batch_id.to_string());

        let mut request = self.http_client.post(&self.endpoint).multipart(form);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        debug!(batch_id = %batch_id, endpoint = %self.endpoint, bytes = photo.len(), "Calling species classifier");

        let response = request
            .send()
            .await
            .map_err(|e| VerificationError::ServiceUnavailable(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| VerificationError::InvalidVerificationResponse(format!("unreadable body: {}", e)))?;

        Ok(RawClassifierResponse { status, body })
    }
}

/// Stand-in used when no classifier endpoint is configured
pub struct DisabledClassifier;

#[async_trait]
impl SpeciesClassifier for DisabledClassifier {
    async fn classify(
        &self,
        _batch_id: Uuid,
        _photo: &[u8],
    ) -> Result<RawClassifierResponse, VerificationError> {
        Err(VerificationError::ServiceUnavailable(
            "no classifier endpoint configured".to_string(),
        ))
    }
}

/// Classifier answer after validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierVerdict {
    pub matched: bool,
    pub predicted_species: String,
    pub expected_species: Option<String>,
}

#[derive(Deserialize)]
struct ClassifierBody {
    #[serde(rename = "match")]
    matched: bool,
    #[serde(alias = "predictedSpecies")]
    predicted_species: String,
    #[serde(default, alias = "expectedSpecies")]
    expected_species: Option<String>,
}

/// Validate a raw classifier response
pub fn parse_classifier_response(
    raw: &RawClassifierResponse,
) -> Result<ClassifierVerdict, VerificationError> {
    match raw.status {
        401 | 403 => return Err(VerificationError::SessionRejected(raw.status)),
        200..=299 => {}
        status => {
            return Err(VerificationError::InvalidVerificationResponse(format!(
                "classifier returned HTTP {}",
                status
            )))
        }
    }

    let body: ClassifierBody = serde_json::from_str(&raw.body)
        .map_err(|e| VerificationError::InvalidVerificationResponse(e.to_string()))?;

    let predicted_species = body.predicted_species.trim().to_string();
    if predicted_species.is_empty() {
        return Err(VerificationError::InvalidVerificationResponse(
            "predicted_species is empty".to_string(),
        ));
    }

    Ok(ClassifierVerdict {
        matched: body.matched,
        predicted_species,
        expected_species: body
            .expected_species
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    })
}

/// Hashes the photo, asks the classifier, validates the answer
#[derive(Clone)]
pub struct LeafVerificationGate {
    classifier: Arc<dyn SpeciesClassifier>,
    binder: PhotoIntegrityBinder,
    timeout: Duration,
}

impl LeafVerificationGate {
    pub fn new(
        classifier: Arc<dyn SpeciesClassifier>,
        binder: PhotoIntegrityBinder,
        timeout: Duration,
    ) -> Self {
        Self {
            classifier,
            binder,
            timeout,
        }
    }

    pub fn binder(&self) -> &PhotoIntegrityBinder {
        &self.binder
    }

    /// Classify `photo` for `batch_id`
    ///
    /// The hash is computed before dispatch so an unsupported algorithm never
    /// reaches the network.
    pub async fn verify(
        &self,
        batch_id: Uuid,
        photo: &[u8],
    ) -> Result<VerificationResult, VerificationError> {
        if photo.is_empty() {
            return Err(VerificationError::EmptyPhoto);
        }
        let photo_hash = self.binder.content_hash(photo)?;

        let raw = tokio::time::timeout(self.timeout, self.classifier.classify(batch_id, photo))
            .await
            .map_err(|_| {
                warn!(batch_id = %batch_id, timeout_secs = self.timeout.as_secs(), "Leaf verification timed out");
                VerificationError::VerificationTimeout(self.timeout.as_secs())
            })??;

        let verdict = parse_classifier_response(&raw).inspect_err(|e| {
            warn!(batch_id = %batch_id, status = raw.status, error = %e, "Rejected classifier response");
        })?;

        debug!(
            batch_id = %batch_id,
            matched = verdict.matched,
            predicted = %verdict.predicted_species,
            "Classifier verdict"
        );

        Ok(VerificationResult {
            matched: verdict.matched,
            predicted_species: verdict.predicted_species,
            expected_species: verdict.expected_species,
            photo_hash,
        })
    }
}

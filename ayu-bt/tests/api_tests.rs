//! HTTP-level tests for the batch lifecycle
//!
//! Every test builds the full router on an in-memory database with a stub
//! species classifier and drives it with `oneshot` requests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use ayu_bt::services::{
    LeafVerificationGate, PhotoIntegrityBinder, RawClassifierResponse, SpeciesClassifier,
    VerificationError,
};
use ayu_bt::{build_router, db, AppState};
use ayu_common::auth::{store_token, AuthContext, Role};
use ayu_common::events::EventBus;
use base64::Engine;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

const FARMER: &str = "farmer-token";
const COLLECTOR: &str = "collector-token";
const ADMIN: &str = "admin-token";
const TESTER: &str = "tester-token";

const LEAF: &[u8] = b"leaf photo bytes";
const OTHER_LEAF: &[u8] = b"a different leaf";

/// Classifier whose answer the test can swap at any time
struct StubClassifier {
    response: Mutex<RawClassifierResponse>,
}

impl StubClassifier {
    fn answering(status: u16, body: Value) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(RawClassifierResponse {
                status,
                body: body.to_string(),
            }),
        })
    }

    fn set_raw(&self, status: u16, body: &str) {
        *self.response.lock().unwrap() = RawClassifierResponse {
            status,
            body: body.to_string(),
        };
    }
}

#[async_trait]
impl SpeciesClassifier for StubClassifier {
    async fn classify(
        &self,
        _batch_id: Uuid,
        _photo: &[u8],
    ) -> Result<RawClassifierResponse, VerificationError> {
        Ok(self.response.lock().unwrap().clone())
    }
}

struct TestApp {
    router: Router,
    classifier: Arc<StubClassifier>,
}

async fn create_test_app() -> TestApp {
    let pool = ayu_common::db::open_memory_pool().await.unwrap();
    db::init_tables(&pool).await.unwrap();

    for (token, user, role) in [
        (FARMER, "F-1", Role::Farmer),
        (COLLECTOR, "C-1", Role::Collector),
        (ADMIN, "A-1", Role::Admin),
        (TESTER, "T-1", Role::Tester),
    ] {
        store_token(&pool, token, &AuthContext::new(user, role)).await.unwrap();
    }

    let classifier = StubClassifier::answering(
        200,
        json!({"match": true, "predicted_species": "Tulsi"}),
    );
    let gate = LeafVerificationGate::new(
        classifier.clone(),
        PhotoIntegrityBinder::default(),
        Duration::from_secs(5),
    );
    let state = AppState::new(pool, EventBus::new(100), gate);

    TestApp {
        router: build_router(state),
        classifier,
    }
}

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

impl TestApp {
    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send("GET", uri, Some(token), None).await
    }

    async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send("POST", uri, Some(token), Some(body)).await
    }

    async fn create_batch(&self) -> Uuid {
        let (status, body) = self
            .post(
                "/api/batches",
                COLLECTOR,
                json!({
                    "species": "Tulsi",
                    "farmId": "F-1",
                    "startDate": "2024-01-01",
                    "coords": "10.0,20.0"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["batch"]["batchId"].as_str().unwrap().parse().unwrap()
    }

    async fn confirm_stage_one(&self, batch_id: Uuid) {
        let (status, body) = self
            .post(
                &format!("/api/batches/{}/stages/1/photo", batch_id),
                COLLECTOR,
                json!({"photo": b64(b"plot photo"), "notes": "seedlings planted"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
    }

    async fn submit(&self, batch_id: Uuid, stage: u8) -> (StatusCode, Value) {
        self.post(
            &format!("/api/batches/{}/stages/{}/submission", batch_id, stage),
            FARMER,
            json!({
                "notes": format!("stage {} looks good", stage),
                "fields": {"heightCm": 30},
                "photos": [b64(format!("stage {} photo", stage).as_bytes())]
            }),
        )
        .await
    }

    async fn approve(&self, batch_id: Uuid, stage: u8) -> (StatusCode, Value) {
        self.post(
            &format!("/api/batches/{}/stages/{}/approve", batch_id, stage),
            COLLECTOR,
            json!({}),
        )
        .await
    }

    /// Create a batch and walk it to stage 5
    async fn batch_at_final_stage(&self) -> Uuid {
        let batch_id = self.create_batch().await;
        self.confirm_stage_one(batch_id).await;
        for stage in 2..=4 {
            let (status, body) = self.submit(batch_id, stage).await;
            assert_eq!(status, StatusCode::OK, "{}", body);
            let (status, body) = self.approve(batch_id, stage).await;
            assert_eq!(status, StatusCode::OK, "{}", body);
        }
        batch_id
    }

    async fn verify(&self, batch_id: Uuid, photo: &[u8]) -> (StatusCode, Value) {
        self.post(
            &format!("/api/batches/{}/verify", batch_id),
            COLLECTOR,
            json!({"photo": b64(photo)}),
        )
        .await
    }

    async fn finalize(&self, batch_id: Uuid, photo: Option<&[u8]>) -> (StatusCode, Value) {
        let mut body = json!({
            "finalQuantity": 12.5,
            "harvestDate": "2024-06-01",
            "finalGeotag": "10.5,20.5"
        });
        if let Some(photo) = photo {
            body["photo"] = json!(b64(photo));
        }
        self.post(&format!("/api/batches/{}/final", batch_id), COLLECTOR, body)
            .await
    }

    async fn batch(&self, batch_id: Uuid) -> Value {
        let (status, body) = self.get(&format!("/api/batches/{}", batch_id), FARMER).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body
    }
}

// ========================================
// Health and authentication
// ========================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app().await;

    let (status, body) = app.send("GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "ayu-bt");
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = create_test_app().await;

    let (status, body) = app
        .send("POST", "/api/batches", None, Some(json!({"species": "Tulsi"})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = app
        .send("GET", "/api/notifications", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_role_is_forbidden() {
    let app = create_test_app().await;

    let (status, body) = app
        .post(
            "/api/batches",
            TESTER,
            json!({"species": "Tulsi", "farmId": "F-1", "coords": "10.0,20.0"}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let batch_id = app.create_batch().await;
    app.confirm_stage_one(batch_id).await;
    let (status, _) = app
        .post(
            &format!("/api/batches/{}/stages/2/submission", batch_id),
            COLLECTOR,
            json!({"notes": "not mine to submit"}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ========================================
// Creation and Stage 1
// ========================================

#[tokio::test]
async fn test_create_batch_starts_at_stage_one() {
    let app = create_test_app().await;

    let (status, body) = app
        .post(
            "/api/batches",
            COLLECTOR,
            json!({
                "species": "Tulsi",
                "farmId": "F-1",
                "startDate": "2024-01-01",
                "coords": "10.0,20.0"
            }),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["photoUpload"], "skipped");
    let batch = &body["batch"];
    assert_eq!(batch["currentStage"], 1);
    assert_eq!(batch["completedStages"], json!([]));
    assert_eq!(batch["locked"], false);
    assert_eq!(batch["species"], "Tulsi");
    assert_eq!(batch["farmerId"], "F-1");
    assert_eq!(batch["visitDate"], "2024-01-01");
    assert_eq!(batch["geotag"]["latitude"], 10.0);
    assert_eq!(batch["geotag"]["longitude"], 20.0);
}

#[tokio::test]
async fn test_create_batch_validation_errors() {
    let app = create_test_app().await;

    let (status, body) = app
        .post("/api/batches", COLLECTOR, json!({"farmId": "F-1", "coords": "10,20"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = app
        .post(
            "/api/batches",
            COLLECTOR,
            json!({"species": "Tulsi", "farmId": "F-1", "coords": "95.0,20.0"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/api/batches",
            COLLECTOR,
            json!({"species": "Dandelion", "farmId": "F-1", "coords": "10,20"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_with_photo_confirms_batch() {
    let app = create_test_app().await;

    let (status, body) = app
        .post(
            "/api/batches",
            COLLECTOR,
            json!({
                "species": "Ashwagandha",
                "farmId": "F-1",
                "coords": {"latitude": 12.9, "longitude": 77.6},
                "photo": b64(b"plot photo"),
                "notes": "north field"
            }),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["photoUpload"], "stored");
    assert_eq!(body["batch"]["currentStage"], 2);
    assert_eq!(body["batch"]["completedStages"], json!([1]));

    let batch_id = body["batch"]["batchId"].as_str().unwrap();
    let (status, view) = app
        .get(&format!("/api/batches/{}/stages/1", batch_id), FARMER)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "completed");
    assert_eq!(view["notes"], "north field");
    assert_eq!(view["photos"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_stage_one_photo_advances_to_stage_two() {
    let app = create_test_app().await;
    let batch_id = app.create_batch().await;

    let (status, body) = app
        .post(
            &format!("/api/batches/{}/stages/1/photo", batch_id),
            COLLECTOR,
            json!({"photo": b64(b"plot photo")}),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["currentStage"], 2);
    assert_eq!(body["completedStages"], json!([1]));

    // A second confirmation is out of order
    let (status, body) = app
        .post(
            &format!("/api/batches/{}/stages/1/photo", batch_id),
            COLLECTOR,
            json!({"photo": b64(b"plot photo")}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "STAGE_ORDER_VIOLATION");
}

#[tokio::test]
async fn test_invalid_photo_encoding_rejected() {
    let app = create_test_app().await;
    let batch_id = app.create_batch().await;

    let (status, body) = app
        .post(
            &format!("/api/batches/{}/stages/1/photo", batch_id),
            COLLECTOR,
            json!({"photo": "***not base64***"}),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(app.batch(batch_id).await["currentStage"], 1);
}

// ========================================
// Stages 2-4
// ========================================

#[tokio::test]
async fn test_out_of_order_approval_leaves_state_unchanged() {
    let app = create_test_app().await;
    let batch_id = app.create_batch().await;
    app.confirm_stage_one(batch_id).await;
    let before = app.batch(batch_id).await;

    let (status, body) = app.approve(batch_id, 3).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "STAGE_ORDER_VIOLATION");
    assert_eq!(app.batch(batch_id).await, before);
}

#[tokio::test]
async fn test_approval_requires_submission() {
    let app = create_test_app().await;
    let batch_id = app.create_batch().await;
    app.confirm_stage_one(batch_id).await;

    let (status, body) = app.approve(batch_id, 2).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_TRANSITION");
    assert_eq!(app.batch(batch_id).await["currentStage"], 2);

    let (status, first) = app.submit(batch_id, 2).await;
    assert_eq!(status, StatusCode::OK, "{}", first);
    assert_eq!(first["submitted"], true);

    // Resubmission replaces the evidence and stays submitted
    let (status, second) = app
        .post(
            &format!("/api/batches/{}/stages/2/submission", batch_id),
            FARMER,
            json!({"notes": "updated notes"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["submitted"], true);
    assert_eq!(second["evidence"]["notes"], "updated notes");

    let (status, body) = app.approve(batch_id, 2).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["currentStage"], 3);
    assert_eq!(body["completedStages"], json!([1, 2]));
}

#[tokio::test]
async fn test_submission_for_future_stage_rejected() {
    let app = create_test_app().await;
    let batch_id = app.create_batch().await;
    app.confirm_stage_one(batch_id).await;

    let (status, body) = app.submit(batch_id, 3).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "STAGE_NOT_REACHED");
}

#[tokio::test]
async fn test_stage_view_waiting_then_submitted() {
    let app = create_test_app().await;
    let batch_id = app.create_batch().await;
    app.confirm_stage_one(batch_id).await;
    let uri = format!("/api/batches/{}/stages/2", batch_id);

    let (status, view) = app.get(&uri, COLLECTOR).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "waiting");
    assert_eq!(view["submitted"], false);
    assert_eq!(view["photos"], json!([]));

    app.submit(batch_id, 2).await;
    let (_, view) = app.get(&uri, COLLECTOR).await;
    assert_eq!(view["status"], "submitted");
    assert_eq!(view["notes"], "stage 2 looks good");
    assert_eq!(view["fields"]["heightCm"], 30);
    assert_eq!(view["photos"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .get(&format!("/api/batches/{}/stages/4", batch_id), COLLECTOR)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "STAGE_NOT_REACHED");

    let (status, _) = app
        .get(&format!("/api/batches/{}/stages/6", batch_id), COLLECTOR)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_batch_is_not_found() {
    let app = create_test_app().await;

    let (status, body) = app
        .get(&format!("/api/batches/{}", Uuid::new_v4()), FARMER)
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

// ========================================
// Stage 5 and locking
// ========================================

#[tokio::test]
async fn test_verify_then_finalize_locks_batch() {
    let app = create_test_app().await;
    let batch_id = app.batch_at_final_stage().await;
    app.classifier.set_raw(
        200,
        r#"{"match": true, "predicted_species": "Ashwagandha"}"#,
    );

    let (status, result) = app.verify(batch_id, LEAF).await;
    assert_eq!(status, StatusCode::OK, "{}", result);
    assert_eq!(result["match"], true);
    assert_eq!(result["predictedSpecies"], "Ashwagandha");
    assert_eq!(result["expectedSpecies"], "Tulsi");

    let (status, body) = app.finalize(batch_id, Some(LEAF)).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["locked"], true);
    assert_eq!(body["completedStages"], json!([1, 2, 3, 4, 5]));
    assert_eq!(body["finalDetails"]["finalQuantity"], 12.5);
    assert_eq!(body["finalDetails"]["harvestDate"], "2024-06-01");
    assert_eq!(body["finalDetails"]["finalPhotoHash"], result["photoHash"]);

    // Locked batches reject every mutation
    let (status, body) = app.approve(batch_id, 5).await;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(body["error"]["code"], "BATCH_LOCKED");

    let (status, _) = app.verify(batch_id, LEAF).await;
    assert_eq!(status, StatusCode::LOCKED);

    let (status, _) = app.finalize(batch_id, Some(LEAF)).await;
    assert_eq!(status, StatusCode::LOCKED);

    let (status, _) = app
        .post(
            &format!("/api/batches/{}/final/photo", batch_id),
            COLLECTOR,
            json!({"photo": b64(LEAF)}),
        )
        .await;
    assert_eq!(status, StatusCode::LOCKED);

    // Stage views stay readable
    let (status, view) = app
        .get(&format!("/api/batches/{}/stages/5", batch_id), FARMER)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "completed");
    assert_eq!(view["verification"]["isVerified"], true);
}

#[tokio::test]
async fn test_finalize_uses_latest_verified_photo() {
    let app = create_test_app().await;
    let batch_id = app.batch_at_final_stage().await;

    let (status, _) = app.verify(batch_id, LEAF).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.finalize(batch_id, None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["locked"], true);
}

#[tokio::test]
async fn test_finalize_requires_verification() {
    let app = create_test_app().await;
    let batch_id = app.batch_at_final_stage().await;

    let (status, body) = app.finalize(batch_id, Some(LEAF)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_TRANSITION");
    assert_eq!(app.batch(batch_id).await["locked"], false);
}

#[tokio::test]
async fn test_finalize_with_different_photo_resets_verification() {
    let app = create_test_app().await;
    let batch_id = app.batch_at_final_stage().await;
    app.verify(batch_id, LEAF).await;

    let (status, body) = app.finalize(batch_id, Some(OTHER_LEAF)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "PHOTO_HASH_MISMATCH");

    let (_, view) = app
        .get(&format!("/api/batches/{}/stages/5", batch_id), COLLECTOR)
        .await;
    assert_eq!(view["verification"]["isVerified"], false);
    assert_eq!(app.batch(batch_id).await["locked"], false);

    // The original photo no longer counts as verified either
    let (status, body) = app.finalize(batch_id, Some(LEAF)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn test_replacing_final_photo_resets_verification() {
    let app = create_test_app().await;
    let batch_id = app.batch_at_final_stage().await;
    app.verify(batch_id, LEAF).await;

    let (status, body) = app
        .post(
            &format!("/api/batches/{}/final/photo", batch_id),
            COLLECTOR,
            json!({"photo": b64(OTHER_LEAF)}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["verificationReset"], true);

    let (status, body) = app.finalize(batch_id, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_TRANSITION");

    // Verifying the new photo unblocks completion
    app.verify(batch_id, OTHER_LEAF).await;
    let (status, body) = app.finalize(batch_id, None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
}

#[tokio::test]
async fn test_malformed_classifier_response_is_not_verified() {
    let app = create_test_app().await;
    let batch_id = app.batch_at_final_stage().await;
    app.classifier.set_raw(200, r#"{"label": "Tulsi"}"#);

    let (status, body) = app.verify(batch_id, LEAF).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "INVALID_VERIFICATION_RESPONSE");

    let (_, view) = app
        .get(&format!("/api/batches/{}/stages/5", batch_id), COLLECTOR)
        .await;
    assert!(view.get("verification").is_none());

    let (status, _) = app.finalize(batch_id, Some(LEAF)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_classifier_rejecting_session() {
    let app = create_test_app().await;
    let batch_id = app.batch_at_final_stage().await;
    app.classifier.set_raw(403, "forbidden");

    let (status, body) = app.verify(batch_id, LEAF).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "SESSION_REJECTED");
}

#[tokio::test]
async fn test_species_mismatch_is_recorded_unverified() {
    let app = create_test_app().await;
    let batch_id = app.batch_at_final_stage().await;
    app.classifier
        .set_raw(200, r#"{"match": false, "predicted_species": "Neem"}"#);

    let (status, result) = app.verify(batch_id, LEAF).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["match"], false);

    let (status, _) = app.finalize(batch_id, Some(LEAF)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_empty_verify_photo_rejected() {
    let app = create_test_app().await;
    let batch_id = app.batch_at_final_stage().await;

    let (status, body) = app
        .post(
            &format!("/api/batches/{}/verify", batch_id),
            COLLECTOR,
            json!({"photo": ""}),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_verify_before_stage_five_rejected() {
    let app = create_test_app().await;
    let batch_id = app.create_batch().await;

    let (status, body) = app.verify(batch_id, LEAF).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "STAGE_NOT_REACHED");
}

#[tokio::test]
async fn test_finalize_before_stage_five_is_out_of_order() {
    let app = create_test_app().await;
    let batch_id = app.create_batch().await;
    app.confirm_stage_one(batch_id).await;
    let before = app.batch(batch_id).await;

    let (status, body) = app.finalize(batch_id, Some(LEAF)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "STAGE_ORDER_VIOLATION");
    let after = app.batch(batch_id).await;
    assert_eq!(after, before);
    assert_eq!(after["currentStage"], 2);
    assert_eq!(after["locked"], false);
}

// ========================================
// History, active batch and notifications
// ========================================

#[tokio::test]
async fn test_history_records_each_transition() {
    let app = create_test_app().await;
    let batch_id = app.batch_at_final_stage().await;
    app.verify(batch_id, LEAF).await;
    app.finalize(batch_id, None).await;

    let (status, body) = app
        .get(&format!("/api/batches/{}/history", batch_id), ADMIN)
        .await;

    assert_eq!(status, StatusCode::OK);
    let transitions = body["transitions"].as_array().unwrap();
    assert_eq!(transitions.len(), 5);
    let from: Vec<u64> = transitions
        .iter()
        .map(|t| t["fromStage"].as_u64().unwrap())
        .collect();
    assert_eq!(from, vec![1, 2, 3, 4, 5]);
    assert_eq!(transitions[0]["to"], json!({"phase": "active", "stage": 2}));
    assert_eq!(transitions[4]["to"], json!({"phase": "locked"}));
    assert_eq!(transitions[4]["actor"], "C-1");
}

#[tokio::test]
async fn test_active_batch_for_farmer() {
    let app = create_test_app().await;

    let (status, _) = app.get("/api/batches/active", FARMER).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let batch_id = app.create_batch().await;
    app.confirm_stage_one(batch_id).await;

    let (status, body) = app.get("/api/batches/active", FARMER).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["batchId"], batch_id.to_string());
    assert_eq!(body["currentStage"], 2);
    assert_eq!(body["completedStages"], json!([1]));
}

#[tokio::test]
async fn test_notifications_flow() {
    let app = create_test_app().await;
    let batch_id = app.create_batch().await;
    app.confirm_stage_one(batch_id).await;
    app.submit(batch_id, 2).await;

    let (status, body) = app.get("/api/notifications", FARMER).await;
    assert_eq!(status, StatusCode::OK);
    let farmer_notes = body["notifications"].as_array().unwrap();
    assert!(farmer_notes.len() >= 2);
    assert!(farmer_notes.iter().all(|n| n["read"] == false));

    let (_, body) = app.get("/api/notifications", COLLECTOR).await;
    let collector_notes = body["notifications"].as_array().unwrap();
    assert!(collector_notes
        .iter()
        .any(|n| n["title"] == "Stage submitted"));

    let id = farmer_notes[0]["id"].as_str().unwrap();
    let (status, _) = app
        .send(
            "POST",
            &format!("/api/notifications/{}/read", id),
            Some(FARMER),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Another user cannot mark it
    let (status, _) = app
        .send(
            "POST",
            &format!("/api/notifications/{}/read", id),
            Some(COLLECTOR),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app.get("/api/notifications?limit=1", FARMER).await;
    assert_eq!(body["notifications"].as_array().unwrap().len(), 1);
}

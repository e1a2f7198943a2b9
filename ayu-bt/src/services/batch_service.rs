//! Batch service
//!
//! Owns every batch operation. Mutations follow one pattern:
//!
//! 1. take the per-batch guard from [`BatchLocks`]
//! 2. load the batch and its evidence fresh from the database
//! 3. evaluate the guards ([`attempt_transition`] for stage changes)
//! 4. write inside one transaction, with the batch row version-checked
//! 5. invalidate the cache, then emit events and notifications
//!
//! A failed guard writes nothing, except where noted (a photo hash mismatch
//! at finalization resets verification).

use ayu_common::auth::{AuthContext, Role};
use ayu_common::events::{AyuEvent, EventBus};
use ayu_common::time;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use super::batch_cache::BatchCache;
use super::batch_locks::BatchLocks;
use super::leaf_verifier::{LeafVerificationGate, VerificationError};
use crate::db::{batches, notifications, photos, transitions, verifications};
use crate::error::{BatchError, BatchResult, ValidationError};
use crate::models::{
    Batch, GeoTagInput, Notification, NotificationCategory, PhotoRecord, Stage, StageEvidence,
    StageSubmission, StageTransitionRecord, VerificationRecord, VerificationResult,
};
use crate::workflow::creation::{parse_date, validate_batch_input, BatchInput};
use crate::workflow::state_machine::{
    attempt_transition, check_view, ensure_current, ensure_mutable, target_phase,
    FinalStageEvidence, TransitionError, TransitionEvidence,
};
use crate::workflow::tracker::StageSubmissionTracker;

/// Default page size for notification listings
pub const NOTIFICATION_PAGE: i64 = 50;

/// Decoded photo with optional notes
#[derive(Debug, Clone, Default)]
pub struct PhotoUpload {
    pub bytes: Vec<u8>,
    pub notes: Option<String>,
}

/// Outcome of the Stage-1 photo phase of batch creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoUploadStatus {
    /// No photo came with the request
    Skipped,
    Stored,
    /// Batch exists but stays at stage 1 until the photo is uploaded again
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedBatch {
    pub batch: Batch,
    pub photo_upload: PhotoUploadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_error: Option<String>,
}

/// Farmer evidence for stages 2-4
#[derive(Debug, Clone, Default)]
pub struct SubmissionInput {
    pub notes: Option<String>,
    pub fields: Map<String, Value>,
    pub photos: Vec<Vec<u8>>,
}

/// Stage-5 completion request
#[derive(Debug, Clone, Default)]
pub struct FinalizeInput {
    pub final_quantity: Option<f64>,
    pub harvest_date: Option<String>,
    pub final_geotag: Option<GeoTagInput>,
    /// When absent the most recent Stage-5 photo is used
    pub photo: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Completed,
    Submitted,
    Waiting,
}

/// Read-only view of one stage
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageView {
    pub batch_id: Uuid,
    pub stage: Stage,
    pub status: StageStatus,
    pub submitted: bool,
    pub notes: Option<String>,
    pub fields: Map<String, Value>,
    pub photos: Vec<PhotoRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalPhotoReceipt {
    pub photo: PhotoRecord,
    pub verification_reset: bool,
}

pub struct BatchService {
    db: SqlitePool,
    event_bus: EventBus,
    tracker: StageSubmissionTracker,
    gate: LeafVerificationGate,
    locks: BatchLocks,
    cache: BatchCache,
}

impl BatchService {
    pub fn new(db: SqlitePool, event_bus: EventBus, gate: LeafVerificationGate) -> Self {
        Self {
            tracker: StageSubmissionTracker::new(db.clone()),
            db,
            event_bus,
            gate,
            locks: BatchLocks::new(),
            cache: BatchCache::new(),
        }
    }

    pub fn tracker(&self) -> &StageSubmissionTracker {
        &self.tracker
    }

    // ========================================
    // Creation and Stage 1
    // ========================================

    /// Create a batch at stage 1, then try the optional Stage-1 photo
    ///
    /// The two phases are not atomic: a failed photo upload leaves the batch
    /// at stage 1 and is reported, not rolled back.
    pub async fn create_batch(
        &self,
        ctx: &AuthContext,
        input: BatchInput,
        stage_one_photo: Option<PhotoUpload>,
    ) -> BatchResult<CreatedBatch> {
        require(ctx, Role::can_approve_stages, "create batches")?;

        let validated = validate_batch_input(&input, time::today())?;
        let batch = validated.into_batch(&ctx.user_id, time::now());
        batches::insert_batch(&self.db, &batch).await?;

        info!(
            batch_id = %batch.batch_id,
            farmer_id = %batch.farmer_id,
            species = %batch.species,
            created_by = %ctx.user_id,
            "Batch created"
        );
        self.event_bus.emit_lossy(AyuEvent::BatchCreated {
            batch_id: batch.batch_id,
            farmer_id: batch.farmer_id.clone(),
            species: batch.species.to_string(),
            created_by: ctx.user_id.clone(),
            timestamp: time::now(),
        });
        self.notify(
            &batch.farmer_id,
            NotificationCategory::Batch,
            "Batch created",
            format!("Batch {} ({}) was registered at stage 1", batch.batch_id, batch.species),
        )
        .await;

        let Some(upload) = stage_one_photo else {
            return Ok(CreatedBatch {
                batch,
                photo_upload: PhotoUploadStatus::Skipped,
                photo_error: None,
            });
        };

        match self.upload_stage_one_photo(ctx, batch.batch_id, upload).await {
            Ok(advanced) => Ok(CreatedBatch {
                batch: advanced,
                photo_upload: PhotoUploadStatus::Stored,
                photo_error: None,
            }),
            Err(err) => {
                warn!(
                    batch_id = %batch.batch_id,
                    error = %err,
                    "Batch created but Stage-1 photo upload failed; batch stays at stage 1"
                );
                self.event_bus.emit_lossy(AyuEvent::Stage1PhotoMissing {
                    batch_id: batch.batch_id,
                    reason: err.to_string(),
                    timestamp: time::now(),
                });
                self.notify(
                    &ctx.user_id,
                    NotificationCategory::Alert,
                    "Stage-1 photo missing",
                    format!(
                        "Batch {} was created but its photo was not stored: {}",
                        batch.batch_id, err
                    ),
                )
                .await;

                Ok(CreatedBatch {
                    batch,
                    photo_upload: PhotoUploadStatus::Failed,
                    photo_error: Some(err.to_string()),
                })
            }
        }
    }

    /// Store the Stage-1 photo and confirm the batch (1 → 2)
    pub async fn upload_stage_one_photo(
        &self,
        ctx: &AuthContext,
        batch_id: Uuid,
        upload: PhotoUpload,
    ) -> BatchResult<Batch> {
        require(ctx, Role::can_approve_stages, "upload Stage-1 photos")?;
        if upload.bytes.is_empty() {
            return Err(ValidationError::MissingField("photo").into());
        }

        let _guard = self.locks.acquire(batch_id).await;
        let batch = self.load_fresh(batch_id).await?;
        ensure_mutable(&batch)?;
        ensure_current(&batch, Stage::Plantation)?;

        let photo = self.photo_record(ctx, &batch, Stage::Plantation, &upload.bytes, upload.notes)?;
        let next = attempt_transition(
            &batch,
            Stage::Plantation,
            &TransitionEvidence::StageOnePhoto { photo_stored: true },
        )?;

        let mut tx = self.db.begin().await?;
        photos::insert_photo(&mut *tx, &photo, &upload.bytes).await?;
        let stored = self.commit_transition(&mut tx, ctx, &batch, &next).await?;
        tx.commit().await?;

        self.after_advance(ctx, &batch, &stored).await;
        Ok(stored)
    }

    // ========================================
    // Reads
    // ========================================

    pub async fn get_batch(&self, batch_id: Uuid) -> BatchResult<Batch> {
        self.cache
            .get_or_load(&self.db, batch_id)
            .await?
            .ok_or(BatchError::NotFound(batch_id))
    }

    /// Most recently updated unlocked batch the caller takes part in
    pub async fn active_batch(&self, ctx: &AuthContext) -> BatchResult<Batch> {
        batches::find_active_batch(&self.db, ctx).await?.ok_or_else(|| {
            BatchError::Common(ayu_common::Error::NotFound(format!(
                "no active batch for {}",
                ctx.user_id
            )))
        })
    }

    pub async fn history(&self, batch_id: Uuid) -> BatchResult<Vec<StageTransitionRecord>> {
        self.get_batch(batch_id).await?;
        Ok(transitions::list_transitions(&self.db, batch_id).await?)
    }

    /// Evidence of a reached stage
    ///
    /// Stages 2-4 without a submission yield a `waiting` placeholder.
    pub async fn stage_view(&self, batch_id: Uuid, stage: Stage) -> BatchResult<StageView> {
        let batch = self.get_batch(batch_id).await?;
        check_view(&batch, stage)?;
        let completed = batch.completed_stages.contains(&stage);

        let mut view = StageView {
            batch_id,
            stage,
            status: StageStatus::Waiting,
            submitted: false,
            notes: None,
            fields: Map::new(),
            photos: Vec::new(),
            verification: None,
        };

        match stage {
            Stage::Plantation | Stage::FinalVerification => {
                view.photos = photos::list_photos(&self.db, batch_id, stage).await?;
                view.notes = view.photos.iter().rev().find_map(|p| p.notes.clone());
                if stage == Stage::FinalVerification {
                    view.verification = verifications::load_record(&self.db, batch_id).await?;
                    view.submitted = batch.locked;
                } else {
                    view.submitted = !view.photos.is_empty();
                }
            }
            _ => {
                let submission = self.tracker.evidence(batch_id, stage).await?;
                if submission.submitted {
                    let all = photos::list_photos(&self.db, batch_id, stage).await?;
                    view.submitted = true;
                    view.photos = all
                        .into_iter()
                        .filter(|p| submission.evidence.photo_ids.contains(&p.photo_id))
                        .collect();
                    view.notes = submission.evidence.notes;
                    view.fields = submission.evidence.fields;
                }
            }
        }

        view.status = if completed {
            StageStatus::Completed
        } else if view.submitted {
            StageStatus::Submitted
        } else {
            StageStatus::Waiting
        };
        Ok(view)
    }

    // ========================================
    // Stages 2-4
    // ========================================

    /// Farmer evidence for the current stage (2-4)
    pub async fn submit_stage(
        &self,
        ctx: &AuthContext,
        batch_id: Uuid,
        stage: Stage,
        input: SubmissionInput,
    ) -> BatchResult<StageSubmission> {
        require(ctx, Role::can_submit_evidence, "submit stage evidence")?;
        if !stage.requires_submission() {
            return Err(ValidationError::invalid(
                "stage",
                format!("evidence is only submitted for stages 2-4, got {}", stage.number()),
            )
            .into());
        }

        let _guard = self.locks.acquire(batch_id).await;
        let batch = self.load_fresh(batch_id).await?;
        if ctx.role == Role::Farmer && batch.farmer_id != ctx.user_id {
            return Err(BatchError::Forbidden(format!(
                "batch {} belongs to another farmer",
                batch_id
            )));
        }
        ensure_mutable(&batch)?;
        check_view(&batch, stage)?;
        ensure_current(&batch, stage)?;

        let mut records = Vec::with_capacity(input.photos.len());
        for bytes in &input.photos {
            if bytes.is_empty() {
                return Err(ValidationError::invalid("photos", "photo must not be empty").into());
            }
            records.push(self.photo_record(ctx, &batch, stage, bytes, None)?);
        }

        let evidence = StageEvidence {
            notes: input.notes,
            fields: input.fields,
            photo_ids: records.iter().map(|r| r.photo_id).collect(),
        };

        let mut tx = self.db.begin().await?;
        for (record, bytes) in records.iter().zip(&input.photos) {
            photos::insert_photo(&mut *tx, record, bytes).await?;
        }
        let first = self
            .tracker
            .record_submission_in(&mut *tx, batch_id, stage, evidence, &ctx.user_id)
            .await?;
        tx.commit().await?;

        info!(batch_id = %batch_id, stage = stage.number(), first, submitted_by = %ctx.user_id, "Stage evidence submitted");
        self.event_bus.emit_lossy(AyuEvent::StageSubmitted {
            batch_id,
            stage: stage.number(),
            submitted_by: ctx.user_id.clone(),
            timestamp: time::now(),
        });
        let title = if first { "Stage submitted" } else { "Stage evidence updated" };
        self.notify(
            &batch.created_by,
            NotificationCategory::Batch,
            title,
            format!("Batch {}: {} is ready for review", batch_id, stage),
        )
        .await;

        self.tracker.evidence(batch_id, stage).await
    }

    /// Collector approval of the current stage
    pub async fn approve_stage(&self, ctx: &AuthContext, batch_id: Uuid, stage: Stage) -> BatchResult<Batch> {
        require(ctx, Role::can_approve_stages, "approve stages")?;

        let _guard = self.locks.acquire(batch_id).await;
        let batch = self.load_fresh(batch_id).await?;

        let submitted = if stage.requires_submission() {
            self.tracker.is_submitted(batch_id, stage).await?
        } else {
            false
        };
        let evidence = TransitionEvidence::Approval {
            role: ctx.role,
            submitted,
        };
        let next = attempt_transition(&batch, stage, &evidence).inspect_err(|e| {
            warn!(batch_id = %batch_id, stage = stage.number(), error = %e, "Stage approval rejected");
        })?;

        let mut tx = self.db.begin().await?;
        let stored = self.commit_transition(&mut tx, ctx, &batch, &next).await?;
        tx.commit().await?;

        self.after_advance(ctx, &batch, &stored).await;
        Ok(stored)
    }

    // ========================================
    // Stage 5
    // ========================================

    /// Upload or replace the Stage-5 photo; any prior verification is reset
    pub async fn replace_final_photo(
        &self,
        ctx: &AuthContext,
        batch_id: Uuid,
        upload: PhotoUpload,
    ) -> BatchResult<FinalPhotoReceipt> {
        require(ctx, Role::can_approve_stages, "upload Stage-5 photos")?;
        if upload.bytes.is_empty() {
            return Err(ValidationError::MissingField("photo").into());
        }

        let _guard = self.locks.acquire(batch_id).await;
        let batch = self.load_fresh(batch_id).await?;
        ensure_mutable(&batch)?;
        check_view(&batch, Stage::FinalVerification)?;

        let photo = self.photo_record(ctx, &batch, Stage::FinalVerification, &upload.bytes, upload.notes)?;

        let mut tx = self.db.begin().await?;
        photos::insert_photo(&mut *tx, &photo, &upload.bytes).await?;
        let verification_reset = verifications::reset_verification(&mut *tx, batch_id).await?;
        tx.commit().await?;
        self.cache.invalidate(batch_id).await;

        info!(batch_id = %batch_id, photo_hash = %photo.content_hash, verification_reset, "Stage-5 photo stored");
        if verification_reset {
            self.verification_reset(&batch, "Stage-5 photo replaced").await;
        }

        Ok(FinalPhotoReceipt {
            photo,
            verification_reset,
        })
    }

    /// Classify a Stage-5 leaf photo and record the outcome
    ///
    /// The photo becomes the batch's current Stage-5 photo. A match stores a
    /// verified record bound to its hash; a mismatch clears verified state.
    pub async fn verify_leaf(
        &self,
        ctx: &AuthContext,
        batch_id: Uuid,
        photo: Vec<u8>,
    ) -> BatchResult<VerificationResult> {
        require(ctx, Role::can_approve_stages, "verify leaves")?;
        if photo.is_empty() {
            return Err(VerificationError::EmptyPhoto.into());
        }

        let _guard = self.locks.acquire(batch_id).await;
        let batch = self.load_fresh(batch_id).await?;
        ensure_mutable(&batch)?;
        check_view(&batch, Stage::FinalVerification)?;

        let mut result = self.gate.verify(batch_id, &photo).await?;
        if result.expected_species.is_none() {
            result.expected_species = Some(batch.species.to_string());
        }

        let record = VerificationRecord {
            batch_id,
            photo_hash: result.photo_hash.clone(),
            is_verified: result.matched,
            predicted_species: result.predicted_species.clone(),
            expected_species: result.expected_species.clone(),
            verified_at: time::now(),
        };
        let photo_record = PhotoRecord {
            photo_id: Uuid::new_v4(),
            batch_id,
            stage: Stage::FinalVerification,
            content_hash: result.photo_hash.clone(),
            size_bytes: photo.len() as i64,
            notes: None,
            uploaded_by: ctx.user_id.clone(),
            uploaded_at: time::now(),
        };

        let mut tx = self.db.begin().await?;
        photos::insert_photo(&mut *tx, &photo_record, &photo).await?;
        verifications::upsert_record(&mut *tx, &record).await?;
        tx.commit().await?;
        self.cache.invalidate(batch_id).await;

        info!(
            batch_id = %batch_id,
            matched = result.matched,
            predicted = %result.predicted_species,
            photo_hash = %result.photo_hash,
            "Leaf verification recorded"
        );
        self.event_bus.emit_lossy(AyuEvent::LeafVerified {
            batch_id,
            matched: result.matched,
            predicted_species: result.predicted_species.clone(),
            photo_hash: result.photo_hash.clone(),
            timestamp: time::now(),
        });
        let (title, message) = if result.matched {
            (
                "Leaf verified",
                format!("Batch {}: leaf identified as {}", batch_id, result.predicted_species),
            )
        } else {
            (
                "Leaf verification failed",
                format!(
                    "Batch {}: leaf identified as {}, expected {}",
                    batch_id,
                    result.predicted_species,
                    result.expected_species.as_deref().unwrap_or("unknown")
                ),
            )
        };
        self.notify(&batch.created_by, NotificationCategory::Verification, title, message)
            .await;

        Ok(result)
    }

    /// Complete Stage 5 and lock the batch
    pub async fn finalize(&self, ctx: &AuthContext, batch_id: Uuid, input: FinalizeInput) -> BatchResult<Batch> {
        require(ctx, Role::can_approve_stages, "finalize batches")?;

        let harvest_date = parse_date(input.harvest_date.as_deref(), "harvestDate")?;
        let final_geotag = input
            .final_geotag
            .as_ref()
            .map(|g| g.parse().map_err(|reason| ValidationError::invalid("finalGeotag", reason)))
            .transpose()?;
        if matches!(&input.photo, Some(bytes) if bytes.is_empty()) {
            return Err(ValidationError::invalid("photo", "photo must not be empty").into());
        }

        let _guard = self.locks.acquire(batch_id).await;
        let batch = self.load_fresh(batch_id).await?;
        ensure_mutable(&batch)?;
        ensure_current(&batch, Stage::FinalVerification)?;

        let new_photo = match &input.photo {
            Some(bytes) => Some(self.photo_record(ctx, &batch, Stage::FinalVerification, bytes, None)?),
            None => None,
        };
        let current_photo_hash = match &new_photo {
            Some(record) => Some(record.content_hash.clone()),
            None => photos::latest_photo(&self.db, batch_id, Stage::FinalVerification)
                .await?
                .map(|(record, bytes)| self.gate.binder().content_hash(&bytes).map(|hash| {
                    if hash != record.content_hash {
                        warn!(batch_id = %batch_id, photo_id = %record.photo_id, "Stored photo hash differs from its content");
                    }
                    hash
                }))
                .transpose()?,
        };

        let evidence = FinalStageEvidence {
            verification: verifications::load_record(&self.db, batch_id).await?,
            current_photo_hash,
            final_quantity: input.final_quantity,
            harvest_date,
            final_geotag,
        };

        let next = match attempt_transition(&batch, Stage::FinalVerification, &TransitionEvidence::Final(evidence)) {
            Ok(next) => next,
            Err(err @ TransitionError::PhotoHashMismatch { .. }) => {
                warn!(batch_id = %batch_id, error = %err, "Final photo does not match the verified photo");
                let mut tx = self.db.begin().await?;
                if let (Some(record), Some(bytes)) = (&new_photo, &input.photo) {
                    photos::insert_photo(&mut *tx, record, bytes).await?;
                }
                let reset = verifications::reset_verification(&mut *tx, batch_id).await?;
                tx.commit().await?;
                self.cache.invalidate(batch_id).await;
                if reset {
                    self.verification_reset(&batch, "final photo differs from the verified photo")
                        .await;
                }
                return Err(err.into());
            }
            Err(err) => {
                warn!(batch_id = %batch_id, error = %err, "Stage-5 completion rejected");
                return Err(err.into());
            }
        };

        let mut tx = self.db.begin().await?;
        if let (Some(record), Some(bytes)) = (&new_photo, &input.photo) {
            photos::insert_photo(&mut *tx, record, bytes).await?;
        }
        let stored = self.commit_transition(&mut tx, ctx, &batch, &next).await?;
        tx.commit().await?;
        self.cache.invalidate(batch_id).await;

        info!(batch_id = %batch_id, actor = %ctx.user_id, "Batch locked");
        self.event_bus.emit_lossy(AyuEvent::BatchLocked {
            batch_id,
            actor: ctx.user_id.clone(),
            timestamp: time::now(),
        });
        self.notify(
            &batch.farmer_id,
            NotificationCategory::Batch,
            "Batch completed",
            format!("Batch {} passed final verification and is now locked", batch_id),
        )
        .await;

        Ok(stored)
    }

    // ========================================
    // Notifications
    // ========================================

    pub async fn notifications(&self, ctx: &AuthContext, limit: i64) -> BatchResult<Vec<Notification>> {
        Ok(notifications::list_for_recipient(&self.db, &ctx.user_id, limit).await?)
    }

    pub async fn mark_notification_read(&self, ctx: &AuthContext, id: Uuid) -> BatchResult<()> {
        if notifications::mark_read(&self.db, id, &ctx.user_id).await? {
            Ok(())
        } else {
            Err(BatchError::Common(ayu_common::Error::NotFound(format!(
                "notification {}",
                id
            ))))
        }
    }

    // ========================================
    // Helpers
    // ========================================

    /// Batch as stored right now, bypassing the cache
    async fn load_fresh(&self, batch_id: Uuid) -> BatchResult<Batch> {
        batches::load_batch(&self.db, batch_id)
            .await?
            .ok_or(BatchError::NotFound(batch_id))
    }

    fn photo_record(
        &self,
        ctx: &AuthContext,
        batch: &Batch,
        stage: Stage,
        bytes: &[u8],
        notes: Option<String>,
    ) -> BatchResult<PhotoRecord> {
        Ok(PhotoRecord {
            photo_id: Uuid::new_v4(),
            batch_id: batch.batch_id,
            stage,
            content_hash: self.gate.binder().content_hash(bytes)?,
            size_bytes: bytes.len() as i64,
            notes: notes.filter(|n| !n.trim().is_empty()),
            uploaded_by: ctx.user_id.clone(),
            uploaded_at: time::now(),
        })
    }

    /// Version-checked batch write plus its audit entry
    async fn commit_transition(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        ctx: &AuthContext,
        before: &Batch,
        next: &Batch,
    ) -> BatchResult<Batch> {
        let stored = batches::update_batch(&mut **tx, next).await.map_err(|e| match e {
            ayu_common::Error::Conflict(_) => BatchError::Conflict(before.batch_id),
            other => BatchError::Common(other),
        })?;

        let record = StageTransitionRecord {
            batch_id: before.batch_id,
            from_stage: before.current_stage,
            to: target_phase(before.current_stage),
            actor: ctx.user_id.clone(),
            role: ctx.role,
            at: time::now(),
        };
        transitions::insert_transition(&mut **tx, &record).await?;
        Ok(stored)
    }

    async fn after_advance(&self, ctx: &AuthContext, before: &Batch, after: &Batch) {
        self.cache.invalidate(after.batch_id).await;

        info!(
            batch_id = %after.batch_id,
            from_stage = before.current_stage.number(),
            to_stage = after.current_stage.number(),
            actor = %ctx.user_id,
            "Batch advanced"
        );
        self.event_bus.emit_lossy(AyuEvent::StageAdvanced {
            batch_id: after.batch_id,
            from_stage: before.current_stage.number(),
            to_stage: after.current_stage.number(),
            actor: ctx.user_id.clone(),
            timestamp: time::now(),
        });
        self.notify(
            &after.farmer_id,
            NotificationCategory::Batch,
            "Stage completed",
            format!(
                "Batch {}: {} completed, now at {}",
                after.batch_id, before.current_stage, after.current_stage
            ),
        )
        .await;
    }

    async fn verification_reset(&self, batch: &Batch, reason: &str) {
        warn!(batch_id = %batch.batch_id, reason, "Leaf verification reset");
        self.event_bus.emit_lossy(AyuEvent::VerificationReset {
            batch_id: batch.batch_id,
            reason: reason.to_string(),
            timestamp: time::now(),
        });
        self.notify(
            &batch.created_by,
            NotificationCategory::Verification,
            "Verification reset",
            format!("Batch {}: {}; verify the leaf again", batch.batch_id, reason),
        )
        .await;
    }

    /// Store and announce a notification
    ///
    /// Runs after the state change committed, so a failure is only logged.
    async fn notify(&self, recipient: &str, category: NotificationCategory, title: &str, message: String) {
        let notification = Notification::new(recipient, category, title, message);
        if let Err(e) = notifications::insert_notification(&self.db, &notification).await {
            warn!(recipient, title, error = %e, "Failed to store notification");
            return;
        }
        self.event_bus.emit_lossy(AyuEvent::NotificationCreated {
            notification_id: notification.id,
            recipient_id: notification.recipient_id,
            title: notification.title,
            timestamp: notification.created_at,
        });
    }
}

fn require(ctx: &AuthContext, allowed: fn(&Role) -> bool, action: &str) -> BatchResult<()> {
    if allowed(&ctx.role) {
        Ok(())
    } else {
        Err(BatchError::Forbidden(format!("role '{}' cannot {}", ctx.role, action)))
    }
}

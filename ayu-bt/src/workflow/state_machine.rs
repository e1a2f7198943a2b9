//! Batch stage state machine
//!
//! All guard logic for the five-stage progression lives in
//! [`attempt_transition`], a pure function over a batch snapshot and the
//! evidence gathered for the requested stage:
//!
//! ```text
//! 1 ──photo stored──▶ 2 ──submitted+approver──▶ 3 ──▶ 4 ──▶ 5 ──verified+hash+fields──▶ locked
//! ```
//!
//! A failed guard returns an error and leaves the batch untouched. Callers are
//! expected to load the batch and evidence from the store of record
//! immediately before calling, and persist the returned batch with a version
//! check.

use ayu_common::auth::Role;
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Batch, BatchPhase, FinalDetails, GeoTag, Stage, VerificationRecord};

/// Guard violations of the stage state machine
///
/// All variants are recoverable and reported to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransitionError {
    #[error("Batch {batch_id} is locked")]
    BatchLocked { batch_id: Uuid },

    #[error("Requested {requested} but batch is at {current}")]
    StageOrderViolation { requested: Stage, current: Stage },

    #[error("{requested} not reached yet (batch is at {current})")]
    StageNotReached { requested: Stage, current: Stage },

    #[error("Cannot complete {stage}: {reason}")]
    InvalidTransition { stage: Stage, reason: String },

    #[error("Photo hash mismatch: verified {verified}, submitted {submitted}")]
    PhotoHashMismatch { verified: String, submitted: String },
}

impl TransitionError {
    pub fn code(&self) -> &'static str {
        match self {
            TransitionError::BatchLocked { .. } => "BATCH_LOCKED",
            TransitionError::StageOrderViolation { .. } => "STAGE_ORDER_VIOLATION",
            TransitionError::StageNotReached { .. } => "STAGE_NOT_REACHED",
            TransitionError::InvalidTransition { .. } => "INVALID_TRANSITION",
            TransitionError::PhotoHashMismatch { .. } => "PHOTO_HASH_MISMATCH",
        }
    }

    fn invalid(stage: Stage, reason: impl Into<String>) -> Self {
        TransitionError::InvalidTransition {
            stage,
            reason: reason.into(),
        }
    }
}

/// Everything the Stage-5 guard looks at
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinalStageEvidence {
    pub verification: Option<VerificationRecord>,
    /// Hash of the photo being submitted, recomputed at submit time
    pub current_photo_hash: Option<String>,
    pub final_quantity: Option<f64>,
    pub harvest_date: Option<NaiveDate>,
    pub final_geotag: Option<GeoTag>,
}

/// Evidence accompanying a transition request, one shape per guard
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionEvidence {
    /// 1 → 2: batch confirmation after the Stage-1 photo upload
    StageOnePhoto { photo_stored: bool },

    /// 2..4 → next: explicit approval of farmer-submitted evidence
    Approval { role: Role, submitted: bool },

    /// 5 → locked
    Final(FinalStageEvidence),
}

/// Fails with `BatchLocked` once the batch is terminal
pub fn ensure_mutable(batch: &Batch) -> Result<(), TransitionError> {
    if batch.locked {
        return Err(TransitionError::BatchLocked {
            batch_id: batch.batch_id,
        });
    }
    Ok(())
}

/// Read-only access check: any stage up to and including the current one
pub fn check_view(batch: &Batch, stage: Stage) -> Result<(), TransitionError> {
    if stage > batch.current_stage {
        return Err(TransitionError::StageNotReached {
            requested: stage,
            current: batch.current_stage,
        });
    }
    Ok(())
}

/// Requested stage must be exactly the current one
pub fn ensure_current(batch: &Batch, requested: Stage) -> Result<(), TransitionError> {
    if requested != batch.current_stage {
        return Err(TransitionError::StageOrderViolation {
            requested,
            current: batch.current_stage,
        });
    }
    Ok(())
}

/// Attempt to complete `requested` on `batch`
///
/// Returns the advanced batch on success. Guards are checked in order: lock,
/// stage order, evidence shape, then the per-stage guard.
pub fn attempt_transition(
    batch: &Batch,
    requested: Stage,
    evidence: &TransitionEvidence,
) -> Result<Batch, TransitionError> {
    ensure_mutable(batch)?;
    ensure_current(batch, requested)?;

    match (requested, evidence) {
        (Stage::Plantation, TransitionEvidence::StageOnePhoto { photo_stored }) => {
            if !photo_stored {
                return Err(TransitionError::invalid(requested, "Stage-1 photo has not been uploaded"));
            }
            Ok(advance(batch, requested))
        }

        (stage, TransitionEvidence::Approval { role, submitted }) if stage.requires_submission() => {
            if !role.can_approve_stages() {
                return Err(TransitionError::invalid(
                    stage,
                    format!("role '{}' cannot approve stages", role),
                ));
            }
            if !submitted {
                return Err(TransitionError::invalid(stage, "farmer has not submitted evidence"));
            }
            Ok(advance(batch, stage))
        }

        (Stage::FinalVerification, TransitionEvidence::Final(final_evidence)) => {
            let details = check_final_guard(final_evidence)?;
            let mut next = batch.clone();
            next.completed_stages.insert(Stage::FinalVerification);
            next.locked = true;
            next.final_details = Some(details);
            Ok(next)
        }

        (stage, _) => Err(TransitionError::invalid(
            stage,
            format!("{} requires {}", stage, expected_evidence(stage)),
        )),
    }
}

/// Phase a successful transition from `from` leads to
pub fn target_phase(from: Stage) -> BatchPhase {
    match from.next() {
        Some(next) => BatchPhase::Active(next),
        None => BatchPhase::Locked,
    }
}

fn advance(batch: &Batch, completed: Stage) -> Batch {
    let mut next = batch.clone();
    next.completed_stages.insert(completed);
    if let Some(stage) = completed.next() {
        next.current_stage = stage;
    }
    next
}

fn expected_evidence(stage: Stage) -> &'static str {
    match stage {
        Stage::Plantation => "the Stage-1 photo upload",
        Stage::Growth | Stage::Health | Stage::PreHarvest => "collector approval",
        Stage::FinalVerification => "final verification evidence",
    }
}

fn check_final_guard(evidence: &FinalStageEvidence) -> Result<FinalDetails, TransitionError> {
    let stage = Stage::FinalVerification;

    let mut missing = Vec::new();
    let quantity = match evidence.final_quantity {
        Some(q) if q.is_finite() && q > 0.0 => Some(q),
        _ => {
            missing.push("final quantity > 0");
            None
        }
    };
    if evidence.harvest_date.is_none() {
        missing.push("harvest date");
    }
    if evidence.final_geotag.is_none() {
        missing.push("final GPS location");
    }
    if evidence.current_photo_hash.is_none() {
        missing.push("final photo");
    }

    let (Some(final_quantity), Some(harvest_date), Some(final_geotag), Some(photo_hash)) = (
        quantity,
        evidence.harvest_date,
        evidence.final_geotag,
        evidence.current_photo_hash.as_ref(),
    ) else {
        return Err(TransitionError::invalid(
            stage,
            format!("missing {}", missing.join(", ")),
        ));
    };

    let record = match &evidence.verification {
        Some(record) if record.is_verified => record,
        _ => return Err(TransitionError::invalid(stage, "leaf verification required")),
    };

    if record.photo_hash != *photo_hash {
        return Err(TransitionError::PhotoHashMismatch {
            verified: record.photo_hash.clone(),
            submitted: photo_hash.clone(),
        });
    }

    Ok(FinalDetails {
        final_quantity,
        harvest_date,
        final_geotag,
        final_photo_hash: photo_hash.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Species;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn batch_at(stage: Stage) -> Batch {
        let now = Utc::now();
        Batch {
            batch_id: Uuid::new_v4(),
            farmer_id: "F-1".to_string(),
            farmer_name: Some("Ravi".to_string()),
            species: Species::Tulsi,
            visit_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            geotag: GeoTag::new(10.0, 20.0).unwrap(),
            estimated_quantity: Some(50.0),
            current_stage: stage,
            completed_stages: Stage::ALL.into_iter().filter(|s| *s < stage).collect(),
            locked: false,
            final_details: None,
            created_by: "C-1".to_string(),
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    fn approval(submitted: bool) -> TransitionEvidence {
        TransitionEvidence::Approval {
            role: Role::Collector,
            submitted,
        }
    }

    fn verified(hash: &str) -> VerificationRecord {
        VerificationRecord {
            batch_id: Uuid::new_v4(),
            photo_hash: hash.to_string(),
            is_verified: true,
            predicted_species: "Tulsi".to_string(),
            expected_species: None,
            verified_at: Utc::now(),
        }
    }

    fn complete_final(hash: &str) -> FinalStageEvidence {
        FinalStageEvidence {
            verification: Some(verified(hash)),
            current_photo_hash: Some(hash.to_string()),
            final_quantity: Some(42.5),
            harvest_date: NaiveDate::from_ymd_opt(2024, 6, 1),
            final_geotag: Some(GeoTag::new(10.1, 20.1).unwrap()),
        }
    }

    #[test]
    fn test_stage_one_requires_photo() {
        let batch = batch_at(Stage::Plantation);

        let err = attempt_transition(
            &batch,
            Stage::Plantation,
            &TransitionEvidence::StageOnePhoto { photo_stored: false },
        )
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");

        let next = attempt_transition(
            &batch,
            Stage::Plantation,
            &TransitionEvidence::StageOnePhoto { photo_stored: true },
        )
        .unwrap();
        assert_eq!(next.current_stage, Stage::Growth);
        assert_eq!(next.completed_stages, BTreeSet::from([Stage::Plantation]));
    }

    #[test]
    fn test_approval_succeeds_iff_submitted_and_current() {
        for stage in [Stage::Growth, Stage::Health, Stage::PreHarvest] {
            let batch = batch_at(stage);

            assert!(matches!(
                attempt_transition(&batch, stage, &approval(false)),
                Err(TransitionError::InvalidTransition { .. })
            ));

            let next = attempt_transition(&batch, stage, &approval(true)).unwrap();
            assert_eq!(Some(next.current_stage), stage.next());
            assert!(next.completed_stages.contains(&stage));
            assert!(!next.locked);
        }
    }

    #[test]
    fn test_approve_stage_three_at_stage_two_is_order_violation() {
        let batch = batch_at(Stage::Growth);
        let before = batch.clone();

        let err = attempt_transition(&batch, Stage::Health, &approval(true)).unwrap_err();
        assert_eq!(
            err,
            TransitionError::StageOrderViolation {
                requested: Stage::Health,
                current: Stage::Growth
            }
        );
        assert_eq!(batch, before);
    }

    #[test]
    fn test_re_approving_past_stage_is_order_violation() {
        let batch = batch_at(Stage::PreHarvest);
        let err = attempt_transition(&batch, Stage::Growth, &approval(true)).unwrap_err();
        assert_eq!(err.code(), "STAGE_ORDER_VIOLATION");
    }

    #[test]
    fn test_farmer_cannot_approve() {
        let batch = batch_at(Stage::Growth);
        let evidence = TransitionEvidence::Approval {
            role: Role::Farmer,
            submitted: true,
        };
        assert!(matches!(
            attempt_transition(&batch, Stage::Growth, &evidence),
            Err(TransitionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_evidence_shape_must_match_stage() {
        let batch = batch_at(Stage::Plantation);
        assert!(matches!(
            attempt_transition(&batch, Stage::Plantation, &approval(true)),
            Err(TransitionError::InvalidTransition { .. })
        ));

        let batch = batch_at(Stage::FinalVerification);
        assert!(matches!(
            attempt_transition(&batch, Stage::FinalVerification, &approval(true)),
            Err(TransitionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_final_transition_locks() {
        let batch = batch_at(Stage::FinalVerification);
        let next = attempt_transition(
            &batch,
            Stage::FinalVerification,
            &TransitionEvidence::Final(complete_final("abc")),
        )
        .unwrap();

        assert!(next.locked);
        assert_eq!(next.phase(), BatchPhase::Locked);
        assert_eq!(next.current_stage, Stage::FinalVerification);
        assert_eq!(next.completed_stages.len(), 5);
        let details = next.final_details.unwrap();
        assert_eq!(details.final_photo_hash, "abc");
        assert_eq!(details.final_quantity, 42.5);
    }

    #[test]
    fn test_final_transition_fails_when_any_requirement_absent() {
        let batch = batch_at(Stage::FinalVerification);
        let run = |evidence: FinalStageEvidence| {
            attempt_transition(&batch, Stage::FinalVerification, &TransitionEvidence::Final(evidence))
        };

        let mut e = complete_final("abc");
        e.final_quantity = None;
        assert!(matches!(run(e), Err(TransitionError::InvalidTransition { .. })));

        let mut e = complete_final("abc");
        e.final_quantity = Some(0.0);
        assert!(matches!(run(e), Err(TransitionError::InvalidTransition { .. })));

        let mut e = complete_final("abc");
        e.harvest_date = None;
        assert!(matches!(run(e), Err(TransitionError::InvalidTransition { .. })));

        let mut e = complete_final("abc");
        e.final_geotag = None;
        assert!(matches!(run(e), Err(TransitionError::InvalidTransition { .. })));

        let mut e = complete_final("abc");
        e.current_photo_hash = None;
        assert!(matches!(run(e), Err(TransitionError::InvalidTransition { .. })));

        let mut e = complete_final("abc");
        e.verification = None;
        assert!(matches!(run(e), Err(TransitionError::InvalidTransition { .. })));

        let mut e = complete_final("abc");
        if let Some(record) = e.verification.as_mut() {
            record.is_verified = false;
        }
        assert!(matches!(run(e), Err(TransitionError::InvalidTransition { .. })));
    }

    #[test]
    fn test_final_transition_rejects_different_photo() {
        let batch = batch_at(Stage::FinalVerification);
        let mut evidence = complete_final("abc");
        evidence.current_photo_hash = Some("def".to_string());

        let err = attempt_transition(
            &batch,
            Stage::FinalVerification,
            &TransitionEvidence::Final(evidence),
        )
        .unwrap_err();
        assert_eq!(
            err,
            TransitionError::PhotoHashMismatch {
                verified: "abc".to_string(),
                submitted: "def".to_string()
            }
        );
    }

    #[test]
    fn test_locked_batch_rejects_everything() {
        let mut batch = batch_at(Stage::FinalVerification);
        batch.locked = true;

        let err = attempt_transition(
            &batch,
            Stage::FinalVerification,
            &TransitionEvidence::Final(complete_final("abc")),
        )
        .unwrap_err();
        assert_eq!(err.code(), "BATCH_LOCKED");
        assert!(ensure_mutable(&batch).is_err());
    }

    #[test]
    fn test_check_view() {
        let batch = batch_at(Stage::Health);
        assert!(check_view(&batch, Stage::Plantation).is_ok());
        assert!(check_view(&batch, Stage::Health).is_ok());
        assert_eq!(
            check_view(&batch, Stage::PreHarvest).unwrap_err().code(),
            "STAGE_NOT_REACHED"
        );
    }

    #[test]
    fn test_stage_is_monotonic_across_full_run() {
        let mut batch = batch_at(Stage::Plantation);
        let mut seen = vec![batch.current_stage];

        batch = attempt_transition(
            &batch,
            Stage::Plantation,
            &TransitionEvidence::StageOnePhoto { photo_stored: true },
        )
        .unwrap();
        seen.push(batch.current_stage);

        for stage in [Stage::Growth, Stage::Health, Stage::PreHarvest] {
            batch = attempt_transition(&batch, stage, &approval(true)).unwrap();
            seen.push(batch.current_stage);
        }

        batch = attempt_transition(
            &batch,
            Stage::FinalVerification,
            &TransitionEvidence::Final(complete_final("abc")),
        )
        .unwrap();
        seen.push(batch.current_stage);

        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert!(batch.locked);
        assert_eq!(target_phase(Stage::PreHarvest), BatchPhase::Active(Stage::FinalVerification));
        assert_eq!(target_phase(Stage::FinalVerification), BatchPhase::Locked);
    }
}

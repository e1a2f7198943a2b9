//! Batch services
//!
//! - `batch_service`: all batch operations, serialized per batch
//! - `leaf_verifier`: species-classification gate for Stage 5
//! - `photo_integrity`: content hashing that binds verification to a photo
//! - `batch_locks` / `batch_cache`: per-batch critical sections and the read cache

pub mod batch_cache;
pub mod batch_locks;
pub mod batch_service;
pub mod leaf_verifier;
pub mod photo_integrity;

pub use batch_service::{
    BatchService, CreatedBatch, FinalPhotoReceipt, FinalizeInput, PhotoUpload, PhotoUploadStatus,
    StageStatus, StageView, SubmissionInput,
};
pub use leaf_verifier::{
    DisabledClassifier, HttpSpeciesClassifier, LeafVerificationGate, RawClassifierResponse,
    SpeciesClassifier, VerificationError,
};
pub use photo_integrity::PhotoIntegrityBinder;

//! Batch workflow: creation, submissions and the stage state machine

pub mod creation;
pub mod state_machine;
pub mod tracker;

pub use creation::{validate_batch_input, BatchInput, ValidatedBatch};
pub use state_machine::{attempt_transition, FinalStageEvidence, TransitionError, TransitionEvidence};
pub use tracker::StageSubmissionTracker;

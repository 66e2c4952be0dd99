//! Requirement-driven artifact synchronisation.
//!
//! Generated artifacts (test files, typically) are kept in sync with a
//! versioned collection of structured requirements. Hand-written code inside
//! the artifacts' custom regions survives regeneration.

pub mod domain;
pub use domain::{
    Config, Fingerprint, Requirement, RequirementId, Severity, Strategy, SyncReport,
    compute_fingerprint, detect_changes,
};

/// Artifact parsing, state persistence and the update engine.
pub mod storage;
pub use storage::{ParsedArtifact, StateStore, parse_artifact, update_artifact};

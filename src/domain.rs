//! Domain models for requirement synchronisation.
//!
//! Everything in here is pure: requirement records, their fingerprints, the
//! change detector, merge strategies and configuration. Filesystem and text
//! handling live in [`crate::storage`].

/// Requirement records, as produced by the upstream extractor.
pub mod requirement;
pub use requirement::{
    Attribute, Bounds, Constraint, ConstraintKind, Requirement, RequirementId, ScalarType,
};

/// Content fingerprints.
pub mod fingerprint;
pub use fingerprint::{Fingerprint, compute_fingerprint, compute_fingerprint_at};

/// Change detection and sync reports.
pub mod change;
pub use change::{ChangeRecord, ChangedField, Severity, SyncReport, detect_changes};

mod strategy;
pub use strategy::{Plan, Strategy, UnknownStrategy};

mod config;
pub use config::Config;

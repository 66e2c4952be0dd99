/// Backups and atomic writes.
pub mod atomic;
mod batch;
/// Requirement collection documents.
pub mod collection;
mod generated;
/// The artifact region grammar.
pub mod region;
mod state;
mod update;

pub use atomic::{WriteFailure, WriteStage};
pub use batch::{ArtifactJob, BatchReport, PendingUpdate, SyncFailures, plan_jobs, sync_batch};
pub use collection::{Collection, CollectionLoadError, load_collection};
pub use generated::{GeneratedEntry, GeneratedIndex, find_artifacts};
pub use region::{
    ArtifactMetadata, Markers, ParseError, ParsedArtifact, ProtectedRegion, RegionKind,
    parse_artifact,
};
pub use state::{
    ArtifactRecord, CorruptionCause, FingerprintHashes, MissingArtifactError, RebuildReport,
    RequirementRecord, SkippedArtifact, StateCorruptionError, StateStore, SyncState,
};
pub use update::{
    ArtifactOutcome, ConflictError, FailureCause, Merge, Target, UpdateError, Updater,
    VersionChange, merge, update_artifact,
};

//! Persistent tracking of which requirement versions live in which artifacts.
//!
//! The state file is the single source of truth for the sync engine. It is
//! only mutated after an artifact has been written, saved atomically, and can
//! always be reconstructed from the metadata blocks in the artifacts
//! themselves (see [`StateStore::rebuild`]).

use std::{
    collections::{BTreeMap, BTreeSet},
    fs, io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    domain::{Fingerprint, RequirementId},
    storage::{
        atomic::{WriteFailure, WriteStage, write_atomic},
        region::Markers,
    },
};

/// What is known about one requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementRecord {
    /// Content hash of the version written to the artifact.
    pub content_hash: String,
    /// The version written to the artifact.
    pub version: u32,
    /// The artifact holding the requirement's group.
    pub artifact_path: PathBuf,
    /// Whether the group's custom regions hold user code.
    pub has_custom_code: bool,
    /// When the group was generated.
    pub last_updated: DateTime<Utc>,
    /// The remaining fingerprint hashes. Absent for records recovered by
    /// [`StateStore::rebuild`], since artifacts only carry the content hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<FingerprintHashes>,
}

/// The projection hashes of a recorded [`Fingerprint`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintHashes {
    /// Hash of the name and documentation fields.
    pub metadata_hash: String,
    /// Hash of the attribute and constraint shape.
    pub structure_hash: String,
    /// Hash of everything but the documentation.
    pub body_hash: String,
}

impl From<&Fingerprint> for FingerprintHashes {
    fn from(fingerprint: &Fingerprint) -> Self {
        Self {
            metadata_hash: fingerprint.metadata_hash.clone(),
            structure_hash: fingerprint.structure_hash.clone(),
            body_hash: fingerprint.body_hash.clone(),
        }
    }
}

/// What is known about one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Requirements with a group in the artifact, sorted.
    pub requirement_ids: Vec<RequirementId>,
    /// Most recent generation of any of its groups.
    pub last_generated: DateTime<Utc>,
    /// Whether any of its groups holds user code.
    pub has_custom_code: bool,
}

/// The full persisted state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct SyncState {
    /// Per-requirement records.
    pub per_requirement: BTreeMap<RequirementId, RequirementRecord>,
    /// Per-artifact records.
    pub per_artifact: BTreeMap<PathBuf, ArtifactRecord>,
    /// When the last sync completed.
    pub last_sync: Option<DateTime<Utc>>,
    /// Number of completed syncs.
    pub sync_count: u64,
}

impl SyncState {
    /// Checks the cross references between the two maps.
    fn validate(&self) -> Result<(), String> {
        for (id, record) in &self.per_requirement {
            if record.version == 0 {
                return Err(format!("{id} has version 0"));
            }
            let listed = self
                .per_artifact
                .get(&record.artifact_path)
                .is_some_and(|a| a.requirement_ids.contains(id));
            if !listed {
                return Err(format!(
                    "{id} is not listed by its artifact {}",
                    record.artifact_path.display()
                ));
            }
        }

        for (path, artifact) in &self.per_artifact {
            for id in &artifact.requirement_ids {
                let owned = self
                    .per_requirement
                    .get(id)
                    .is_some_and(|r| &r.artifact_path == path);
                if !owned {
                    return Err(format!("{} lists unknown requirement {id}", path.display()));
                }
            }
        }

        Ok(())
    }

    fn refresh_artifact(&mut self, path: &Path) {
        let Some(artifact) = self.per_artifact.get_mut(path) else {
            return;
        };
        if artifact.requirement_ids.is_empty() {
            self.per_artifact.remove(path);
            return;
        }
        artifact.has_custom_code = artifact
            .requirement_ids
            .iter()
            .filter_map(|id| self.per_requirement.get(id))
            .any(|r| r.has_custom_code);
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default)]
        last_sync: Option<DateTime<Utc>>,
        #[serde(default)]
        sync_count: u64,
        #[serde(default)]
        per_requirement: BTreeMap<RequirementId, RequirementRecord>,
        #[serde(default)]
        per_artifact: BTreeMap<PathBuf, ArtifactRecord>,
    },
}

impl From<Versions> for SyncState {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                last_sync,
                sync_count,
                per_requirement,
                per_artifact,
            } => Self {
                per_requirement,
                per_artifact,
                last_sync,
                sync_count,
            },
        }
    }
}

impl From<SyncState> for Versions {
    fn from(state: SyncState) -> Self {
        Self::V1 {
            last_sync: state.last_sync,
            sync_count: state.sync_count,
            per_requirement: state.per_requirement,
            per_artifact: state.per_artifact,
        }
    }
}

/// Why a state file could not be used.
#[derive(Debug, thiserror::Error)]
pub enum CorruptionCause {
    /// The file could not be read.
    #[error("unreadable: {0}")]
    Io(#[from] io::Error),
    /// The file is not valid JSON for the state schema.
    #[error("malformed: {0}")]
    Json(#[from] serde_json::Error),
    /// The file parsed but its records contradict each other.
    #[error("inconsistent: {0}")]
    Schema(String),
}

/// The persisted state could not be loaded.
///
/// This is recoverable: the store has already been reset to an empty state,
/// and the bad file moved aside to `quarantined_to` when possible. Callers
/// normally follow up with [`StateStore::rebuild`].
#[derive(Debug, thiserror::Error)]
#[error("sync state {} is corrupt ({cause})", path.display())]
pub struct StateCorruptionError {
    /// The state file.
    pub path: PathBuf,
    /// Where the bad file was moved, if the move succeeded.
    pub quarantined_to: Option<PathBuf>,
    /// What was wrong with it.
    #[source]
    pub cause: CorruptionCause,
}

/// The state references an artifact that no longer exists.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("artifact {} for {requirement_id} is missing", path.display())]
pub struct MissingArtifactError {
    /// The missing artifact.
    pub path: PathBuf,
    /// A requirement the state places in it.
    pub requirement_id: RequirementId,
}

/// An artifact that [`StateStore::rebuild`] could not use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedArtifact {
    /// The artifact.
    pub path: PathBuf,
    /// Why it was skipped.
    pub reason: String,
}

/// Summary of a rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Artifacts read and parsed.
    pub scanned: usize,
    /// Requirements recovered.
    pub requirements: usize,
    /// Artifacts that could not be read or parsed.
    pub skipped: Vec<SkippedArtifact>,
}

/// Loads, mutates and saves the sync state at one location.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    state: SyncState,
}

impl StateStore {
    /// An empty store persisted at `path`. Nothing is read until
    /// [`StateStore::load`].
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: SyncState::default(),
        }
    }

    /// The state file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current in-memory state.
    #[must_use]
    pub const fn state(&self) -> &SyncState {
        &self.state
    }

    /// Reads the state file.
    ///
    /// A missing file is an empty state.
    ///
    /// # Errors
    ///
    /// If the file is unreadable, malformed or inconsistent, the store is
    /// reset to an empty state, the file is moved aside, and a
    /// [`StateCorruptionError`] is returned.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn load(&mut self) -> Result<(), StateCorruptionError> {
        if !self.path.exists() {
            tracing::debug!("no state file, starting empty");
            self.state = SyncState::default();
            return Ok(());
        }

        match self.read() {
            Ok(state) => {
                tracing::debug!(
                    requirements = state.per_requirement.len(),
                    artifacts = state.per_artifact.len(),
                    "loaded sync state"
                );
                self.state = state;
                Ok(())
            }
            Err(cause) => {
                self.state = SyncState::default();
                let quarantined_to = self.quarantine();
                tracing::warn!(
                    "sync state {} is corrupt ({cause}); moved to {}",
                    self.path.display(),
                    quarantined_to
                        .as_ref()
                        .map_or_else(|| "<nowhere>".to_string(), |p| p.display().to_string())
                );
                Err(StateCorruptionError {
                    path: self.path.clone(),
                    quarantined_to,
                    cause,
                })
            }
        }
    }

    fn read(&self) -> Result<SyncState, CorruptionCause> {
        let content = fs::read_to_string(&self.path)?;
        let state: SyncState = serde_json::from_str(&content)?;
        state.validate().map_err(CorruptionCause::Schema)?;
        Ok(state)
    }

    fn quarantine(&self) -> Option<PathBuf> {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S%.3f")));
        let destination = PathBuf::from(name);
        fs::rename(&self.path, &destination)
            .map_err(|e| tracing::warn!("failed to quarantine {}: {e}", self.path.display()))
            .ok()?;
        Some(destination)
    }

    /// Writes the state file atomically.
    ///
    /// # Errors
    ///
    /// Returns a [`WriteFailure`] if the file cannot be written. The previous
    /// file, if any, is left intact.
    pub fn save(&self) -> Result<(), WriteFailure> {
        let json = serde_json::to_string_pretty(&self.state).map_err(|e| WriteFailure {
            path: self.path.clone(),
            stage: WriteStage::Write,
            source: io::Error::other(e),
        })?;
        write_atomic(&self.path, &(json + "\n"))
    }

    /// Records that `fingerprint` of `id` has been written to
    /// `artifact_path`.
    ///
    /// Call this only after the write has succeeded. A requirement that moved
    /// to a different artifact is removed from its old one.
    pub fn record(
        &mut self,
        id: &RequirementId,
        fingerprint: &Fingerprint,
        artifact_path: &Path,
        has_custom_code: bool,
    ) {
        let previous = self.state.per_requirement.insert(
            id.clone(),
            RequirementRecord {
                content_hash: fingerprint.content_hash.clone(),
                version: fingerprint.version,
                artifact_path: artifact_path.to_path_buf(),
                has_custom_code,
                last_updated: fingerprint.timestamp,
                fingerprint: Some(fingerprint.into()),
            },
        );

        if let Some(previous) = previous.filter(|p| p.artifact_path != artifact_path) {
            if let Some(old) = self.state.per_artifact.get_mut(&previous.artifact_path) {
                old.requirement_ids.retain(|other| other != id);
            }
            self.state.refresh_artifact(&previous.artifact_path);
        }

        let artifact = self
            .state
            .per_artifact
            .entry(artifact_path.to_path_buf())
            .or_insert_with(|| ArtifactRecord {
                requirement_ids: Vec::new(),
                last_generated: fingerprint.timestamp,
                has_custom_code: false,
            });
        if let Err(index) = artifact.requirement_ids.binary_search(id) {
            artifact.requirement_ids.insert(index, id.clone());
        }
        artifact.last_generated = artifact.last_generated.max(fingerprint.timestamp);
        self.state.refresh_artifact(artifact_path);

        tracing::debug!(
            "recorded {id} v{} in {}",
            fingerprint.version,
            artifact_path.display()
        );
    }

    /// Removes a requirement from the state. Returns `false` if it was not
    /// tracked.
    pub fn forget(&mut self, id: &RequirementId) -> bool {
        let Some(record) = self.state.per_requirement.remove(id) else {
            return false;
        };
        if let Some(artifact) = self.state.per_artifact.get_mut(&record.artifact_path) {
            artifact.requirement_ids.retain(|other| other != id);
        }
        self.state.refresh_artifact(&record.artifact_path);
        true
    }

    /// Notes that a sync run has completed.
    pub fn mark_synced(&mut self) {
        self.state.last_sync = Some(Utc::now());
        self.state.sync_count += 1;
    }

    /// The record of a requirement.
    #[must_use]
    pub fn requirement(&self, id: &RequirementId) -> Option<&RequirementRecord> {
        self.state.per_requirement.get(id)
    }

    /// The record of an artifact.
    #[must_use]
    pub fn artifact(&self, path: &Path) -> Option<&ArtifactRecord> {
        self.state.per_artifact.get(path)
    }

    /// The recorded version of a requirement.
    #[must_use]
    pub fn version_of(&self, id: &RequirementId) -> Option<u32> {
        self.requirement(id).map(|r| r.version)
    }

    /// The recorded `(content_hash, version)` of a requirement, as taken by
    /// [`Fingerprint::versioned_against`].
    #[must_use]
    pub fn previous(&self, id: &RequirementId) -> Option<(&str, u32)> {
        self.requirement(id)
            .map(|r| (r.content_hash.as_str(), r.version))
    }

    /// Requirements with a group in the artifact.
    #[must_use]
    pub fn requirements_in(&self, path: &Path) -> &[RequirementId] {
        self.artifact(path)
            .map_or(&[], |a| a.requirement_ids.as_slice())
    }

    /// Tracked requirements that are not in `current`.
    #[must_use]
    pub fn stale_requirements(&self, current: &BTreeSet<RequirementId>) -> Vec<RequirementId> {
        self.state
            .per_requirement
            .keys()
            .filter(|id| !current.contains(*id))
            .cloned()
            .collect()
    }

    /// Records whose artifact no longer exists on disk.
    #[must_use]
    pub fn missing_artifacts(&self) -> Vec<MissingArtifactError> {
        self.state
            .per_requirement
            .iter()
            .filter(|(_, r)| !r.artifact_path.exists())
            .map(|(id, r)| MissingArtifactError {
                path: r.artifact_path.clone(),
                requirement_id: id.clone(),
            })
            .collect()
    }

    /// Reconstructs the per-requirement and per-artifact records from the
    /// metadata blocks in `artifacts`.
    ///
    /// When a requirement appears in several artifacts, the most recently
    /// generated group wins (the higher version on a tie). Artifacts that
    /// cannot be read or parsed are skipped with a warning.
    #[instrument(skip_all)]
    pub fn rebuild<P: AsRef<Path>>(
        &mut self,
        artifacts: impl IntoIterator<Item = P>,
        markers: &Markers,
    ) -> RebuildReport {
        let mut report = RebuildReport::default();
        let mut winners: BTreeMap<RequirementId, RequirementRecord> = BTreeMap::new();

        for path in artifacts {
            let path = path.as_ref();
            let parsed = fs::read_to_string(path)
                .map_err(|e| e.to_string())
                .and_then(|text| markers.parse(&text).map_err(|e| e.to_string()));
            let parsed = match parsed {
                Ok(parsed) => parsed,
                Err(reason) => {
                    tracing::warn!("skipping {} during rebuild: {reason}", path.display());
                    report.skipped.push(SkippedArtifact {
                        path: path.to_path_buf(),
                        reason,
                    });
                    continue;
                }
            };
            report.scanned += 1;

            let modified = modified_time(path);
            for group in parsed.groups() {
                let meta = &group.metadata.metadata;
                let candidate = RequirementRecord {
                    content_hash: meta.content_hash.clone(),
                    version: meta.version,
                    artifact_path: path.to_path_buf(),
                    has_custom_code: group.has_custom_code(markers),
                    last_updated: parse_timestamp(&meta.generated_at).unwrap_or(modified),
                    fingerprint: None,
                };

                let newer = winners.get(&meta.requirement_id).is_none_or(|current| {
                    (candidate.last_updated, candidate.version)
                        > (current.last_updated, current.version)
                });
                if newer {
                    winners.insert(meta.requirement_id.clone(), candidate);
                }
            }
        }

        let mut per_artifact: BTreeMap<PathBuf, ArtifactRecord> = BTreeMap::new();
        for (id, record) in &winners {
            let artifact = per_artifact
                .entry(record.artifact_path.clone())
                .or_insert_with(|| ArtifactRecord {
                    requirement_ids: Vec::new(),
                    last_generated: record.last_updated,
                    has_custom_code: false,
                });
            artifact.requirement_ids.push(id.clone());
            artifact.last_generated = artifact.last_generated.max(record.last_updated);
            artifact.has_custom_code |= record.has_custom_code;
        }

        report.requirements = winners.len();
        self.state.per_requirement = winners;
        self.state.per_artifact = per_artifact;

        tracing::info!(
            scanned = report.scanned,
            requirements = report.requirements,
            skipped = report.skipped.len(),
            "rebuilt sync state from artifacts"
        );
        report
    }
}

fn modified_time(path: &Path) -> DateTime<Utc> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map_or(DateTime::<Utc>::UNIX_EPOCH, DateTime::<Utc>::from)
}

/// Parses an RFC 3339 timestamp, or a naive ISO 8601 one taken as UTC.
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|t| t.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use test_case::test_case;

    use super::*;
    use crate::{
        domain::{Requirement, compute_fingerprint_at},
        storage::region::ArtifactMetadata,
    };

    fn id(s: &str) -> RequirementId {
        s.parse().unwrap()
    }

    fn fingerprint(name: &str, version: u32, hour: u32) -> Fingerprint {
        let at = Utc.with_ymd_and_hms(2025, 10, 7, hour, 0, 0).unwrap();
        let mut print = compute_fingerprint_at(&Requirement::new(id(name), name), at);
        print.version = version;
        print
    }

    fn write_artifact(path: &Path, groups: &[(&str, u32, u32, Option<&str>)]) {
        let markers = Markers::default();
        let mut text = String::from("import pytest\n\n");
        for (name, version, hour, custom) in groups {
            let requirement = Requirement::new(id(name), *name);
            let print = fingerprint(name, *version, *hour);
            let meta = ArtifactMetadata::new(&requirement, &print, "0.1.0");
            text.push_str(&markers.render_group(&meta, "def test_it():\n", *custom));
            text.push('\n');
        }
        fs::write(path, text).unwrap();
    }

    #[test]
    fn missing_file_is_empty_state() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = StateStore::new(tmp.path().join("state.json"));
        store.load().unwrap();
        assert!(store.state().per_requirement.is_empty());
    }

    #[test]
    fn save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(".resync/state.json");
        let artifact = tmp.path().join("test_a.py");

        let mut store = StateStore::new(&path);
        store.record(&id("REQ-1"), &fingerprint("REQ-1", 2, 1), &artifact, true);
        store.mark_synced();
        store.save().unwrap();

        let mut loaded = StateStore::new(&path);
        loaded.load().unwrap();
        assert_eq!(loaded.state(), store.state());
        assert_eq!(loaded.state().sync_count, 1);
        let hashes = loaded.requirement(&id("REQ-1")).unwrap().fingerprint.as_ref().unwrap();
        assert_eq!(hashes.body_hash, fingerprint("REQ-1", 2, 1).body_hash);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"_version\": \"1\""));
    }

    #[test_case("{ not json" ; "malformed json")]
    #[test_case(r#"{"_version": "1", "per_requirement": {"REQ-1": {"content_hash": "x", "version": 1, "artifact_path": "a.py", "has_custom_code": false, "last_updated": "2025-10-07T00:00:00Z"}}}"# ; "unlisted requirement")]
    #[test_case(r#"{"_version": "9"}"# ; "unknown version")]
    fn corrupt_state_is_quarantined(content: &str) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        fs::write(&path, content).unwrap();

        let mut store = StateStore::new(&path);
        let err = store.load().unwrap_err();

        let quarantined = err.quarantined_to.expect("file should have been moved");
        assert!(!path.exists());
        assert_eq!(fs::read_to_string(quarantined).unwrap(), content);
        assert!(store.state().per_requirement.is_empty());
    }

    #[test]
    fn record_moves_requirement_between_artifacts() {
        let mut store = StateStore::new("state.json");
        let (a, b) = (Path::new("a.py"), Path::new("b.py"));

        store.record(&id("REQ-1"), &fingerprint("REQ-1", 1, 1), a, true);
        store.record(&id("REQ-2"), &fingerprint("REQ-2", 1, 1), a, false);
        assert!(store.artifact(a).unwrap().has_custom_code);

        store.record(&id("REQ-1"), &fingerprint("REQ-1", 2, 2), b, true);

        assert_eq!(store.requirements_in(a), &[id("REQ-2")]);
        assert!(!store.artifact(a).unwrap().has_custom_code);
        assert_eq!(store.requirements_in(b), &[id("REQ-1")]);
        assert_eq!(store.version_of(&id("REQ-1")), Some(2));
        assert!(store.state().validate().is_ok());
    }

    #[test]
    fn forget_drops_empty_artifacts() {
        let mut store = StateStore::new("state.json");
        store.record(&id("REQ-1"), &fingerprint("REQ-1", 1, 1), Path::new("a.py"), false);

        assert!(store.forget(&id("REQ-1")));
        assert!(!store.forget(&id("REQ-1")));
        assert!(store.state().per_artifact.is_empty());
    }

    #[test]
    fn stale_requirements_are_those_no_longer_present() {
        let mut store = StateStore::new("state.json");
        for name in ["REQ-1", "REQ-2", "REQ-3"] {
            store.record(&id(name), &fingerprint(name, 1, 1), Path::new("a.py"), false);
        }
        let current = BTreeSet::from([id("REQ-2")]);
        assert_eq!(store.stale_requirements(&current), vec![id("REQ-1"), id("REQ-3")]);
    }

    #[test]
    fn rebuild_recovers_records() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("test_a.py");
        let b = tmp.path().join("test_b.py");
        write_artifact(&a, &[("REQ-1", 3, 1, Some("        assert True\n")), ("REQ-2", 1, 1, None)]);
        write_artifact(&b, &[("REQ-3", 2, 1, None)]);

        let mut store = StateStore::new(tmp.path().join("state.json"));
        let report = store.rebuild([&a, &b], &Markers::default());

        assert_eq!(report.scanned, 2);
        assert_eq!(report.requirements, 3);
        let record = store.requirement(&id("REQ-1")).unwrap();
        assert_eq!(record.version, 3);
        assert!(record.has_custom_code);
        assert_eq!(record.artifact_path, a);
        assert!(record.fingerprint.is_none());
        assert!(store.artifact(&a).unwrap().has_custom_code);
        assert!(!store.artifact(&b).unwrap().has_custom_code);
        assert!(store.state().validate().is_ok());
    }

    #[test]
    fn rebuild_prefers_most_recent_group() {
        let tmp = tempfile::tempdir().unwrap();
        let old = tmp.path().join("test_old.py");
        let new = tmp.path().join("test_new.py");
        write_artifact(&old, &[("REQ-1", 5, 1, None)]);
        write_artifact(&new, &[("REQ-1", 4, 9, None)]);

        let mut store = StateStore::new(tmp.path().join("state.json"));
        store.rebuild([&old, &new], &Markers::default());

        assert_eq!(store.requirement(&id("REQ-1")).unwrap().artifact_path, new);
        assert!(store.artifact(&old).is_none());
    }

    #[test]
    fn rebuild_skips_unparseable_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let bad = tmp.path().join("test_bad.py");
        fs::write(&bad, "# SYSML2PYTEST-CUSTOM-START\n").unwrap();
        let missing = tmp.path().join("test_missing.py");

        let mut store = StateStore::new(tmp.path().join("state.json"));
        let report = store.rebuild([&bad, &missing], &Markers::default());

        assert_eq!(report.scanned, 0);
        assert_eq!(report.skipped.len(), 2);
    }

    #[test]
    fn missing_artifacts_are_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = StateStore::new(tmp.path().join("state.json"));
        let gone = tmp.path().join("gone.py");
        store.record(&id("REQ-1"), &fingerprint("REQ-1", 1, 1), &gone, false);

        let missing = store.missing_artifacts();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].path, gone);
    }

    #[test_case("2025-10-07T12:00:00+00:00", 12 ; "rfc3339")]
    #[test_case("2025-10-07T14:00:00+02:00", 12 ; "offset")]
    #[test_case("2025-10-07T12:00:00.123456", 12 ; "naive")]
    fn timestamps_parse_as_utc(text: &str, hour: u32) {
        use chrono::Timelike;
        assert_eq!(parse_timestamp(text).unwrap().hour(), hour);
    }

    #[test]
    fn garbage_timestamp_is_none() {
        assert!(parse_timestamp("yesterday").is_none());
    }
}

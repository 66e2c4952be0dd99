//! Reconciling existing artifacts with freshly generated text.
//!
//! [`update_artifact`] is pure: it decides what the new artifact text is and
//! where it should go. [`Updater`] carries out that decision on disk, with a
//! backup first and an atomic write.

use std::{
    collections::BTreeMap,
    fmt, io,
    path::{Path, PathBuf},
};

use chrono::Utc;

use crate::{
    domain::{Config, Plan, RequirementId, Severity, Strategy},
    storage::{
        atomic::{WriteFailure, backup, sibling_path, write_atomic},
        region::{Markers, ParseError, ParsedArtifact, RegionKind, Segment},
    },
};

/// Where merged text should be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Over the existing artifact.
    Original,
    /// To the side-by-side sibling path; the original is left alone.
    Sibling,
}

/// The outcome of merging one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merge {
    /// The text to write.
    pub text: String,
    /// Where to write it.
    pub target: Target,
    /// The strategy that produced `text`. Never [`Strategy::Hybrid`].
    pub strategy_used: Strategy,
    /// The reason a surgical merge was abandoned, if it was.
    pub conflict: Option<UpdateError>,
}

/// Existing and generated region layouts that cannot be aligned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "cannot merge {requirement_id}: existing regions [{}] do not match generated regions [{}]",
    kinds(existing),
    kinds(generated)
)]
pub struct ConflictError {
    /// The requirement whose group could not be merged.
    pub requirement_id: RequirementId,
    /// Region kinds of the existing group.
    pub existing: Vec<RegionKind>,
    /// Region kinds of the generated group.
    pub generated: Vec<RegionKind>,
}

fn kinds(kinds: &[RegionKind]) -> String {
    kinds
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Why an artifact could not be merged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpdateError {
    /// The artifact on disk does not follow the region grammar.
    #[error("existing artifact does not parse: {0}")]
    Existing(ParseError),

    /// The generated text does not follow the region grammar.
    #[error("generated text does not parse: {0}")]
    Generated(ParseError),

    /// Regions could not be aligned.
    #[error(transparent)]
    Conflict(#[from] ConflictError),
}

/// Merges freshly generated text into an existing artifact, using the default
/// markers.
///
/// # Errors
///
/// See [`merge`].
pub fn update_artifact(
    existing: Option<&str>,
    generated: &str,
    severity: Severity,
    strategy: Strategy,
) -> Result<Merge, UpdateError> {
    merge(existing, generated, severity, strategy, &Markers::default())
}

/// Merges freshly generated text into an existing artifact.
///
/// `existing` is `None` for an artifact that does not exist yet, in which case
/// the generated text is used as is.
///
/// # Errors
///
/// - [`UpdateError::Generated`] if the generated text is malformed, whatever
///   the strategy
/// - [`UpdateError::Existing`] or [`UpdateError::Conflict`] for an explicit
///   [`Strategy::Surgical`] merge that cannot proceed. Under
///   [`Strategy::Hybrid`] these degrade to a side-by-side [`Merge`] carrying
///   the error in `conflict`.
pub fn merge(
    existing: Option<&str>,
    generated: &str,
    severity: Severity,
    strategy: Strategy,
    markers: &Markers,
) -> Result<Merge, UpdateError> {
    let fresh = markers.parse(generated).map_err(UpdateError::Generated)?;

    let Some(existing) = existing else {
        return Ok(Merge::regenerate(generated));
    };

    let old = match markers.parse(existing) {
        Ok(old) => old,
        Err(e) => {
            return match strategy {
                Strategy::FullRegen => Ok(Merge::regenerate(generated)),
                Strategy::SideBySide => Ok(Merge::side_by_side(generated, None)),
                Strategy::Surgical => Err(UpdateError::Existing(e)),
                Strategy::Hybrid => {
                    tracing::warn!("existing artifact does not parse, writing side by side: {e}");
                    Ok(Merge::side_by_side(generated, Some(UpdateError::Existing(e))))
                }
            };
        }
    };

    let has_custom_code = old.has_custom_code();
    match strategy.plan(severity, has_custom_code, true) {
        Plan::FullRegen => {
            if has_custom_code {
                tracing::warn!("regenerating artifact discards its custom code");
            }
            Ok(Merge::regenerate(generated))
        }
        Plan::SideBySide => Ok(Merge::side_by_side(generated, None)),
        Plan::Surgical { fallback } => match surgical(old, &fresh) {
            Ok(text) => Ok(Merge {
                text,
                target: Target::Original,
                strategy_used: Strategy::Surgical,
                conflict: None,
            }),
            Err(conflict) if fallback => {
                tracing::warn!("{conflict}; writing side by side");
                Ok(Merge::side_by_side(generated, Some(conflict.into())))
            }
            Err(conflict) => Err(conflict.into()),
        },
    }
}

impl Merge {
    fn regenerate(generated: &str) -> Self {
        Self {
            text: generated.to_string(),
            target: Target::Original,
            strategy_used: Strategy::FullRegen,
            conflict: None,
        }
    }

    fn side_by_side(generated: &str, conflict: Option<UpdateError>) -> Self {
        Self {
            text: generated.to_string(),
            target: Target::Sibling,
            strategy_used: Strategy::SideBySide,
            conflict,
        }
    }
}

/// Region-aligned merge of every group in `fresh` into `old`.
///
/// Within a group present in both, metadata and generated regions come from
/// `fresh`, custom regions keep the bodies from `old`, and filler between
/// regions stays as it was. Groups only in `fresh` are appended. Everything
/// else in `old` is untouched.
fn surgical(old: ParsedArtifact, fresh: &ParsedArtifact) -> Result<String, ConflictError> {
    let mut replacements: BTreeMap<usize, Vec<Segment>> = BTreeMap::new();
    let mut appended = Vec::new();

    for new_group in fresh.groups() {
        let Some(old_group) = old.group(new_group.id()) else {
            appended.push(new_group.render());
            continue;
        };

        let existing = old_group.kind_sequence();
        let generated = new_group.kind_sequence();
        if existing != generated {
            return Err(ConflictError {
                requirement_id: new_group.id().clone(),
                existing,
                generated,
            });
        }

        let mut new_regions = new_group.regions();
        let merged = old_group
            .segments
            .iter()
            .map(|segment| match segment {
                Segment::Filler(_) => segment.clone(),
                Segment::Metadata(_) => Segment::Metadata(new_group.metadata.clone()),
                Segment::Region(old_region) => {
                    let Some(new_region) = new_regions.next() else {
                        return segment.clone();
                    };
                    match old_region.kind {
                        RegionKind::Generated => Segment::Region(new_region.clone()),
                        RegionKind::Custom => {
                            Segment::Region(new_region.with_body(&old_region.raw_text))
                        }
                    }
                }
            })
            .collect();

        replacements.insert(old_group.index_range().start, merged);
        tracing::debug!("merged {} surgically", new_group.id());
    }

    let markers = old.markers().clone();
    let group_ends: BTreeMap<usize, usize> = old
        .groups()
        .iter()
        .map(|g| (g.index_range().start, g.index_range().end))
        .collect();

    let segments = old.into_segments();
    let mut merged = Vec::with_capacity(segments.len());
    let mut index = 0;
    while index < segments.len() {
        match (replacements.remove(&index), group_ends.get(&index)) {
            (Some(replacement), Some(&end)) => {
                merged.extend(replacement);
                index = end;
            }
            _ => {
                merged.push(segments[index].clone());
                index += 1;
            }
        }
    }

    let mut text = ParsedArtifact::from_segments(merged, markers).render();
    for group in appended {
        if !text.is_empty() {
            if !text.ends_with('\n') {
                text.push('\n');
            }
            if !text.ends_with("\n\n") {
                text.push('\n');
            }
        }
        text.push_str(&group);
    }
    Ok(text)
}

/// What happened to one artifact.
#[derive(Debug)]
pub enum ArtifactOutcome {
    /// The artifact was overwritten.
    Written {
        /// The artifact.
        path: PathBuf,
        /// The strategy that produced the text.
        strategy_used: Strategy,
        /// The backup taken before the write, if any.
        backup: Option<PathBuf>,
        /// Whether each group in the written text holds custom code.
        custom_code: BTreeMap<RequirementId, bool>,
        /// Lines of user code carried over from the existing artifact.
        preserved_lines: usize,
        /// Lines of generated regions written from the generator's output.
        updated_lines: usize,
        /// Groups whose version differs from the existing artifact.
        versions: Vec<VersionChange>,
    },

    /// The generated text was written next to the artifact.
    SideBySide {
        /// The artifact, left untouched.
        path: PathBuf,
        /// Where the generated text went.
        sibling: PathBuf,
        /// Why a merge was not possible, if one was attempted.
        conflict: Option<UpdateError>,
    },

    /// Nothing was written (dry run).
    Preview {
        /// The artifact.
        path: PathBuf,
        /// What would have been written.
        merge: Merge,
    },

    /// The artifact could not be updated. It is unchanged on disk.
    Failed {
        /// The artifact.
        path: PathBuf,
        /// Why.
        cause: FailureCause,
    },
}

impl ArtifactOutcome {
    /// The artifact this outcome is about.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Written { path, .. }
            | Self::SideBySide { path, .. }
            | Self::Preview { path, .. }
            | Self::Failed { path, .. } => path,
        }
    }

    /// Whether a conflict was surfaced.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        match self {
            Self::SideBySide { conflict, .. } => conflict.is_some(),
            Self::Preview { merge, .. } => merge.conflict.is_some(),
            Self::Failed {
                cause: FailureCause::Update(UpdateError::Conflict(_) | UpdateError::Existing(_)),
                ..
            } => true,
            _ => false,
        }
    }

    /// Whether the update failed.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// A group whose metadata version changed in a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionChange {
    /// The requirement.
    pub requirement_id: RequirementId,
    /// The version in the existing artifact, `None` for a new group.
    pub old: Option<u32>,
    /// The version written.
    pub new: u32,
}

impl fmt::Display for VersionChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.old {
            Some(old) => write!(f, "{}: v{old} -> v{}", self.requirement_id, self.new),
            None => write!(f, "{}: new at v{}", self.requirement_id, self.new),
        }
    }
}

/// Why an artifact update failed.
#[derive(Debug, thiserror::Error)]
pub enum FailureCause {
    /// The existing artifact could not be read.
    #[error("failed to read artifact: {0}")]
    Read(#[source] io::Error),

    /// The texts could not be merged.
    #[error(transparent)]
    Update(#[from] UpdateError),

    /// The backup or the write failed.
    #[error(transparent)]
    Write(#[from] WriteFailure),
}

/// Applies merges to the filesystem.
#[derive(Debug, Clone)]
pub struct Updater {
    backup_dir: Option<PathBuf>,
    sibling_suffix: String,
    markers: Markers,
    dry_run: bool,
}

impl Updater {
    /// An updater configured from `config`, whose paths should already be
    /// resolved against the workspace root.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            backup_dir: config.create_backups.then(|| config.backup_dir.clone()),
            sibling_suffix: config.sibling_suffix.clone(),
            markers: Markers::from_config(config),
            dry_run: false,
        }
    }

    /// Disables backups.
    #[must_use]
    pub fn without_backups(mut self) -> Self {
        self.backup_dir = None;
        self
    }

    /// Computes merges without writing anything.
    #[must_use]
    pub const fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// The markers artifacts are parsed with.
    #[must_use]
    pub const fn markers(&self) -> &Markers {
        &self.markers
    }

    /// Merges `generated` into the artifact at `path` and writes the result.
    ///
    /// Writes to the original path are preceded by a backup of the existing
    /// file. Nothing is written if the backup fails. This never panics or
    /// returns early: every failure becomes [`ArtifactOutcome::Failed`].
    pub fn apply(
        &self,
        path: &Path,
        existing: Option<&str>,
        generated: &str,
        severity: Severity,
        strategy: Strategy,
    ) -> ArtifactOutcome {
        let failed = |cause: FailureCause| ArtifactOutcome::Failed {
            path: path.to_path_buf(),
            cause,
        };

        let merge = match merge(existing, generated, severity, strategy, &self.markers) {
            Ok(merge) => merge,
            Err(e) => return failed(e.into()),
        };

        if self.dry_run {
            return ArtifactOutcome::Preview {
                path: path.to_path_buf(),
                merge,
            };
        }

        match merge.target {
            Target::Sibling => {
                let sibling = sibling_path(path, &self.sibling_suffix);
                if let Err(e) = write_atomic(&sibling, &merge.text) {
                    return failed(e.into());
                }
                tracing::info!("wrote {}", sibling.display());
                ArtifactOutcome::SideBySide {
                    path: path.to_path_buf(),
                    sibling,
                    conflict: merge.conflict,
                }
            }
            Target::Original => {
                let backup = match (&self.backup_dir, existing) {
                    (Some(dir), Some(_)) => match backup(path, dir, Utc::now()) {
                        Ok(backup) => Some(backup),
                        Err(e) => return failed(e.into()),
                    },
                    _ => None,
                };

                if let Err(e) = write_atomic(path, &merge.text) {
                    return failed(e.into());
                }
                tracing::info!("wrote {} ({})", path.display(), merge.strategy_used);

                let summary = self.summarize(existing, generated, &merge);
                ArtifactOutcome::Written {
                    path: path.to_path_buf(),
                    strategy_used: merge.strategy_used,
                    backup,
                    custom_code: summary.custom_code,
                    preserved_lines: summary.preserved_lines,
                    updated_lines: summary.updated_lines,
                    versions: summary.versions,
                }
            }
        }
    }

    /// Describes a merge that was written over the original artifact.
    fn summarize(&self, existing: Option<&str>, generated: &str, merge: &Merge) -> Summary {
        let markers = &self.markers;
        // merge has already parsed these
        let (Ok(written), Ok(fresh)) = (markers.parse(&merge.text), markers.parse(generated))
        else {
            return Summary::default();
        };
        let old = existing.and_then(|text| markers.parse(text).ok());

        let preserved_lines = if merge.strategy_used == Strategy::Surgical {
            written
                .regions()
                .filter(|r| r.has_custom_code(markers))
                .map(|r| r.raw_text.lines().count())
                .sum()
        } else {
            0
        };
        let updated_lines = fresh
            .regions()
            .filter(|r| r.kind == RegionKind::Generated)
            .map(|r| r.raw_text.lines().count())
            .sum();

        let groups = written.groups();
        let versions = groups
            .iter()
            .filter_map(|group| {
                let new = group.metadata.metadata.version;
                let previous = old
                    .as_ref()
                    .and_then(|old| old.group(group.id()))
                    .map(|g| g.metadata.metadata.version);
                (previous != Some(new)).then(|| VersionChange {
                    requirement_id: group.id().clone(),
                    old: previous,
                    new,
                })
            })
            .collect();

        Summary {
            custom_code: groups
                .iter()
                .map(|g| (g.id().clone(), g.has_custom_code(markers)))
                .collect(),
            preserved_lines,
            updated_lines,
            versions,
        }
    }
}

#[derive(Debug, Default)]
struct Summary {
    custom_code: BTreeMap<RequirementId, bool>,
    preserved_lines: usize,
    updated_lines: usize,
    versions: Vec<VersionChange>,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Original => f.write_str("original"),
            Self::Sibling => f.write_str("sibling"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use test_case::test_case;

    use super::*;
    use crate::storage::region::parse_artifact;

    fn group(id: &str, version: u32, generated: &str, custom: &str) -> String {
        format!(
            "\
# SYSML2PYTEST-METADATA-START
# requirement_id: {id}
# content_hash: hash-{id}-{version}
# version: {version}
# SYSML2PYTEST-METADATA-END
# SYSML2PYTEST-GENERATED-START
{generated}# SYSML2PYTEST-GENERATED-END
    # SYSML2PYTEST-CUSTOM-START
{custom}    # SYSML2PYTEST-CUSTOM-END
"
        )
    }

    const PLACEHOLDER: &str = "    # Add custom test logic here\n";
    const USER_CODE: &str = "    # SYSML2PYTEST-CUSTOM-END is only a marker on its own line\n    assert plant(height).blooms()\n";

    fn old_artifact() -> String {
        format!(
            "import pytest\n\n{}\n# helper kept by hand\n",
            group(
                "REQ-001",
                1,
                "@given(height=st.integers(min_value=150, max_value=200))\ndef test_tree_height(height):\n",
                USER_CODE
            )
        )
    }

    fn new_generated() -> String {
        format!(
            "import pytest\n\n{}",
            group(
                "REQ-001",
                2,
                "@given(height=st.integers(min_value=140, max_value=200))\ndef test_tree_height(height):\n",
                PLACEHOLDER
            )
        )
    }

    #[test]
    fn surgical_keeps_custom_bytes_and_takes_new_generated() {
        let merge = update_artifact(
            Some(&old_artifact()),
            &new_generated(),
            Severity::Moderate,
            Strategy::Surgical,
        )
        .unwrap();

        assert_eq!(merge.target, Target::Original);
        assert_eq!(merge.strategy_used, Strategy::Surgical);
        assert!(merge.text.contains(USER_CODE));
        assert!(merge.text.contains("min_value=140"));
        assert!(!merge.text.contains("min_value=150"));
        assert!(merge.text.contains("# version: 2\n"));
        assert!(merge.text.contains("# helper kept by hand\n"));
        assert!(!merge.text.contains(PLACEHOLDER));

        let parsed = parse_artifact(&merge.text).unwrap();
        assert_eq!(parsed.regions().count(), 2);
    }

    #[test]
    fn full_regen_discards_custom_code() {
        let merge = update_artifact(
            Some(&old_artifact()),
            &new_generated(),
            Severity::Moderate,
            Strategy::FullRegen,
        )
        .unwrap();

        assert_eq!(merge.text, new_generated());
        assert!(!merge.text.contains("blooms"));
    }

    #[test]
    fn side_by_side_targets_sibling() {
        let merge = update_artifact(
            Some(&old_artifact()),
            &new_generated(),
            Severity::Minor,
            Strategy::SideBySide,
        )
        .unwrap();

        assert_eq!(merge.target, Target::Sibling);
        assert_eq!(merge.text, new_generated());
        assert!(merge.conflict.is_none());
    }

    fn without_custom_region() -> String {
        let text = old_artifact();
        let start = text.find("    # SYSML2PYTEST-CUSTOM-START").unwrap();
        let end = text.find("    # SYSML2PYTEST-CUSTOM-END\n").unwrap()
            + "    # SYSML2PYTEST-CUSTOM-END\n".len();
        let mut text = text[..start].to_string() + &text[end..];
        text.push_str("    assert True\n");
        text
    }

    #[test]
    fn surgical_reports_conflict_on_region_mismatch() {
        let err = update_artifact(
            Some(&without_custom_region()),
            &new_generated(),
            Severity::Moderate,
            Strategy::Surgical,
        )
        .unwrap_err();

        match err {
            UpdateError::Conflict(conflict) => {
                assert_eq!(conflict.requirement_id.as_str(), "REQ-001");
                assert_eq!(conflict.existing, vec![RegionKind::Generated]);
                assert_eq!(
                    conflict.generated,
                    vec![RegionKind::Generated, RegionKind::Custom]
                );
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn hybrid_falls_back_to_sibling_on_conflict() {
        // custom code outside any region does not count, so give the old
        // artifact a second group with real custom code
        let old = without_custom_region() + "\n" + &group("REQ-002", 1, "def test_b():\n", USER_CODE);

        let merge =
            update_artifact(Some(&old), &new_generated(), Severity::Moderate, Strategy::Hybrid)
                .unwrap();

        assert_eq!(merge.target, Target::Sibling);
        assert!(matches!(merge.conflict, Some(UpdateError::Conflict(_))));
    }

    #[test_case(Severity::None, Target::Original, Strategy::Surgical ; "unchanged merges")]
    #[test_case(Severity::Minor, Target::Original, Strategy::Surgical ; "minor merges")]
    #[test_case(Severity::Moderate, Target::Original, Strategy::Surgical ; "moderate merges")]
    #[test_case(Severity::Major, Target::Sibling, Strategy::SideBySide ; "major goes side by side")]
    fn hybrid_with_custom_code(severity: Severity, target: Target, used: Strategy) {
        let merge =
            update_artifact(Some(&old_artifact()), &new_generated(), severity, Strategy::Hybrid)
                .unwrap();
        assert_eq!(merge.target, target);
        assert_eq!(merge.strategy_used, used);
        assert!(merge.conflict.is_none());
    }

    #[test]
    fn hybrid_without_custom_code_regenerates() {
        let old = group("REQ-001", 1, "def test_tree_height():\n", PLACEHOLDER);
        let merge =
            update_artifact(Some(&old), &new_generated(), Severity::Major, Strategy::Hybrid)
                .unwrap();
        assert_eq!(merge.strategy_used, Strategy::FullRegen);
        assert_eq!(merge.text, new_generated());
    }

    #[test]
    fn hybrid_sends_unparseable_artifact_to_sibling() {
        let broken = "# SYSML2PYTEST-CUSTOM-START\nuser code\n";
        let merge =
            update_artifact(Some(broken), &new_generated(), Severity::Minor, Strategy::Hybrid)
                .unwrap();
        assert_eq!(merge.target, Target::Sibling);
        assert!(matches!(merge.conflict, Some(UpdateError::Existing(_))));
    }

    #[test]
    fn malformed_generated_text_is_an_error() {
        let err = update_artifact(None, "# SYSML2PYTEST-GENERATED-END\n", Severity::Major, Strategy::FullRegen)
            .unwrap_err();
        assert!(matches!(err, UpdateError::Generated(_)));
    }

    #[test]
    fn new_artifact_is_generated_text() {
        let merge = update_artifact(None, &new_generated(), Severity::Major, Strategy::SideBySide)
            .unwrap();
        assert_eq!(merge.target, Target::Original);
        assert_eq!(merge.text, new_generated());
    }

    #[test]
    fn surgical_appends_new_groups_and_keeps_others() {
        let old = old_artifact() + "\n" + &group("REQ-003", 1, "def test_c():\n", USER_CODE);
        let generated = new_generated() + "\n" + &group("REQ-002", 1, "def test_b():\n", PLACEHOLDER);

        let merge =
            update_artifact(Some(&old), &generated, Severity::Moderate, Strategy::Surgical).unwrap();

        let parsed = parse_artifact(&merge.text).unwrap();
        let ids: Vec<_> = parsed.requirement_ids().iter().map(ToString::to_string).collect();
        assert_eq!(ids, ["REQ-001", "REQ-003", "REQ-002"]);
        assert!(merge.text.contains("def test_c():\n"));
        assert!(merge.text.contains("min_value=140"));
    }

    #[test]
    fn updater_backs_up_before_overwriting() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test_tree.py");
        fs::write(&path, old_artifact()).unwrap();

        let config = Config {
            backup_dir: tmp.path().join("backups"),
            ..Config::default()
        };
        let outcome = Updater::new(&config).apply(
            &path,
            Some(&old_artifact()),
            &new_generated(),
            Severity::Moderate,
            Strategy::Hybrid,
        );

        let ArtifactOutcome::Written {
            backup: Some(backup),
            custom_code,
            ..
        } = outcome
        else {
            panic!("expected a write with a backup, got {outcome:?}");
        };
        assert_eq!(fs::read_to_string(backup).unwrap(), old_artifact());
        assert!(fs::read_to_string(&path).unwrap().contains("min_value=140"));
        assert_eq!(custom_code.get(&"REQ-001".parse::<RequirementId>().unwrap()), Some(&true));
    }

    #[test]
    fn surgical_write_reports_lines_and_versions() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test_tree.py");
        fs::write(&path, old_artifact()).unwrap();

        let outcome = Updater::new(&Config::default()).without_backups().apply(
            &path,
            Some(&old_artifact()),
            &new_generated(),
            Severity::Moderate,
            Strategy::Surgical,
        );

        let ArtifactOutcome::Written {
            preserved_lines,
            updated_lines,
            versions,
            ..
        } = outcome
        else {
            panic!("expected a write, got {outcome:?}");
        };
        assert_eq!(preserved_lines, USER_CODE.lines().count());
        assert_eq!(updated_lines, 2);
        assert_eq!(
            versions,
            [VersionChange {
                requirement_id: "REQ-001".parse().unwrap(),
                old: Some(1),
                new: 2,
            }]
        );
        assert_eq!(versions[0].to_string(), "REQ-001: v1 -> v2");
    }

    #[test]
    fn regenerated_write_preserves_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test_tree.py");

        let outcome = Updater::new(&Config::default()).without_backups().apply(
            &path,
            None,
            &new_generated(),
            Severity::Major,
            Strategy::Hybrid,
        );

        let ArtifactOutcome::Written {
            preserved_lines,
            updated_lines,
            versions,
            ..
        } = outcome
        else {
            panic!("expected a write, got {outcome:?}");
        };
        assert_eq!(preserved_lines, 0);
        assert_eq!(updated_lines, 2);
        assert_eq!(versions[0].old, None);
        assert_eq!(versions[0].to_string(), "REQ-001: new at v2");
    }

    #[test]
    fn updater_writes_sibling_without_touching_original() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test_tree.py");
        fs::write(&path, old_artifact()).unwrap();

        let outcome = Updater::new(&Config::default()).without_backups().apply(
            &path,
            Some(&old_artifact()),
            &new_generated(),
            Severity::Major,
            Strategy::Hybrid,
        );

        let ArtifactOutcome::SideBySide { sibling, .. } = outcome else {
            panic!("expected side by side, got {outcome:?}");
        };
        assert_eq!(sibling, tmp.path().join("test_tree.py.new"));
        assert_eq!(fs::read_to_string(&path).unwrap(), old_artifact());
        assert_eq!(fs::read_to_string(sibling).unwrap(), new_generated());
    }

    #[test]
    fn dry_run_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test_tree.py");

        let outcome = Updater::new(&Config::default()).dry_run(true).apply(
            &path,
            None,
            &new_generated(),
            Severity::Major,
            Strategy::Hybrid,
        );

        assert!(matches!(outcome, ArtifactOutcome::Preview { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn failed_write_leaves_artifact_and_reports() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, "x").unwrap();
        let path = blocker.join("test_tree.py");

        let outcome = Updater::new(&Config::default()).without_backups().apply(
            &path,
            None,
            &new_generated(),
            Severity::Major,
            Strategy::Hybrid,
        );

        assert!(outcome.is_failure());
        assert!(matches!(
            outcome,
            ArtifactOutcome::Failed {
                cause: FailureCause::Write(_),
                ..
            }
        ));
    }
}

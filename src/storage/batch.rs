//! Applying a batch of requirement updates across many artifacts.

use std::{
    collections::BTreeMap,
    fmt, fs, io,
    path::{Path, PathBuf},
};

use nonempty::NonEmpty;
use rayon::prelude::*;
use tracing::instrument;

use crate::{
    domain::{Fingerprint, RequirementId, Severity, Strategy, SyncReport, compute_fingerprint},
    storage::{
        collection::Collection,
        generated::GeneratedIndex,
        state::{MissingArtifactError, StateStore},
        update::{ArtifactOutcome, FailureCause, UpdateError, Updater},
    },
};

/// One requirement whose group in an artifact needs updating.
#[derive(Debug, Clone)]
pub struct PendingUpdate {
    /// The new fingerprint, already versioned against the stored state.
    pub fingerprint: Fingerprint,
    /// How far the requirement changed.
    pub severity: Severity,
}

impl PendingUpdate {
    /// The requirement being updated.
    #[must_use]
    pub const fn id(&self) -> &RequirementId {
        &self.fingerprint.requirement_id
    }
}

/// All the pending updates for one artifact.
///
/// The updates are applied together in one read-modify-write cycle.
#[derive(Debug, Clone)]
pub struct ArtifactJob {
    /// The artifact on disk.
    pub path: PathBuf,
    /// Freshly generated text for the whole artifact.
    pub generated: String,
    /// The requirements in `generated` that changed.
    pub pending: Vec<PendingUpdate>,
}

impl ArtifactJob {
    /// The largest severity among the pending updates.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.pending
            .iter()
            .map(|p| p.severity)
            .max()
            .unwrap_or(Severity::None)
    }

    fn fingerprint(&self, id: &RequirementId) -> Option<&Fingerprint> {
        self.pending
            .iter()
            .find(|p| p.id() == id)
            .map(|p| &p.fingerprint)
    }
}

/// The result of [`sync_batch`].
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One outcome per artifact, in job order.
    pub outcomes: Vec<ArtifactOutcome>,
    /// Artifacts the state referred to that were missing and regenerated.
    pub missing: Vec<MissingArtifactError>,
    /// How many requirement records were written to the state.
    pub recorded: usize,
}

impl BatchReport {
    /// Outcomes that surfaced a conflict.
    pub fn conflicts(&self) -> impl Iterator<Item = &ArtifactOutcome> {
        self.outcomes.iter().filter(|o| o.is_conflict())
    }

    /// Whether any outcome surfaced a conflict.
    #[must_use]
    pub fn has_conflicts(&self) -> bool {
        self.conflicts().next().is_some()
    }

    /// Custom lines preserved and generated lines updated, summed over every
    /// written artifact.
    #[must_use]
    pub fn line_totals(&self) -> (usize, usize) {
        self.outcomes
            .iter()
            .fold((0, 0), |(preserved, updated), outcome| match outcome {
                ArtifactOutcome::Written {
                    preserved_lines,
                    updated_lines,
                    ..
                } => (preserved + preserved_lines, updated + updated_lines),
                _ => (preserved, updated),
            })
    }

    /// Outcomes written to a side-by-side sibling.
    pub fn side_by_side(&self) -> impl Iterator<Item = &ArtifactOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ArtifactOutcome::SideBySide { .. }))
    }

    /// Collects the failed artifacts.
    ///
    /// # Errors
    ///
    /// Returns a [`SyncFailures`] if any artifact could not be updated.
    pub fn failures(&self) -> Result<(), SyncFailures> {
        let failures = self
            .outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                ArtifactOutcome::Failed { path, cause } => Some((path.clone(), cause.to_string())),
                _ => None,
            })
            .collect();

        NonEmpty::from_vec(failures).map_or(Ok(()), |failures| Err(SyncFailures { failures }))
    }
}

/// Artifacts that could not be updated, with the reason for each.
#[derive(Debug, thiserror::Error)]
pub struct SyncFailures {
    failures: NonEmpty<(PathBuf, String)>,
}

impl SyncFailures {
    /// The failed artifacts and their reasons.
    pub fn iter(&self) -> impl Iterator<Item = &(PathBuf, String)> {
        self.failures.iter()
    }
}

impl fmt::Display for SyncFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MAX_DISPLAY: usize = 5;

        write!(f, "failed to update artifacts: ")?;

        let total = self.failures.len();

        let displayed_paths: Vec<String> = self
            .failures
            .iter()
            .take(MAX_DISPLAY)
            .map(|(p, _reason)| p.display().to_string())
            .collect();

        let msg = displayed_paths.join(", ");

        if total <= MAX_DISPLAY {
            write!(f, "{msg}")
        } else {
            write!(f, "{msg}... (and {} more)", total - MAX_DISPLAY)
        }
    }
}

/// Groups the requirements whose artifacts need rewriting into one job per
/// artifact.
///
/// Added and modified requirements in `report` are scheduled at their change
/// severity. Every artifact the state refers to that is gone from disk is
/// scheduled as well, with its requirements at [`Severity::None`], so it is
/// regenerated even when nothing upstream changed. Requirements that are not
/// in `requirements` are left out, as are those without generated text (with a
/// warning).
#[instrument(skip_all, fields(output_dir = %output_dir.display()))]
pub fn plan_jobs(
    report: &SyncReport,
    requirements: &Collection,
    index: &GeneratedIndex,
    state: &StateStore,
    output_dir: &Path,
) -> Vec<ArtifactJob> {
    let missing = state.missing_artifacts();
    let changed = report
        .pending()
        .map(|id| (id, report.severity_of(id).unwrap_or_default()));
    let recovered = missing.iter().map(|m| (&m.requirement_id, Severity::None));

    let mut pending: BTreeMap<PathBuf, Vec<PendingUpdate>> = BTreeMap::new();
    for (id, severity) in changed.chain(recovered) {
        let Some(requirement) = requirements.get(id) else {
            continue;
        };
        let Some(entry) = index.get(id) else {
            tracing::warn!("no generated text for {id}; skipping");
            continue;
        };

        let updates = pending.entry(entry.path.clone()).or_default();
        if updates.iter().any(|p| p.id() == id) {
            continue;
        }
        updates.push(PendingUpdate {
            fingerprint: compute_fingerprint(requirement).versioned_against(state.previous(id)),
            severity,
        });
    }

    pending
        .into_iter()
        .filter_map(|(relative, pending)| {
            let generated = index.file(&relative)?.to_string();
            Some(ArtifactJob {
                path: output_dir.join(relative),
                generated,
                pending,
            })
        })
        .collect()
}

/// Updates every artifact in `jobs` and records the written requirements in
/// `state`.
///
/// Artifacts are processed in parallel. A failure on one artifact never stops
/// the others. State records are applied afterwards, one at a time, and only
/// for artifacts whose write succeeded. `on_done` is called once per artifact
/// as it finishes, from whichever thread processed it.
///
/// The state is not saved; that is left to the caller.
#[instrument(skip_all, fields(artifacts = jobs.len(), %strategy))]
pub fn sync_batch<F>(
    updater: &Updater,
    state: &mut StateStore,
    jobs: &[ArtifactJob],
    strategy: Strategy,
    on_done: F,
) -> BatchReport
where
    F: Fn(&ArtifactOutcome) + Sync,
{
    let results: Vec<(ArtifactOutcome, Vec<MissingArtifactError>)> = {
        let state = &*state;
        jobs.par_iter()
            .map(|job| {
                let result = process(updater, state, job, strategy);
                on_done(&result.0);
                result
            })
            .collect()
    };

    let mut report = BatchReport::default();
    for (job, (outcome, missing)) in jobs.iter().zip(results) {
        if let ArtifactOutcome::Written {
            path, custom_code, ..
        } = &outcome
        {
            for pending in &job.pending {
                let has_custom_code = custom_code.get(pending.id()).copied().unwrap_or(false);
                state.record(pending.id(), &pending.fingerprint, path, has_custom_code);
                report.recorded += 1;
            }
        }
        report.missing.extend(missing);
        report.outcomes.push(outcome);
    }
    report
}

fn process(
    updater: &Updater,
    state: &StateStore,
    job: &ArtifactJob,
    strategy: Strategy,
) -> (ArtifactOutcome, Vec<MissingArtifactError>) {
    let failed = |cause: FailureCause| ArtifactOutcome::Failed {
        path: job.path.clone(),
        cause,
    };

    let mut missing = Vec::new();
    let existing = match fs::read_to_string(&job.path) {
        Ok(text) => Some(text),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            missing = missing_from_state(state, &job.path);
            for error in &missing {
                tracing::warn!("{error}; regenerating from scratch");
            }
            None
        }
        Err(e) => return (failed(FailureCause::Read(e)), missing),
    };

    let generated = match stamp(updater, state, job) {
        Ok(generated) => generated,
        Err(e) => return (failed(e.into()), missing),
    };

    let outcome = updater.apply(
        &job.path,
        existing.as_deref(),
        &generated,
        job.severity(),
        strategy,
    );
    (outcome, missing)
}

fn missing_from_state(state: &StateStore, path: &Path) -> Vec<MissingArtifactError> {
    state
        .requirements_in(path)
        .iter()
        .map(|id| MissingArtifactError {
            path: path.to_path_buf(),
            requirement_id: id.clone(),
        })
        .collect()
}

/// Writes the fingerprint of each group into its metadata block.
///
/// Pending requirements get their new fingerprint. Other requirements keep
/// what the state last recorded for them.
fn stamp(updater: &Updater, state: &StateStore, job: &ArtifactJob) -> Result<String, UpdateError> {
    let mut parsed = updater
        .markers()
        .parse(&job.generated)
        .map_err(UpdateError::Generated)?;

    for id in parsed.requirement_ids() {
        if let Some(fingerprint) = job.fingerprint(&id) {
            parsed.stamp(
                &id,
                &fingerprint.content_hash,
                fingerprint.version,
                &fingerprint.timestamp.to_rfc3339(),
            );
        } else if let Some(record) = state.requirement(&id) {
            parsed.stamp(
                &id,
                &record.content_hash,
                record.version,
                &record.last_updated.to_rfc3339(),
            );
        }
    }

    Ok(parsed.render())
}

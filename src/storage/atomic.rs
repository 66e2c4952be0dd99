//! Backups and crash-safe file writes.

use std::{
    ffi::OsString,
    fmt, fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};

/// The step of a write that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStage {
    /// Creating the parent or backup directory.
    CreateDir,
    /// Copying the existing file to its backup.
    Backup,
    /// Creating the temporary file next to the destination.
    CreateTemp,
    /// Writing and syncing the temporary file.
    Write,
    /// Renaming the temporary file over the destination.
    Persist,
}

impl fmt::Display for WriteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CreateDir => "create directory",
            Self::Backup => "back up",
            Self::CreateTemp => "create temporary file",
            Self::Write => "write",
            Self::Persist => "rename into place",
        })
    }
}

/// An I/O failure while writing a file.
///
/// The destination is either untouched or fully replaced; a failed write
/// never leaves it half-written.
#[derive(Debug, thiserror::Error)]
#[error("failed to {stage} {}: {source}", path.display())]
pub struct WriteFailure {
    /// The file being written (or backed up).
    pub path: PathBuf,
    /// Which step failed.
    pub stage: WriteStage,
    /// The underlying error.
    #[source]
    pub source: io::Error,
}

impl WriteFailure {
    fn new(path: &Path, stage: WriteStage) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self {
            path: path.to_path_buf(),
            stage,
            source,
        }
    }
}

/// Writes `contents` to `path` atomically.
///
/// The data goes to a temporary file in the same directory, which is synced
/// and then renamed over the destination. Missing parent directories are
/// created.
///
/// # Errors
///
/// Returns a [`WriteFailure`] naming the stage that failed.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), WriteFailure> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(WriteFailure::new(parent, WriteStage::CreateDir))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .map_err(WriteFailure::new(path, WriteStage::CreateTemp))?;

    temp.as_file_mut()
        .write_all(contents.as_bytes())
        .and_then(|()| temp.as_file().sync_all())
        .map_err(WriteFailure::new(path, WriteStage::Write))?;

    temp.persist(path)
        .map_err(|e| WriteFailure::new(path, WriteStage::Persist)(e.error))?;

    tracing::debug!(path = %path.display(), bytes = contents.len(), "wrote file");
    Ok(())
}

/// Copies `path` into `backup_dir` as `<file name>.backup.<timestamp>`.
///
/// # Errors
///
/// Returns a [`WriteFailure`] if the directory cannot be created or the copy
/// fails.
pub fn backup(path: &Path, backup_dir: &Path, at: DateTime<Utc>) -> Result<PathBuf, WriteFailure> {
    fs::create_dir_all(backup_dir).map_err(WriteFailure::new(backup_dir, WriteStage::CreateDir))?;

    let mut name = path.file_name().map_or_else(OsString::new, ToOwned::to_owned);
    name.push(format!(".backup.{}", at.format("%Y%m%dT%H%M%S%.3f")));
    let destination = backup_dir.join(name);

    fs::copy(path, &destination).map_err(WriteFailure::new(path, WriteStage::Backup))?;

    tracing::info!(
        "backed up {} to {}",
        path.display(),
        destination.display()
    );
    Ok(destination)
}

/// The side-by-side path for an artifact: `<path>.<suffix>`.
#[must_use]
pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn write_creates_parents_and_replaces_content() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/dir/test_req.py");

        write_atomic(&path, "first\n").unwrap();
        write_atomic(&path, "second\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second\n");
        // no temporary files left behind
        let entries = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn write_into_a_file_path_fails_without_touching_it() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, "keep").unwrap();

        let err = write_atomic(&blocker.join("child.py"), "x").unwrap_err();
        assert_eq!(err.stage, WriteStage::CreateDir);
        assert_eq!(fs::read_to_string(&blocker).unwrap(), "keep");
    }

    #[test]
    fn backup_is_timestamped_copy() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test_req.py");
        fs::write(&path, "original").unwrap();
        let at = Utc.with_ymd_and_hms(2025, 10, 7, 12, 30, 5).unwrap();

        let backup = backup(&path, &tmp.path().join("backups"), at).unwrap();

        assert_eq!(
            backup.file_name().unwrap(),
            "test_req.py.backup.20251007T123005.000"
        );
        assert_eq!(fs::read_to_string(backup).unwrap(), "original");
    }

    #[test]
    fn backup_of_missing_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = backup(&tmp.path().join("gone.py"), tmp.path(), Utc::now()).unwrap_err();
        assert_eq!(err.stage, WriteStage::Backup);
    }

    #[test]
    fn sibling_appends_suffix() {
        assert_eq!(
            sibling_path(Path::new("tests/test_req.py"), "new"),
            PathBuf::from("tests/test_req.py.new")
        );
    }
}

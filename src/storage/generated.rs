//! Freshly rendered artifacts, as written by the external generator.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use walkdir::WalkDir;

use crate::{domain::RequirementId, storage::region::Markers};

/// Files under `dir` with the given extension, sorted by path.
#[must_use]
pub fn find_artifacts(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| path.extension().is_some_and(|ext| ext == extension))
        .collect();
    paths.sort();
    paths
}

/// Where a requirement's generated group lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedEntry {
    /// Path of the artifact, relative to the scanned directory.
    pub path: PathBuf,
    /// The text of the requirement's group.
    pub group: String,
}

/// Index of a directory of generated artifacts by requirement id.
#[derive(Debug, Default)]
pub struct GeneratedIndex {
    entries: BTreeMap<RequirementId, GeneratedEntry>,
    files: BTreeMap<PathBuf, String>,
}

impl GeneratedIndex {
    /// Scans `dir` recursively for files with the given extension.
    ///
    /// Files that cannot be read or parsed are skipped with a warning. If a
    /// requirement id appears in more than one file, the first file (in path
    /// order) wins.
    #[must_use]
    pub fn scan(dir: &Path, extension: &str, markers: &Markers) -> Self {
        let mut index = Self::default();

        for path in find_artifacts(dir, extension) {
            let relative = path.strip_prefix(dir).unwrap_or(&path).to_path_buf();
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("skipping {}: {e}", path.display());
                    continue;
                }
            };
            let parsed = match markers.parse(&text) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!("skipping {}: {e}", path.display());
                    continue;
                }
            };

            for group in parsed.groups() {
                if let Some(existing) = index.entries.get(group.id()) {
                    tracing::warn!(
                        "{} is generated in both {} and {}; using the first",
                        group.id(),
                        existing.path.display(),
                        relative.display()
                    );
                    continue;
                }
                index.entries.insert(
                    group.id().clone(),
                    GeneratedEntry {
                        path: relative.clone(),
                        group: group.render(),
                    },
                );
            }
            index.files.insert(relative, text);
        }

        tracing::debug!(
            "indexed {} requirements in {} generated files",
            index.entries.len(),
            index.files.len()
        );
        index
    }

    /// The generated group of a requirement.
    #[must_use]
    pub fn get(&self, id: &RequirementId) -> Option<&GeneratedEntry> {
        self.entries.get(id)
    }

    /// The full generated text of a file, by relative path.
    #[must_use]
    pub fn file(&self, path: &Path) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// All indexed requirement ids.
    pub fn ids(&self) -> impl Iterator<Item = &RequirementId> {
        self.entries.keys()
    }

    /// Whether nothing was indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

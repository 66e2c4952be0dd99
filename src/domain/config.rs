use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::strategy::Strategy;

/// Configuration for a sync workspace.
///
/// Relative paths are resolved against the workspace root by
/// [`Config::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct Config {
    /// Where the sync state is persisted.
    pub state_file: PathBuf,

    /// Where backups of overwritten artifacts are kept.
    pub backup_dir: PathBuf,

    /// Whether to back up an artifact before overwriting it.
    pub create_backups: bool,

    /// The strategy used when none is given on the command line.
    pub default_strategy: Strategy,

    /// Suffix appended to an artifact path for side-by-side output.
    ///
    /// For example, `test_req.py` is written to `test_req.py.new`.
    pub sibling_suffix: String,

    /// File extension of artifacts, without the dot.
    pub artifact_extension: String,

    /// Line comment leader used for marker and metadata lines.
    pub comment_leader: String,

    /// Tag used in marker tokens, e.g. `SYSML2PYTEST` in
    /// `# SYSML2PYTEST-CUSTOM-START`.
    pub marker_tag: String,

    /// Generator version stamped into metadata blocks.
    pub generator_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            backup_dir: default_backup_dir(),
            create_backups: true,
            default_strategy: Strategy::default(),
            sibling_suffix: default_sibling_suffix(),
            artifact_extension: default_artifact_extension(),
            comment_leader: default_comment_leader(),
            marker_tag: default_marker_tag(),
            generator_version: default_generator_version(),
        }
    }
}

impl Config {
    /// The directory holding configuration and state, relative to the root.
    pub const DIR: &'static str = ".resync";

    /// The configuration file name inside [`Config::DIR`].
    pub const FILE: &'static str = "config.toml";

    /// Path of the configuration file for a workspace root.
    #[must_use]
    pub fn path_in(root: &Path) -> PathBuf {
        root.join(Self::DIR).join(Self::FILE)
    }

    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the TOML content is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {e}"))
    }

    /// Loads the workspace configuration, falling back to defaults when the
    /// file is missing or unreadable.
    #[must_use]
    pub fn load_or_default(root: &Path) -> Self {
        let path = Self::path_in(root);
        Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("using default configuration ({}): {e}", path.display());
            Self::default()
        })
    }

    /// Saves the configuration to a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized to TOML or if
    /// the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content =
            toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {e}"))?;
        std::fs::write(path, content).map_err(|e| format!("Failed to write config file: {e}"))
    }

    /// Returns a copy with relative paths anchored at `root`.
    #[must_use]
    pub fn resolve(mut self, root: &Path) -> Self {
        if self.state_file.is_relative() {
            self.state_file = root.join(&self.state_file);
        }
        if self.backup_dir.is_relative() {
            self.backup_dir = root.join(&self.backup_dir);
        }
        self
    }
}

fn default_state_file() -> PathBuf {
    PathBuf::from(".resync/state.json")
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from(".resync/backups")
}

const fn default_true() -> bool {
    true
}

fn default_sibling_suffix() -> String {
    "new".to_string()
}

fn default_artifact_extension() -> String {
    "py".to_string()
}

fn default_comment_leader() -> String {
    "#".to_string()
}

fn default_marker_tag() -> String {
    "SYSML2PYTEST".to_string()
}

fn default_generator_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// The serialized versions of the configuration.
/// This allows for future changes to the configuration format and to the domain
/// type without breaking compatibility.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default = "default_state_file")]
        state_file: PathBuf,

        #[serde(default = "default_backup_dir")]
        backup_dir: PathBuf,

        #[serde(default = "default_true")]
        create_backups: bool,

        #[serde(default)]
        default_strategy: Strategy,

        #[serde(default = "default_sibling_suffix")]
        sibling_suffix: String,

        #[serde(default = "default_artifact_extension")]
        artifact_extension: String,

        #[serde(default = "default_comment_leader")]
        comment_leader: String,

        #[serde(default = "default_marker_tag")]
        marker_tag: String,

        #[serde(default = "default_generator_version")]
        generator_version: String,
    },
}

impl From<Versions> for Config {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                state_file,
                backup_dir,
                create_backups,
                default_strategy,
                sibling_suffix,
                artifact_extension,
                comment_leader,
                marker_tag,
                generator_version,
            } => Self {
                state_file,
                backup_dir,
                create_backups,
                default_strategy,
                sibling_suffix,
                artifact_extension,
                comment_leader,
                marker_tag,
                generator_version,
            },
        }
    }
}

impl From<Config> for Versions {
    fn from(config: Config) -> Self {
        Self::V1 {
            state_file: config.state_file,
            backup_dir: config.backup_dir,
            create_backups: config.create_backups,
            default_strategy: config.default_strategy,
            sibling_suffix: config.sibling_suffix,
            artifact_extension: config.artifact_extension,
            comment_leader: config.comment_leader,
            marker_tag: config.marker_tag,
            generator_version: config.generator_version,
        }
    }
}

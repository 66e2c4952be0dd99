use std::path::{Path, PathBuf};

use resync::{
    StateStore,
    storage::{Markers, find_artifacts},
};
use tracing::instrument;

use super::{load_config, terminal::Colorize};

#[derive(Debug, clap::Parser)]
pub struct Command {
    /// Directory to scan for artifacts (defaults to the workspace root)
    #[arg(long, value_name = "DIR")]
    artifacts: Option<PathBuf>,
}

impl Command {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let config = load_config(root);
        let dir = self.artifacts.map_or_else(|| root.to_path_buf(), |dir| root.join(dir));

        let mut state = StateStore::new(&config.state_file);
        let report = state.rebuild(
            find_artifacts(&dir, &config.artifact_extension),
            &Markers::from_config(&config),
        );
        state.save()?;

        println!(
            "{}",
            format!(
                "✅ Rebuilt sync state: {} requirements from {} artifacts",
                report.requirements, report.scanned
            )
            .success()
        );
        for skipped in &report.skipped {
            let path = skipped.path.strip_prefix(root).unwrap_or(&skipped.path);
            println!(
                "{}",
                format!("⚠️  skipped {}: {}", path.display(), skipped.reason).warning()
            );
        }
        Ok(())
    }
}

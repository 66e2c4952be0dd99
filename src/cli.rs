use std::path::{Path, PathBuf};

mod history;
mod rebuild;
mod status;
mod sync;
mod terminal;

use clap::ArgAction;
use resync::{
    Config, StateStore,
    storage::{Markers, find_artifacts},
};
use tracing::instrument;

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// The root of the sync workspace
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);
        self.command.run(&self.root)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Compare two requirement collections and report what changed
    Status(status::Command),

    /// Update artifacts from freshly generated text
    ///
    /// Custom regions survive wherever a merge is possible. Conflicts are
    /// written next to the artifact instead of over it.
    Sync(sync::Command),

    /// Show the recorded sync history of a requirement
    History(history::Command),

    /// Rebuild the sync state from the metadata in artifacts
    Rebuild(rebuild::Command),

    /// Initialize a sync workspace
    Init,
}

impl Command {
    fn run(self, root: &Path) -> anyhow::Result<()> {
        match self {
            Self::Status(command) => command.run(root)?,
            Self::Sync(command) => command.run(root)?,
            Self::History(command) => command.run(root)?,
            Self::Rebuild(command) => command.run(root)?,
            Self::Init => init(root)?,
        }
        Ok(())
    }
}

#[instrument]
fn init(root: &Path) -> anyhow::Result<()> {
    use std::fs;

    let dir = root.join(Config::DIR);
    let config_path = Config::path_in(root);
    if config_path.exists() {
        anyhow::bail!(
            "Workspace already initialized (found existing {})",
            config_path.display()
        );
    }

    fs::create_dir_all(&dir)
        .map_err(|e| anyhow::anyhow!("Failed to create {} directory: {e}", Config::DIR))?;

    Config::default()
        .save(&config_path)
        .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", Config::FILE))?;

    println!("Initialized sync workspace in {}", root.display());
    println!("  Created: {}/{}", Config::DIR, Config::FILE);
    println!();
    println!("Next steps:");
    println!("  resync status --old old.json --new new.json");

    Ok(())
}

/// Loads the workspace configuration with paths resolved against `root`.
fn load_config(root: &Path) -> Config {
    Config::load_or_default(root).resolve(root)
}

/// Loads the sync state, rebuilding it from the artifacts under `artifacts`
/// if the state file is corrupt.
fn load_state(config: &Config, artifacts: &Path) -> StateStore {
    let mut state = StateStore::new(&config.state_file);
    if let Err(e) = state.load() {
        tracing::warn!("{e}; rebuilding from {}", artifacts.display());
        let report = state.rebuild(
            find_artifacts(artifacts, &config.artifact_extension),
            &Markers::from_config(config),
        );
        tracing::info!(
            "recovered {} requirements from {} artifacts",
            report.requirements,
            report.scanned
        );
    }
    state
}

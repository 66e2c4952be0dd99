use std::path::Path;

use resync::{
    RequirementId,
    storage::{ArtifactRecord, RequirementRecord},
};
use serde::Serialize;
use tracing::instrument;

use super::{
    load_config, load_state,
    terminal::{Colorize, is_narrow},
};

#[derive(Debug, clap::Parser)]
pub struct Command {
    /// The requirement to show
    #[arg(value_parser = parse_id)]
    requirement_id: RequirementId,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn parse_id(s: &str) -> Result<RequirementId, String> {
    s.parse().map_err(|e| format!("{e}"))
}

#[derive(Debug, Serialize)]
struct History<'a> {
    requirement_id: &'a RequirementId,
    #[serde(flatten)]
    record: &'a RequirementRecord,
    artifact: Option<&'a ArtifactRecord>,
}

impl Command {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let config = load_config(root);
        let state = load_state(&config, root);

        let Some(record) = state.requirement(&self.requirement_id) else {
            anyhow::bail!("No sync history for {}", self.requirement_id);
        };
        let history = History {
            requirement_id: &self.requirement_id,
            record,
            artifact: state.artifact(&record.artifact_path),
        };

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&history)?),
            OutputFormat::Text => print_text(&history, root),
        }
        Ok(())
    }
}

fn print_text(history: &History<'_>, root: &Path) {
    let record = history.record;
    let path = record.artifact_path.strip_prefix(root).unwrap_or(&record.artifact_path);
    let custom = if record.has_custom_code {
        "yes".warning()
    } else {
        "no".dim()
    };

    println!("{}", history.requirement_id.to_string().info());
    if is_narrow() {
        println!("Version: {}", record.version);
        println!("Artifact: {}", path.display());
        println!("Custom code: {custom}");
        println!("Updated: {}", record.last_updated.format("%Y-%m-%d %H:%M"));
        println!("Hash: {:.12}", record.content_hash);
    } else {
        println!("  {:<14} {}", "Version", record.version);
        println!("  {:<14} {}", "Artifact", path.display());
        println!("  {:<14} {custom}", "Custom code");
        println!("  {:<14} {}", "Last updated", record.last_updated.to_rfc3339());
        println!("  {:<14} {}", "Content hash", record.content_hash);
    }

    if let Some(hashes) = &record.fingerprint {
        println!();
        println!("{}", "Fingerprint".dim());
        println!("  {:<14} {}", "Metadata hash", hashes.metadata_hash);
        println!("  {:<14} {}", "Structure hash", hashes.structure_hash);
        println!("  {:<14} {}", "Body hash", hashes.body_hash);
        println!("  {:<14} {}", "Taken", record.last_updated.to_rfc3339());
    }

    if let Some(artifact) = history.artifact {
        let others: Vec<_> = artifact
            .requirement_ids
            .iter()
            .filter(|id| *id != history.requirement_id)
            .map(ToString::to_string)
            .collect();
        if !others.is_empty() {
            println!();
            println!("{}", format!("Shares its artifact with {}", others.join(", ")).dim());
        }
    }
}

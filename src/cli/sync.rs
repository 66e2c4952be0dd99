use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    process,
};

use resync::{
    RequirementId, Strategy,
    domain::change::detect_requirement_changes,
    storage::{
        ArtifactOutcome, BatchReport, GeneratedIndex, Markers, Target, Updater, load_collection,
        plan_jobs, sync_batch,
    },
};
use tracing::instrument;

use super::{
    load_config, load_state,
    terminal::{Colorize, confirm, progress_bar},
};

#[derive(Debug, clap::Parser)]
#[allow(clippy::struct_excessive_bools)]
pub struct Command {
    /// The previous requirement collection (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    old: PathBuf,

    /// The current requirement collection (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    new: PathBuf,

    /// Directory of freshly generated artifacts
    #[arg(long, value_name = "DIR")]
    generated: PathBuf,

    /// Directory of the artifacts to update
    #[arg(long, value_name = "DIR")]
    output_dir: PathBuf,

    /// Merge strategy (defaults to the configured strategy)
    #[arg(long, value_parser = parse_strategy)]
    strategy: Option<Strategy>,

    /// Show what would be changed without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Do not back up artifacts before overwriting them
    #[arg(long)]
    no_backup: bool,

    /// Skip confirmation prompts
    #[arg(long, short)]
    yes: bool,

    /// Suppress output
    #[arg(long, short)]
    quiet: bool,
}

fn parse_strategy(s: &str) -> Result<Strategy, String> {
    s.parse().map_err(|e| format!("{e}"))
}

impl Command {
    #[instrument(skip(self), fields(strategy = tracing::field::Empty))]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let config = load_config(root);
        let strategy = self.strategy.unwrap_or(config.default_strategy);
        tracing::Span::current().record("strategy", tracing::field::display(strategy));

        let old = load_collection(&root.join(&self.old))?;
        let new = load_collection(&root.join(&self.new))?;
        let report = detect_requirement_changes(&old, &new);

        let output_dir = root.join(&self.output_dir);
        let mut state = load_state(&config, &output_dir);
        let markers = Markers::from_config(&config);
        let generated_dir = root.join(&self.generated);
        let index = GeneratedIndex::scan(&generated_dir, &config.artifact_extension, &markers);
        if index.is_empty() {
            tracing::warn!("no generated artifacts found in {}", generated_dir.display());
        }

        let current: BTreeSet<RequirementId> = new.keys().cloned().collect();
        for id in state.stale_requirements(&current) {
            state.forget(&id);
            if !self.quiet {
                println!(
                    "{}",
                    format!("{id} is no longer in the collection; its tests were left in place")
                        .dim()
                );
            }
        }

        let jobs = plan_jobs(&report, &new, &index, &state, &output_dir);

        if jobs.is_empty() {
            if !self.quiet {
                println!("{}", "✅ All artifacts are up to date.".success());
            }
            if !self.dry_run {
                state.mark_synced();
                state.save()?;
            }
            return Ok(());
        }

        if strategy == Strategy::FullRegen && !self.yes && !self.dry_run {
            let prompt = format!(
                "Full regeneration discards custom code in {} artifacts. Continue?",
                jobs.len()
            );
            if !confirm(&prompt)? {
                println!("Aborted.");
                return Ok(());
            }
        }

        let mut updater = Updater::new(&config).dry_run(self.dry_run);
        if self.no_backup {
            updater = updater.without_backups();
        }

        let bar = progress_bar(jobs.len(), self.quiet || self.dry_run);
        let batch = sync_batch(&updater, &mut state, &jobs, strategy, |outcome| {
            bar.set_message(outcome.path().display().to_string());
            bar.inc(1);
        });
        bar.finish_and_clear();

        if !self.dry_run {
            state.mark_synced();
            state.save()?;
        }

        if !self.quiet {
            print_outcomes(&batch, root);
        }

        let mut exit_code = 0;
        if let Err(failures) = batch.failures() {
            eprintln!("{}", failures.to_string().failure());
            exit_code = exit_code.max(1);
        }
        if batch.has_conflicts() {
            exit_code = exit_code.max(2);
        }

        if exit_code != 0 {
            process::exit(exit_code);
        }

        Ok(())
    }
}

fn print_outcomes(batch: &BatchReport, root: &Path) {
    let show = |path: &Path| path.strip_prefix(root).unwrap_or(path).display().to_string();

    for missing in &batch.missing {
        println!("{}", format!("⚠️  {missing}; regenerated").warning());
    }

    for outcome in &batch.outcomes {
        match outcome {
            ArtifactOutcome::Written {
                path,
                strategy_used,
                backup,
                preserved_lines,
                updated_lines,
                versions,
                ..
            } => {
                println!("{} {} ({strategy_used})", "✅".success(), show(path));
                for version in versions {
                    println!("   {version}");
                }
                println!(
                    "   {}",
                    format!(
                        "{preserved_lines} custom lines preserved, {updated_lines} generated lines updated"
                    )
                    .dim()
                );
                if let Some(backup) = backup {
                    println!("   {}", format!("backup: {}", show(backup)).dim());
                }
            }
            ArtifactOutcome::SideBySide {
                path,
                sibling,
                conflict,
            } => {
                println!(
                    "{} {} -> {}",
                    "⚠️ ".warning(),
                    show(path),
                    show(sibling)
                );
                if let Some(conflict) = conflict {
                    println!("   {}", conflict.to_string().warning());
                }
            }
            ArtifactOutcome::Preview { path, merge } => {
                let target = match merge.target {
                    Target::Original => show(path),
                    Target::Sibling => format!("{} (side by side)", show(path)),
                };
                println!("Would write {target} ({})", merge.strategy_used);
                if let Some(conflict) = &merge.conflict {
                    println!("   {}", conflict.to_string().warning());
                }
            }
            ArtifactOutcome::Failed { path, cause } => {
                println!("{} {}: {cause}", "❌".failure(), show(path));
            }
        }
    }

    let (preserved, updated) = batch.line_totals();
    println!();
    println!(
        "{} artifacts processed, {} requirements recorded",
        batch.outcomes.len(),
        batch.recorded
    );
    println!("Custom code preserved: {preserved} lines");
    println!("Generated code updated: {updated} lines");
}

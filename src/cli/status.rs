use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use resync::{
    RequirementId, Severity, SyncReport,
    domain::change::detect_requirement_changes,
    storage::load_collection,
};
use tracing::instrument;

use super::terminal::{Colorize, is_narrow};

#[derive(Debug, clap::Parser)]
pub struct Command {
    /// The previous requirement collection (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    old: PathBuf,

    /// The current requirement collection (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    new: PathBuf,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    format: OutputFormat,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
    Markdown,
}

impl Command {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let old = load_collection(&root.join(&self.old))?;
        let new = load_collection(&root.join(&self.new))?;
        let report = detect_requirement_changes(&old, &new);

        let styled = self.output.is_none();
        let rendered = match self.format {
            OutputFormat::Text => render_text(&report, styled),
            OutputFormat::Json => report.to_json()? + "\n",
            OutputFormat::Markdown => report.to_markdown(),
        };

        match self.output {
            Some(path) => {
                let path = root.join(path);
                fs::write(&path, rendered)?;
                println!("Report written to {}", path.display());
            }
            None => print!("{rendered}"),
        }

        Ok(())
    }
}

const MAX_DISPLAY: usize = 5;

fn render_text(report: &SyncReport, styled: bool) -> String {
    let paint = |text: String, style: fn(&str) -> String| {
        if styled { style(&text) } else { text }
    };
    let rule = if is_narrow() { "─".repeat(24) } else { "─".repeat(48) };

    let mut out = String::new();
    let _ = writeln!(out, "Requirement Sync Report");
    let _ = writeln!(out, "{}", paint(rule, <str as Colorize>::dim));
    let _ = writeln!(out, "Total Requirements: {}", report.total_requirements());
    let _ = writeln!(out, "Total Changes: {}", report.total_changes());

    if !report.has_changes() {
        let _ = writeln!(out, "\n{}", paint("No changes detected.".to_string(), <str as Colorize>::success));
        return out;
    }

    list(&mut out, "Added", &report.added);
    list(&mut out, "Deleted", &report.deleted);

    for severity in Severity::DESCENDING {
        let changes: Vec<_> = report.by_severity(severity).collect();
        if changes.is_empty() {
            continue;
        }
        let heading = format!("{} ({})", severity.label().to_uppercase(), changes.len());
        let heading = match severity {
            Severity::Major => paint(heading, <str as Colorize>::failure),
            Severity::Moderate => paint(heading, <str as Colorize>::warning),
            _ => paint(heading, <str as Colorize>::info),
        };
        let _ = writeln!(out, "\n{heading}");
        for change in changes.iter().take(MAX_DISPLAY) {
            let _ = write!(out, "  • {}", change.requirement_id);
            if !change.changed_fields.is_empty() {
                let fields: Vec<_> = change.changed_fields.iter().map(ToString::to_string).collect();
                let _ = write!(out, ": {}", fields.join(", "));
            }
            out.push('\n');
        }
        if changes.len() > MAX_DISPLAY {
            let _ = writeln!(out, "  ... and {} more", changes.len() - MAX_DISPLAY);
        }
    }

    out
}

fn list(out: &mut String, title: &str, ids: &[RequirementId]) {
    if ids.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{title} ({})", ids.len());
    for id in ids.iter().take(MAX_DISPLAY) {
        let _ = writeln!(out, "  • {id}");
    }
    if ids.len() > MAX_DISPLAY {
        let _ = writeln!(out, "  ... and {} more", ids.len() - MAX_DISPLAY);
    }
}

#[cfg(test)]
mod tests {
    use resync::{
        Requirement,
        domain::{Attribute, Bounds, ScalarType},
    };

    use super::*;

    fn tree(min: f64) -> Requirement {
        Requirement::new("REQ-001".parse().unwrap(), "TreeHeight").with_attribute(
            Attribute::new("height", ScalarType::Integer).with_bounds(Bounds::range(min, 200.0)),
        )
    }

    #[test]
    fn text_report_lists_changes_by_severity() {
        let old = [(tree(150.0).id().clone(), tree(150.0))].into();
        let new = [(tree(140.0).id().clone(), tree(140.0))].into();
        let report = detect_requirement_changes(&old, &new);

        let text = render_text(&report, false);

        assert!(text.starts_with("Requirement Sync Report\n"));
        assert!(text.contains("Total Requirements: 1\n"));
        assert!(text.contains("Total Changes: 1\n"));
        assert!(text.contains("MODERATE (1)\n  • REQ-001"));
    }

    #[test]
    fn long_lists_are_truncated() {
        let added: Vec<_> = (0..8).map(|i| format!("REQ-{i:03}").parse().unwrap()).collect();
        let report = SyncReport {
            added,
            ..SyncReport::default()
        };

        let text = render_text(&report, false);

        assert!(text.contains("Added (8)"));
        assert!(text.contains("  ... and 3 more"));
        assert!(!text.contains("REQ-005"));
    }
}

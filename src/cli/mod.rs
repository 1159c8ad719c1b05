//! CLI command definitions and terminal output.
//!
//! Uses clap derive macros for ergonomic argument definitions.

pub mod args;

use colored::Colorize;
use kubereport::pipeline::{AppStatus, RunSummary};

/// One line per application, for the terminal.
pub fn format_run_summary(summary: &RunSummary) -> String {
    let mut outcomes: Vec<_> = summary.outcomes.iter().collect();
    outcomes.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = String::new();
    for outcome in outcomes {
        let line = match &outcome.status {
            AppStatus::Diffed(counts) if counts.is_empty() => {
                format!("  {} {}: no changes", "✓".green(), outcome.name.bold())
            }
            AppStatus::Diffed(counts) => {
                format!("  {} {}: {counts}", "●".yellow(), outcome.name.bold())
            }
            AppStatus::Failed(reason) => {
                format!("  {} {}: {}", "✗".red(), outcome.name.bold(), reason.red())
            }
            AppStatus::Cancelled => {
                format!("  {} {}: cancelled", "-".dimmed(), outcome.name.bold())
            }
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Print the run summary to stderr.
pub fn print_run_summary(summary: &RunSummary) {
    eprint!("{}", format_run_summary(summary));
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubereport::models::ReportCounts;
    use kubereport::pipeline::AppOutcome;

    #[test]
    fn summary_lists_apps_sorted() {
        colored::control::set_override(false);
        let summary = RunSummary {
            outcomes: vec![
                AppOutcome {
                    name: "zeta".into(),
                    status: AppStatus::Failed("path not found".into()),
                    queued_children: vec![],
                },
                AppOutcome {
                    name: "alpha".into(),
                    status: AppStatus::Diffed(ReportCounts { added: 1, modified: 0, removed: 2 }),
                    queued_children: vec![],
                },
            ],
        };
        let text = format_run_summary(&summary);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "  ● alpha: 1 added, 0 modified, 2 removed");
        assert_eq!(lines[1], "  ✗ zeta: path not found");
    }
}

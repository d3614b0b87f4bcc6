//! Human-readable report.

use std::fmt::Write;

use clap::ValueEnum;
use colored::*;
use serde::{Deserialize, Serialize};

use super::{ReportEntry, RunReport};
use crate::runner::{CommandResult, Outcome};

/// Which captured output to print under each revision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ShowOutput {
    Never,
    #[default]
    Failures,
    Always,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextOptions {
    pub show_output: ShowOutput,
}

fn marker(outcome: Outcome) -> ColoredString {
    match outcome {
        Outcome::Passed => "PASS ".green().bold(),
        Outcome::Failed => "FAIL ".red().bold(),
        Outcome::NotStarted => "ERROR".magenta().bold(),
        Outcome::Skipped => "SKIP ".dimmed(),
    }
}

fn wants_output(options: &TextOptions, result: &CommandResult) -> bool {
    match options.show_output {
        ShowOutput::Never => false,
        ShowOutput::Failures => !result.passed(),
        ShowOutput::Always => true,
    }
}

fn push_stream(out: &mut String, label: &str, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    let text = String::from_utf8_lossy(bytes);
    let _ = writeln!(out, "        {}:", label.dimmed());
    for line in text.lines() {
        let _ = writeln!(out, "        | {}", line);
    }
}

/// Render the report as text, one line per revision plus a summary.
pub fn format_text(report: &RunReport, options: &TextOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", "Command:".cyan(), report.command);

    let reason = if report.interrupted {
        "not visited (interrupted)"
    } else {
        "not visited (stopped after earlier failure)"
    };

    for entry in &report.entries {
        let result = match entry {
            ReportEntry::Visited(result) => result,
            ReportEntry::Skipped(revision) => {
                let _ = writeln!(out, "  {} {}  {}", marker(Outcome::Skipped), revision.short(), reason.dimmed());
                continue;
            }
        };
        let detail = match &result.error {
            Some(error) => format!("exit {:<4} {}", result.exit_code, error),
            None => format!("exit {}", result.exit_code),
        };
        let _ = writeln!(
            out,
            "  {} {}  {}  {:.2}s",
            marker(result.outcome()),
            result.revision.short(),
            detail,
            result.duration.as_secs_f64()
        );
        if wants_output(options, result) {
            push_stream(&mut out, "stdout", &result.stdout);
            push_stream(&mut out, "stderr", &result.stderr);
        }
    }

    let summary = report.summary();
    let line = summary.to_string();
    let line = if report.all_passed() && !report.interrupted {
        line.green()
    } else {
        line.red()
    };
    let _ = writeln!(out, "{}", line);
    if report.interrupted {
        let _ = writeln!(out, "{}", "Run interrupted".yellow());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fixtures::{mixed_report, result};
    use crate::repo::RevisionRef;

    fn plain(report: &RunReport, show_output: ShowOutput) -> String {
        colored::control::set_override(false);
        format_text(report, &TextOptions { show_output })
    }

    #[test]
    fn test_markers_distinguish_outcomes() {
        let text = plain(&mixed_report(), ShowOutput::Never);
        assert!(text.contains("PASS  aaaaaaaaaaaa  exit 0"));
        assert!(text.contains("FAIL  bbbbbbbbbbbb  exit 2"));
        assert!(text.contains("ERROR cccccccccccc  exit 127  Command could not be started: No such file"));
        assert!(text.contains("SKIP  dddddddddddd  not visited (stopped after earlier failure)"));
        assert!(text.contains("4 revisions: 1 passed, 1 failed, 1 not started, 1 skipped"));
    }

    #[test]
    fn test_lines_in_revision_order() {
        let text = plain(&mixed_report(), ShowOutput::Never);
        let a = text.find("aaaaaaaaaaaa").unwrap();
        let b = text.find("bbbbbbbbbbbb").unwrap();
        let c = text.find("cccccccccccc").unwrap();
        let d = text.find("dddddddddddd").unwrap();
        assert!(a < b && b < c && c < d);
    }

    #[test]
    fn test_failure_output_shown() {
        let text = plain(&mixed_report(), ShowOutput::Failures);
        assert!(text.contains("| boom"));
    }

    #[test]
    fn test_output_hidden_with_never() {
        let text = plain(&mixed_report(), ShowOutput::Never);
        assert!(!text.contains("boom"));
    }

    #[test]
    fn test_passing_output_only_with_always() {
        let mut report = RunReport::new("echo ok");
        let mut ok = result("eeeeeeeeeeee", 0, None);
        ok.stdout = b"ok\n".to_vec();
        report.entries.push(ReportEntry::Visited(ok));

        assert!(!plain(&report, ShowOutput::Failures).contains("| ok"));
        assert!(plain(&report, ShowOutput::Always).contains("| ok"));
    }

    #[test]
    fn test_skipped_rendered_in_list_order() {
        let mut report = RunReport::new("sleep 10");
        report.interrupted = true;
        report.entries.push(ReportEntry::Skipped(RevisionRef::new("aaaaaaaaaaaaaaaa")));
        report.entries.push(ReportEntry::Visited(result("bbbbbbbbbbbbbbbb", 0, None)));

        let text = plain(&report, ShowOutput::Never);
        let a = text.find("SKIP  aaaaaaaaaaaa").unwrap();
        let b = text.find("PASS  bbbbbbbbbbbb").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_interrupted_marker() {
        let mut report = mixed_report();
        report.interrupted = true;
        let text = plain(&report, ShowOutput::Never);
        assert!(text.contains("not visited (interrupted)"));
        assert!(text.contains("Run interrupted"));
    }
}

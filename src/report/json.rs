//! Machine-readable report.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{ReportEntry, RunReport, Summary};
use crate::repo::RevisionRef;
use crate::runner::Outcome;

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    command: &'a str,
    started_at: DateTime<Utc>,
    interrupted: bool,
    summary: Summary,
    revisions: Vec<JsonEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct JsonEntry<'a> {
    revision: &'a RevisionRef,
    status: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u64>,
}

/// Render the report as pretty-printed JSON.
///
/// Every listed revision appears in `revisions`, in list order; skipped
/// ones have status `skipped` and no exit code. Captured output is decoded
/// lossily as UTF-8.
pub fn format_json(report: &RunReport) -> Result<String, serde_json::Error> {
    let revisions: Vec<JsonEntry<'_>> = report
        .entries
        .iter()
        .map(|entry| match entry {
            ReportEntry::Visited(result) => JsonEntry {
                revision: &result.revision,
                status: result.outcome(),
                exit_code: Some(result.exit_code),
                error: result.error.as_ref().map(ToString::to_string),
                stdout: Some(String::from_utf8_lossy(&result.stdout).into_owned()),
                stderr: Some(String::from_utf8_lossy(&result.stderr).into_owned()),
                duration_ms: Some(u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX)),
            },
            ReportEntry::Skipped(revision) => JsonEntry {
                revision,
                status: Outcome::Skipped,
                exit_code: None,
                error: None,
                stdout: None,
                stderr: None,
                duration_ms: None,
            },
        })
        .collect();

    let document = JsonReport {
        command: &report.command,
        started_at: report.started_at,
        interrupted: report.interrupted,
        summary: report.summary(),
        revisions,
    };
    serde_json::to_string_pretty(&document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fixtures::{mixed_report, result};

    #[test]
    fn test_json_structure() {
        let json = format_json(&mixed_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["command"], "make test");
        assert_eq!(value["interrupted"], false);
        assert_eq!(value["summary"]["total"], 4);
        assert_eq!(value["summary"]["not_started"], 1);

        let revisions = value["revisions"].as_array().unwrap();
        assert_eq!(revisions.len(), 4);
        assert_eq!(revisions[0]["status"], "passed");
        assert_eq!(revisions[1]["status"], "failed");
        assert_eq!(revisions[1]["exit_code"], 2);
        assert_eq!(revisions[1]["stderr"], "boom\n");
        assert_eq!(revisions[2]["status"], "not-started");
        assert!(revisions[2]["error"].as_str().unwrap().contains("could not be started"));
        assert_eq!(revisions[3]["status"], "skipped");
        assert!(revisions[3].get("exit_code").is_none());
        assert_eq!(revisions[3]["revision"], "dddddddddddddddd");
    }

    #[test]
    fn test_json_keeps_list_order_after_interrupt() {
        let mut report = RunReport::new("sleep 10");
        report.interrupted = true;
        report.entries.push(ReportEntry::Skipped(RevisionRef::new("A")));
        report.entries.push(ReportEntry::Visited(result("B", 0, None)));

        let value: serde_json::Value = serde_json::from_str(&format_json(&report).unwrap()).unwrap();
        let order: Vec<&str> = value["revisions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["revision"].as_str().unwrap())
            .collect();
        assert_eq!(order, vec!["A", "B"]);
        assert_eq!(value["revisions"][0]["status"], "skipped");
    }
}

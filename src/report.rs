//! Outcomes of the individual backup units and their aggregate.

use std::path::{Path, PathBuf};

use derive_more::Display;

/// Every unit succeeded or was skipped by a dry run.
pub const EXIT_SUCCESS: u8 = 0;
/// At least one unit failed.
pub const EXIT_UNIT_FAILED: u8 = 1;
/// Configuration or environment error, no unit was attempted.
pub const EXIT_FATAL: u8 = 2;

/// Error details longer than this are cut off.
pub const MAX_ERROR_DETAIL: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, serde::Serialize)]
pub enum OutcomeStatus {
    #[display("succeeded")]
    Succeeded,
    #[display("failed")]
    Failed,
    #[display("skipped (dry run)")]
    SkippedDryRun,
}

/// Result of attempting a single backup unit.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct OperationOutcome {
    unit: String,
    status: OutcomeStatus,
    destination: Option<PathBuf>,
    error: Option<String>,
}

impl OperationOutcome {
    pub fn succeeded(unit: impl Into<String>, destination: PathBuf) -> Self {
        Self {
            unit: unit.into(),
            status: OutcomeStatus::Succeeded,
            destination: Some(destination),
            error: None,
        }
    }

    pub fn skipped_dry_run(unit: impl Into<String>, destination: PathBuf) -> Self {
        Self {
            unit: unit.into(),
            status: OutcomeStatus::SkippedDryRun,
            destination: Some(destination),
            error: None,
        }
    }

    /// A failed unit. `destination` is [None] if it couldn't be computed.
    pub fn failed(
        unit: impl Into<String>,
        destination: Option<PathBuf>,
        error: impl AsRef<str>,
    ) -> Self {
        Self {
            unit: unit.into(),
            status: OutcomeStatus::Failed,
            destination,
            error: Some(truncate_detail(error.as_ref())),
        }
    }

    /// Database name or source path.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn status(&self) -> OutcomeStatus {
        self.status
    }

    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }

    /// Present iff [failed](OutcomeStatus::Failed).
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

fn truncate_detail(detail: &str) -> String {
    let detail = detail.trim();
    let detail = if detail.is_empty() {
        "unknown error"
    } else {
        detail
    };

    match detail.char_indices().nth(MAX_ERROR_DETAIL) {
        Some((cut, _)) => format!("{}...", &detail[..cut]),
        None => detail.to_string(),
    }
}

/// All [OperationOutcome]s of a run, in the order the units were configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupReport {
    outcomes: Vec<OperationOutcome>,
}

#[derive(serde::Serialize)]
struct ReportJson<'a> {
    succeeded: usize,
    failed: usize,
    skipped: usize,
    exit_status: u8,
    outcomes: &'a [OperationOutcome],
}

impl BackupReport {
    pub fn outcomes(&self) -> &[OperationOutcome] {
        &self.outcomes
    }

    fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == status)
            .count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(OutcomeStatus::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(OutcomeStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(OutcomeStatus::SkippedDryRun)
    }

    /// [EXIT_SUCCESS] or, if any unit failed, [EXIT_UNIT_FAILED].
    pub fn exit_status(&self) -> u8 {
        if self.failed() == 0 {
            EXIT_SUCCESS
        } else {
            EXIT_UNIT_FAILED
        }
    }

    /// Logs one line per unit followed by the totals.
    pub fn log_summary(&self) {
        for outcome in &self.outcomes {
            let destination = outcome
                .destination()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "-".to_string());
            match outcome.error() {
                Some(error) => log::error!(
                    target: "report",
                    "{} {}: {destination}: {error}",
                    outcome.unit,
                    outcome.status
                ),
                None => log::info!(
                    target: "report",
                    "{} {}: {destination}",
                    outcome.unit,
                    outcome.status
                ),
            }
        }

        log::info!(
            target: "report",
            "{} succeeded, {} failed, {} skipped (dry run)",
            self.succeeded(),
            self.failed(),
            self.skipped()
        );
    }

    /// Report with counts and exit status as pretty printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&ReportJson {
            succeeded: self.succeeded(),
            failed: self.failed(),
            skipped: self.skipped(),
            exit_status: self.exit_status(),
            outcomes: &self.outcomes,
        })
    }
}

impl Extend<OperationOutcome> for BackupReport {
    fn extend<T: IntoIterator<Item = OperationOutcome>>(&mut self, iter: T) {
        self.outcomes.extend(iter);
    }
}

impl FromIterator<OperationOutcome> for BackupReport {
    fn from_iter<T: IntoIterator<Item = OperationOutcome>>(iter: T) -> Self {
        Self {
            outcomes: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_status_reflects_failures() {
        let mut report: BackupReport =
            [OperationOutcome::succeeded("shop", "/b/shop.sql.gz".into())]
                .into_iter()
                .collect();
        assert_eq!(report.exit_status(), EXIT_SUCCESS);

        report.extend([OperationOutcome::failed("/srv", None, "source missing")]);
        assert_eq!(report.exit_status(), EXIT_UNIT_FAILED);
        assert_eq!((report.succeeded(), report.failed()), (1, 1));
    }

    #[test]
    fn long_error_detail_is_truncated() {
        let outcome = OperationOutcome::failed("shop", None, "ä".repeat(MAX_ERROR_DETAIL + 10));

        let error = outcome.error().unwrap();
        assert!(error.ends_with("..."));
        assert_eq!(error.chars().count(), MAX_ERROR_DETAIL + 3);
    }

    #[test]
    fn failed_outcome_always_has_detail() {
        let outcome = OperationOutcome::failed("shop", None, "  \n");
        assert_eq!(outcome.error(), Some("unknown error"));
    }

    #[test]
    fn json_contains_counts_and_outcomes() {
        let report: BackupReport = [
            OperationOutcome::skipped_dry_run("shop", "/b/shop.sql.gz".into()),
            OperationOutcome::failed("/srv", None, "source missing"),
        ]
        .into_iter()
        .collect();

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(json["skipped"], 1);
        assert_eq!(json["failed"], 1);
        assert_eq!(json["exit_status"], 1);
        assert_eq!(json["outcomes"][0]["status"], "SkippedDryRun");
        assert_eq!(json["outcomes"][1]["error"], "source missing");
    }
}

//! Per-scenario and per-run results

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::FixtureError;
use crate::golden::GoldenReport;
use crate::settings::SkipReason;
use crate::stage::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioOutcome {
    Passed,
    Failed,
    Skipped,
}

/// One logged step of the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub stage: Stage,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub stage: Stage,
    pub message: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCheck {
    pub expected: u16,
    pub actual: u16,
}

impl StatusCheck {
    pub fn passed(&self) -> bool {
        self.expected == self.actual
    }
}

/// Result of a single scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub id: String,
    pub name: String,
    pub source: Option<PathBuf>,
    pub outcome: ScenarioOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    pub update_golden: bool,
    pub final_stage: Stage,
    pub checkpoints: Vec<Checkpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_check: Option<StatusCheck>,
    pub checks: Vec<GoldenReport>,
    pub failures: Vec<Failure>,
    pub duration_ms: u64,
}

impl ScenarioReport {
    pub fn new(id: impl Into<String>, name: impl Into<String>, source: Option<PathBuf>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source,
            outcome: ScenarioOutcome::Passed,
            skip_reason: None,
            update_golden: false,
            final_stage: Stage::Loaded,
            checkpoints: Vec::new(),
            status_check: None,
            checks: Vec::new(),
            failures: Vec::new(),
            duration_ms: 0,
        }
    }

    /// A fixture that never got past loading
    pub fn load_failure(path: &Path, error: &FixtureError) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let id = file_name.split('.').next().unwrap_or_default().to_string();

        let mut report = Self::new(id.clone(), id, Some(path.to_path_buf()));
        report.checkpoint(Stage::Loaded, false, Some(error.to_string()));
        report.fail(Stage::Loaded, error.to_string());
        report.finish(Stage::Done);
        report
    }

    pub fn checkpoint(&mut self, stage: Stage, ok: bool, detail: Option<String>) {
        self.checkpoints.push(Checkpoint { stage, ok, detail });
    }

    pub fn fail(&mut self, stage: Stage, message: impl Into<String>) {
        self.failures.push(Failure {
            stage,
            message: message.into(),
        });
    }

    /// Settle the outcome once the pipeline has stopped
    pub fn finish(&mut self, final_stage: Stage) {
        self.final_stage = final_stage;
        self.outcome = if final_stage == Stage::Skipped {
            ScenarioOutcome::Skipped
        } else if self.failures.is_empty() {
            ScenarioOutcome::Passed
        } else {
            ScenarioOutcome::Failed
        };
    }

    pub fn passed(&self) -> bool {
        self.outcome == ScenarioOutcome::Passed
    }

    /// Whether the scenario has a checkpoint for `stage`
    pub fn reached(&self, stage: Stage) -> bool {
        self.checkpoints.iter().any(|c| c.stage == stage)
    }
}

/// Result of running all scenarios
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub scenarios: Vec<ScenarioReport>,
}

impl SuiteReport {
    pub fn from_reports(scenarios: Vec<ScenarioReport>, duration_ms: u64) -> Self {
        let count = |outcome: ScenarioOutcome| scenarios.iter().filter(|s| s.outcome == outcome).count();
        Self {
            total: scenarios.len(),
            passed: count(ScenarioOutcome::Passed),
            failed: count(ScenarioOutcome::Failed),
            skipped: count(ScenarioOutcome::Skipped),
            duration_ms,
            scenarios,
        }
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }

    pub fn scenario(&self, id: &str) -> Option<&ScenarioReport> {
        self.scenarios.iter().find(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_settles_outcome() {
        let mut report = ScenarioReport::new("orders", "orders", None);
        report.checkpoint(Stage::ResetBefore, true, None);
        report.finish(Stage::Done);
        assert!(report.passed());

        report.fail(Stage::Verifying, "HttpStatus mismatch: expected 200, got 500");
        report.finish(Stage::Done);
        assert_eq!(report.outcome, ScenarioOutcome::Failed);
        assert_eq!(
            report.failures[0].to_string(),
            "verification: HttpStatus mismatch: expected 200, got 500"
        );

        let mut skipped = ScenarioReport::new("draft", "draft", None);
        skipped.finish(Stage::Skipped);
        assert_eq!(skipped.outcome, ScenarioOutcome::Skipped);
    }

    #[test]
    fn test_load_failure_report() {
        let err = FixtureError::Invalid {
            id: "broken".to_string(),
            reason: "execute.path must start with '/'".to_string(),
        };
        let report = ScenarioReport::load_failure(Path::new("fixture/broken.yaml"), &err);
        assert_eq!(report.id, "broken");
        assert_eq!(report.outcome, ScenarioOutcome::Failed);
        assert_eq!(report.failures[0].stage, Stage::Loaded);
        assert!(report.reached(Stage::Loaded));
        assert!(!report.reached(Stage::ResetBefore));
    }

    #[test]
    fn test_suite_counts() {
        let mut a = ScenarioReport::new("a", "a", None);
        a.finish(Stage::Done);
        let mut b = ScenarioReport::new("b", "b", None);
        b.fail(Stage::Executing, "connection refused");
        b.finish(Stage::Done);
        let mut c = ScenarioReport::new("c", "c", None);
        c.finish(Stage::Skipped);

        let suite = SuiteReport::from_reports(vec![a, b, c], 12);
        assert_eq!((suite.total, suite.passed, suite.failed, suite.skipped), (3, 1, 1, 1));
        assert!(!suite.success());
        assert_eq!(suite.scenario("b").unwrap().failures.len(), 1);

        let json = serde_json::to_value(&suite).unwrap();
        assert_eq!(json["scenarios"][0]["final_stage"], "DONE");
        assert_eq!(json["scenarios"][2]["outcome"], "skipped");
    }
}

//! Golden file comparison and regeneration

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use apitest_common::TableRef;

use crate::diff::{diff, ExcludePath, Mismatch};
use crate::error::GoldenError;
use crate::fixture::ScenarioId;

/// `{id}.golden`
pub fn body_golden_path(dir: &Path, id: &ScenarioId) -> PathBuf {
    dir.join(format!("{}.golden", id))
}

/// `{id}-{schema}-{table}.golden`
pub fn table_golden_path(dir: &Path, id: &ScenarioId, target: &TableRef) -> PathBuf {
    dir.join(format!("{}-{}-{}.golden", id, target.schema, target.table))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum GoldenStatus {
    /// Update mode rewrote the file
    Updated,
    Matched,
    Mismatched { mismatches: Vec<Mismatch> },
    Missing,
    Unreadable { reason: String },
}

/// Outcome of one golden check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenReport {
    pub label: String,
    pub golden_path: PathBuf,
    #[serde(flatten)]
    pub status: GoldenStatus,
}

impl GoldenReport {
    pub fn passed(&self) -> bool {
        matches!(self.status, GoldenStatus::Updated | GoldenStatus::Matched)
    }

    /// One line per problem, naming the label and what went wrong
    pub fn failure_messages(&self) -> Vec<String> {
        match &self.status {
            GoldenStatus::Updated | GoldenStatus::Matched => Vec::new(),
            GoldenStatus::Missing => vec![format!(
                "{}: golden file not found: {}",
                self.label,
                self.golden_path.display()
            )],
            GoldenStatus::Unreadable { reason } => vec![format!(
                "{}: cannot read golden file {}: {}",
                self.label,
                self.golden_path.display(),
                reason
            )],
            GoldenStatus::Mismatched { mismatches } => mismatches
                .iter()
                .map(|m| format!("{}: {}", self.label, m))
                .collect(),
        }
    }
}

/// Compares values with golden files, or rewrites them in update mode
#[derive(Debug, Clone, Copy, Default)]
pub struct GoldenVerifier;

impl GoldenVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Only a failed write in update mode is an error; every comparison
    /// problem is reported through the returned [`GoldenReport`].
    pub fn verify(
        &self,
        actual: &Value,
        golden_path: &Path,
        update: bool,
        excludes: &[ExcludePath],
        label: &str,
    ) -> Result<GoldenReport, GoldenError> {
        let report = |status| GoldenReport {
            label: label.to_string(),
            golden_path: golden_path.to_path_buf(),
            status,
        };

        if update {
            write_golden(actual, golden_path)?;
            info!("Updated golden file {} ({})", golden_path.display(), label);
            return Ok(report(GoldenStatus::Updated));
        }

        let content = match std::fs::read_to_string(golden_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("{}: golden file not found: {}", label, golden_path.display());
                return Ok(report(GoldenStatus::Missing));
            }
            Err(e) => {
                warn!("{}: cannot read {}: {}", label, golden_path.display(), e);
                return Ok(report(GoldenStatus::Unreadable {
                    reason: e.to_string(),
                }));
            }
        };
        let expected: Value = match serde_json::from_str(&content) {
            Ok(expected) => expected,
            Err(e) => {
                warn!("{}: golden file {} is not JSON: {}", label, golden_path.display(), e);
                return Ok(report(GoldenStatus::Unreadable {
                    reason: e.to_string(),
                }));
            }
        };

        let mismatches = diff(&expected, actual, excludes);
        if mismatches.is_empty() {
            debug!("{}: matches {}", label, golden_path.display());
            return Ok(report(GoldenStatus::Matched));
        }

        for mismatch in &mismatches {
            warn!("{}: {}", label, mismatch);
        }
        Ok(report(GoldenStatus::Mismatched { mismatches }))
    }
}

/// Pretty JSON with sorted keys and a trailing newline
pub fn canonical_json(value: &Value) -> Result<String, serde_json::Error> {
    let mut text = serde_json::to_string_pretty(&sorted(value))?;
    text.push('\n');
    Ok(text)
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k.clone(), sorted(v))).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

fn write_golden(actual: &Value, path: &Path) -> Result<(), GoldenError> {
    let text = canonical_json(actual)?;
    let write_err = |source: std::io::Error| GoldenError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    std::fs::write(path, text).map_err(write_err)
}

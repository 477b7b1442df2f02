//! Run-wide selection policy

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use crate::error::SettingsError;
use crate::fixture::ScenarioId;

/// Which scenarios run, which are skipped and which regenerate their golden files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Never run, regardless of anything else
    pub wip_list: BTreeSet<String>,

    /// Overwrite golden files instead of comparing
    pub update_golden: BTreeSet<String>,

    /// Only run `white_list` when set
    pub partial_test: bool,

    pub white_list: BTreeSet<String>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        // An empty settings file means "run everything"
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    pub fn is_update_target(&self, id: &ScenarioId) -> bool {
        contains(&self.update_golden, id)
    }
}

fn contains(list: &BTreeSet<String>, id: &ScenarioId) -> bool {
    list.iter().any(|entry| id.matches(entry))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    WorkInProgress,
    NotWhitelisted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::WorkInProgress => "work in progress",
            SkipReason::NotWhitelisted => "not in whitelist of partial run",
        })
    }
}

/// Entry decision for one scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision", content = "reason")]
pub enum Classification {
    Run,
    /// Partial run and the scenario is whitelisted
    WhitelistOnly,
    Skip(SkipReason),
}

impl Classification {
    pub fn should_run(&self) -> bool {
        !matches!(self, Classification::Skip(_))
    }
}

/// Decide whether a scenario runs. WIP always wins.
pub fn classify(id: &ScenarioId, settings: &Settings) -> Classification {
    if contains(&settings.wip_list, id) {
        return Classification::Skip(SkipReason::WorkInProgress);
    }
    if settings.partial_test {
        return if contains(&settings.white_list, id) {
            Classification::WhitelistOnly
        } else {
            Classification::Skip(SkipReason::NotWhitelisted)
        };
    }
    Classification::Run
}

//! Plan Command

use anyhow::Result;
use serde::Serialize;

use apitest_runner::{plan, Classification, PlanEntry, RunnerConfig, Settings};

use super::fixture_sources;
use crate::output::{print_list, OutputFormat, TableDisplay};

/// Plan display wrapper for serialization
#[derive(Serialize)]
pub struct PlanRow {
    pub id: String,
    pub decision: String,
    pub update_golden: bool,
    pub source: String,
}

impl From<PlanEntry> for PlanRow {
    fn from(entry: PlanEntry) -> Self {
        let decision = match entry.classification {
            Classification::Run => "run".to_string(),
            Classification::WhitelistOnly => "run (whitelisted)".to_string(),
            Classification::Skip(reason) => format!("skip: {}", reason),
        };
        Self {
            id: entry.id,
            decision,
            update_golden: entry.update_golden,
            source: entry.source.display().to_string(),
        }
    }
}

impl TableDisplay for PlanRow {
    fn headers() -> Vec<&'static str> {
        vec!["Scenario", "Decision", "Golden", "Source"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.decision.clone(),
            if self.update_golden { "update" } else { "verify" }.to_string(),
            self.source.clone(),
        ]
    }
}

pub fn execute(config: &RunnerConfig, format: OutputFormat) -> Result<bool> {
    let settings = Settings::load(&config.settings_path)?;
    let sources = fixture_sources(config)?;

    let rows: Vec<PlanRow> = plan(&sources, &settings, config.force_update)?
        .into_iter()
        .map(PlanRow::from)
        .collect();
    print_list(&rows, format);
    Ok(true)
}

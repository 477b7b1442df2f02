//! Run Command

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use apitest_common::{HttpApi, SqliteDb};
use apitest_runner::{
    CleanupPolicy, RunnerConfig, ScenarioOutcome, ScenarioReport, Settings, SuiteReport, TestRunner,
};

use crate::output::{print_document, print_list, test_line, OutputFormat, TableDisplay};

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Regenerate every golden file instead of comparing
    #[arg(long)]
    pub update: bool,

    /// Run a single scenario, by identity or fixture file name
    #[arg(long)]
    pub only: Option<String>,

    /// Base URL of the API under test
    #[arg(long, env = "APITEST_BASE_URL")]
    pub base_url: Option<String>,

    /// SQLite database behind the API
    #[arg(long, env = "APITEST_DATABASE")]
    pub database: Option<PathBuf>,

    /// Per-scenario timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Database cleanup after an aborted scenario (leave-dirty, always-reset)
    #[arg(long)]
    pub cleanup: Option<CleanupPolicy>,
}

impl RunArgs {
    /// Flags win over the configuration file
    pub fn apply(&self, config: &mut RunnerConfig) {
        if self.update {
            config.force_update = true;
        }
        if let Some(base_url) = &self.base_url {
            config.api.base_url = base_url.clone();
        }
        if let Some(database) = &self.database {
            config.database.path = database.clone();
        }
        if let Some(timeout) = self.timeout {
            config.scenario_timeout_secs = Some(timeout);
        }
        if let Some(cleanup) = self.cleanup {
            config.cleanup = cleanup;
        }
    }
}

/// Scenario summary row
#[derive(Serialize)]
pub struct ScenarioRow {
    pub id: String,
    pub outcome: ScenarioOutcome,
    pub stage: String,
    pub checks: String,
    pub failures: usize,
    pub duration_ms: u64,
}

impl From<&ScenarioReport> for ScenarioRow {
    fn from(report: &ScenarioReport) -> Self {
        let passed = report.checks.iter().filter(|c| c.passed()).count();
        Self {
            id: report.id.clone(),
            outcome: report.outcome,
            stage: report.final_stage.to_string(),
            checks: format!("{}/{}", passed, report.checks.len()),
            failures: report.failures.len(),
            duration_ms: report.duration_ms,
        }
    }
}

impl TableDisplay for ScenarioRow {
    fn headers() -> Vec<&'static str> {
        vec!["Scenario", "Outcome", "Stage", "Checks", "Failures", "Duration"]
    }

    fn row(&self) -> Vec<String> {
        let outcome = match self.outcome {
            ScenarioOutcome::Passed => "passed",
            ScenarioOutcome::Failed => "failed",
            ScenarioOutcome::Skipped => "skipped",
        };
        vec![
            self.id.clone(),
            outcome.to_string(),
            self.stage.clone(),
            self.checks.clone(),
            self.failures.to_string(),
            format!("{} ms", self.duration_ms),
        ]
    }
}

pub async fn execute(args: RunArgs, mut config: RunnerConfig, format: OutputFormat) -> Result<bool> {
    args.apply(&mut config);

    let settings = Settings::load(&config.settings_path)?;
    let api = HttpApi::new(config.http_config())?;
    let db = open_database(&config)?;

    let runner = TestRunner::new(Arc::new(api), Arc::new(db), settings, config);
    let suite = match &args.only {
        Some(name) => runner.run_only(name).await?,
        None => runner.run_all().await?,
    };
    runner.write_results(&suite)?;

    print_suite(&suite, format);
    Ok(suite.success())
}

fn open_database(config: &RunnerConfig) -> Result<SqliteDb> {
    let path = &config.database.path;
    let db = SqliteDb::open(path)
        .with_context(|| format!("cannot open database {}", path.display()))?;
    for (schema, file) in &config.database.attach {
        db.attach(schema, file)
            .with_context(|| format!("cannot attach {} as {}", file.display(), schema))?;
    }
    Ok(db)
}

fn print_suite(suite: &SuiteReport, format: OutputFormat) {
    if format.is_structured() {
        print_document(suite, format);
        return;
    }

    println!();
    println!("running {} scenario(s)", suite.total);
    for scenario in &suite.scenarios {
        println!("{}", test_line(&scenario.id, scenario.outcome));
    }

    let failed: Vec<&ScenarioReport> = suite
        .scenarios
        .iter()
        .filter(|s| s.outcome == ScenarioOutcome::Failed)
        .collect();
    if !failed.is_empty() {
        println!();
        println!("failures:");
        println!();
        for scenario in &failed {
            println!("---- {} ----", scenario.id);
            for failure in &scenario.failures {
                println!("{}", failure);
            }
            println!();
        }
        println!("failures:");
        for scenario in &failed {
            println!("    {}", scenario.id);
        }
    }

    println!();
    println!("{}", summary_line(suite));

    if format == OutputFormat::Table {
        let rows: Vec<ScenarioRow> = suite.scenarios.iter().map(ScenarioRow::from).collect();
        println!();
        print_list(&rows, format);
    }
}

fn summary_line(suite: &SuiteReport) -> String {
    format!(
        "test result: {}. {} passed; {} failed; {} ignored; finished in {:.2}s",
        if suite.success() { "ok" } else { "FAILED" },
        suite.passed,
        suite.failed,
        suite.skipped,
        suite.duration_ms as f64 / 1000.0
    )
}

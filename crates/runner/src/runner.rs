//! Main test runner that drives each fixture through reset, seed, execute and verify

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use apitest_common::{ApiClient, ApiResponse, DbClient};

use crate::config::RunnerConfig;
use crate::error::{FixtureError, GoldenError, RunnerError, RunnerResult};
use crate::fixture::{Fixture, ScenarioId};
use crate::golden::{body_golden_path, table_golden_path, GoldenReport, GoldenVerifier};
use crate::report::{ScenarioOutcome, ScenarioReport, StatusCheck, SuiteReport};
use crate::settings::{classify, Classification, Settings};
use crate::stage::{Stage, Transition};

/// Label of the response body check in reports
pub const BODY_LABEL: &str = "api response";

/// What a scenario carries between stages
struct ScenarioRun {
    stage: Stage,
    classification: Classification,
    update: bool,
    response: Option<ApiResponse>,
    report: ScenarioReport,
}

impl ScenarioRun {
    fn passed(&mut self, detail: Option<String>) -> Transition {
        match &detail {
            Some(detail) => info!(" - {} OK ({})", self.stage, detail),
            None => info!(" - {} OK", self.stage),
        }
        self.report.checkpoint(self.stage, true, detail);
        Transition::Proceed
    }

    fn aborted(&mut self, message: String) -> Transition {
        error!(" - {} FAILED: {}", self.stage, message);
        self.report.checkpoint(self.stage, false, Some(message.clone()));
        self.report.fail(self.stage, message);
        Transition::Abort
    }

    fn record_check(&mut self, check: GoldenReport) {
        for message in check.failure_messages() {
            self.report.fail(self.stage, message);
        }
        self.report.checks.push(check);
    }
}

/// Fixture-driven API test runner
pub struct TestRunner {
    api: Arc<dyn ApiClient>,
    db: Arc<dyn DbClient>,
    settings: Settings,
    config: RunnerConfig,
    verifier: GoldenVerifier,
}

impl TestRunner {
    pub fn new(
        api: Arc<dyn ApiClient>,
        db: Arc<dyn DbClient>,
        settings: Settings,
        config: RunnerConfig,
    ) -> Self {
        Self {
            api,
            db,
            settings,
            config,
            verifier: GoldenVerifier::new(),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run every fixture in the fixture directory
    pub async fn run_all(&self) -> RunnerResult<SuiteReport> {
        let sources = Fixture::discover(&self.config.fixture_dir)?;
        self.run_sources(&sources).await
    }

    /// Run the one fixture named by identity or file name
    pub async fn run_only(&self, name: &str) -> RunnerResult<SuiteReport> {
        let sources: Vec<PathBuf> = Fixture::discover(&self.config.fixture_dir)?
            .into_iter()
            .filter(|path| {
                ScenarioId::from_path(path)
                    .map(|id| id.matches(name))
                    .unwrap_or(false)
            })
            .collect();

        if sources.is_empty() {
            return Err(RunnerError::Config(format!(
                "no fixture named {:?} in {}",
                name,
                self.config.fixture_dir.display()
            )));
        }
        self.run_sources(&sources).await
    }

    /// Run fixtures in the given order. A fixture that fails to load, or
    /// repeats an identity already seen, is a failed scenario; only golden
    /// write failures stop the run.
    pub async fn run_sources(&self, sources: &[PathBuf]) -> RunnerResult<SuiteReport> {
        let start = Instant::now();
        let mut reports = Vec::with_capacity(sources.len());
        let mut seen = BTreeMap::new();

        info!("Running {} scenario(s)...", sources.len());

        for path in sources {
            let loaded = Fixture::load(path).and_then(|f| claim_identity(&mut seen, path, f));
            let report = match loaded {
                Ok(fixture) => self.run_fixture(&fixture).await?,
                Err(e) => {
                    error!("✗ {} - {}", path.display(), e);
                    ScenarioReport::load_failure(path, &e)
                }
            };
            reports.push(report);
        }

        let suite = SuiteReport::from_reports(reports, start.elapsed().as_millis() as u64);

        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            suite.passed, suite.failed, suite.skipped, suite.duration_ms
        );

        Ok(suite)
    }

    /// Run a single loaded fixture through the pipeline
    pub async fn run_fixture(&self, fixture: &Fixture) -> RunnerResult<ScenarioReport> {
        let start = Instant::now();
        debug!("Running scenario: {} ({})", fixture.id, fixture.name);

        let update = self.config.force_update || self.settings.is_update_target(&fixture.id);
        let mut report = ScenarioReport::new(
            fixture.id.as_str(),
            fixture.name.clone(),
            fixture.source.clone(),
        );
        report.update_golden = update;

        let mut run = ScenarioRun {
            stage: Stage::Loaded,
            classification: classify(&fixture.id, &self.settings),
            update,
            response: None,
            report,
        };

        match self.config.scenario_timeout() {
            Some(limit) => {
                let timed = timeout(limit, self.drive(fixture, &mut run)).await;
                match timed {
                    Ok(result) => result?,
                    Err(_) => {
                        run.aborted(format!("timed out after {} s", limit.as_secs_f64()));
                        run.stage = run.stage.transition(Transition::Abort, self.config.cleanup);
                        self.drive(fixture, &mut run).await?;
                    }
                }
            }
            None => self.drive(fixture, &mut run).await?,
        }

        let mut report = run.report;
        report.duration_ms = start.elapsed().as_millis() as u64;
        report.finish(run.stage);

        match report.outcome {
            ScenarioOutcome::Passed => info!("✓ {} ({} ms)", report.id, report.duration_ms),
            ScenarioOutcome::Failed => error!(
                "✗ {} - {} failure(s), first: {}",
                report.id,
                report.failures.len(),
                report
                    .failures
                    .first()
                    .map(|f| f.to_string())
                    .unwrap_or_default()
            ),
            ScenarioOutcome::Skipped => {}
        }

        Ok(report)
    }

    /// Advance the state machine until it reaches a terminal stage
    async fn drive(&self, fixture: &Fixture, run: &mut ScenarioRun) -> Result<(), GoldenError> {
        while !run.stage.is_terminal() {
            let transition = match run.stage {
                Stage::Loaded => self.enter(fixture, run),
                Stage::ResetBefore | Stage::ResetAfter => self.reset(fixture, run).await,
                Stage::Seeding => self.seed(fixture, run).await,
                Stage::Executing => self.execute(fixture, run).await,
                Stage::Verifying => self.verify(fixture, run).await?,
                Stage::SpecWritten => self.write_specification(fixture, run),
                Stage::Done | Stage::Skipped => Transition::Proceed,
            };
            run.stage = run.stage.transition(transition, self.config.cleanup);
        }
        Ok(())
    }

    fn enter(&self, fixture: &Fixture, run: &mut ScenarioRun) -> Transition {
        match run.classification {
            Classification::Skip(reason) => {
                info!("Skipping {}: {}", fixture.id, reason);
                run.report.skip_reason = Some(reason);
                Transition::Skip
            }
            Classification::WhitelistOnly => {
                info!("Running {} (whitelisted)", fixture.id);
                Transition::Proceed
            }
            Classification::Run => {
                info!("Running {}", fixture.id);
                Transition::Proceed
            }
        }
    }

    async fn reset(&self, fixture: &Fixture, run: &mut ScenarioRun) -> Transition {
        match self.db.reset(&fixture.reset).await {
            Ok(()) => run.passed(None),
            Err(e) => run.aborted(e.to_string()),
        }
    }

    async fn seed(&self, fixture: &Fixture, run: &mut ScenarioRun) -> Transition {
        let mut rows = 0;
        for item in &fixture.setup {
            let target = item.target();
            if let Err(e) = self.db.bulk_insert(&target, &item.body).await {
                return run.aborted(format!("{}: {}", target, e));
            }
            rows += item.body.len();
        }
        run.passed(Some(format!("{} row(s)", rows)))
    }

    async fn execute(&self, fixture: &Fixture, run: &mut ScenarioRun) -> Transition {
        let request = &fixture.execute;
        match self.api.execute(request).await {
            Ok(response) => {
                let detail = format!("{} {} -> {}", request.method, request.path, response.status);
                run.response = Some(response);
                run.passed(Some(detail))
            }
            Err(e) => run.aborted(format!("{} {}: {}", request.method, request.path, e)),
        }
    }

    /// Every check runs; mismatches are recorded without stopping. Only a
    /// failed table fetch aborts.
    async fn verify(&self, fixture: &Fixture, run: &mut ScenarioRun) -> Result<Transition, GoldenError> {
        let expectations = &fixture.verification;
        let failures_before = run.report.failures.len();

        let Some(response) = run.response.take() else {
            return Ok(run.aborted("no response to verify".to_string()));
        };

        let status = StatusCheck {
            expected: expectations.http_status,
            actual: response.status,
        };
        if !status.passed() {
            let message = format!(
                "HttpStatus mismatch: expected {}, got {}",
                status.expected, status.actual
            );
            warn!(" - {}", message);
            run.report.fail(run.stage, message);
        }
        run.report.status_check = Some(status);

        if expectations.checks_body() {
            let excludes = expectations
                .result
                .as_ref()
                .map(|r| r.excludes.as_slice())
                .unwrap_or_default();
            let golden_path = body_golden_path(&self.config.golden_dir, &fixture.id);
            let check = self.verifier.verify(
                &response.body,
                &golden_path,
                run.update,
                excludes,
                BODY_LABEL,
            )?;
            run.record_check(check);
        }

        for table in &expectations.tables {
            let target = table.target();
            let actual = match self.db.fetch_all(&target).await {
                Ok(actual) => actual,
                Err(e) => return Ok(run.aborted(format!("fetch {}: {}", target, e))),
            };
            let golden_path = table_golden_path(&self.config.golden_dir, &fixture.id, &target);
            let check = self.verifier.verify(
                &actual,
                &golden_path,
                run.update,
                &table.excludes,
                &format!("table:: {}", target),
            )?;
            run.record_check(check);
        }

        let failed = run.report.failures.len() - failures_before;
        if failed == 0 {
            Ok(run.passed(None))
        } else {
            error!(" - {} FAILED ({} problem(s))", run.stage, failed);
            run.report
                .checkpoint(run.stage, false, Some(format!("{} problem(s)", failed)));
            Ok(Transition::Proceed)
        }
    }

    /// Best effort; never changes the outcome
    fn write_specification(&self, fixture: &Fixture, run: &mut ScenarioRun) -> Transition {
        let path = specification_path(&self.config.spec_dir, &fixture.id);
        match fixture.write_specification(&path) {
            Ok(()) => run.passed(Some(path.display().to_string())),
            Err(e) => {
                warn!(" - {} not written: {}", run.stage, e);
                run.report.checkpoint(run.stage, false, Some(e.to_string()));
                Transition::Proceed
            }
        }
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &SuiteReport) -> RunnerResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.results_path();
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

/// `{id}.md`
pub fn specification_path(dir: &Path, id: &ScenarioId) -> PathBuf {
    dir.join(format!("{}.md", id))
}

/// Fixtures sharing an identity would share golden and specification files.
/// The first one in run order keeps it.
fn claim_identity<'a>(
    seen: &mut BTreeMap<String, &'a Path>,
    path: &'a Path,
    fixture: Fixture,
) -> Result<Fixture, FixtureError> {
    if let Some(first) = seen.get(fixture.id.as_str()) {
        return Err(FixtureError::Invalid {
            id: fixture.id.to_string(),
            reason: format!("duplicate scenario identity, already defined by {}", first.display()),
        });
    }
    seen.insert(fixture.id.to_string(), path);
    Ok(fixture)
}

/// What a run would do with one fixture, without touching anything
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub id: String,
    pub source: PathBuf,
    pub classification: Classification,
    pub update_golden: bool,
}

/// Classify fixtures by file name alone
pub fn plan(sources: &[PathBuf], settings: &Settings, force_update: bool) -> RunnerResult<Vec<PlanEntry>> {
    sources
        .iter()
        .map(|source| -> RunnerResult<PlanEntry> {
            let id = ScenarioId::from_path(source)?;
            Ok(PlanEntry {
                id: id.to_string(),
                source: source.clone(),
                classification: classify(&id, settings),
                update_golden: force_update || settings.is_update_target(&id),
            })
        })
        .collect()
}

/// Render specification documents without running anything. One result
/// per source: the written document, or why it could not be written.
pub fn write_specifications(
    sources: &[PathBuf],
    spec_dir: &Path,
) -> Vec<Result<PathBuf, FixtureError>> {
    let mut seen = BTreeMap::new();
    sources
        .iter()
        .map(|source| -> Result<PathBuf, FixtureError> {
            let fixture = claim_identity(&mut seen, source, Fixture::load(source)?)?;
            let path = specification_path(spec_dir, &fixture.id);
            fixture.write_specification(&path)?;
            debug!("Wrote {}", path.display());
            Ok(path)
        })
        .collect()
}

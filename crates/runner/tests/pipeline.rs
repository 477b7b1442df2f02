//! End-to-end runs of the orchestrator against a real SQLite database and a
//! scripted API.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tempfile::TempDir;

use apitest_common::{
    ApiClient, ApiResponse, DbClient, Error, Request, Result, Row, SqliteDb, TableRef,
};
use apitest_runner::{
    plan, write_specifications, CleanupPolicy, Classification, RunnerConfig, RunnerError,
    ScenarioOutcome, Settings, SkipReason, Stage, TestRunner,
};

type CallLog = Arc<Mutex<Vec<String>>>;

struct ScriptedApi {
    log: CallLog,
    response: Mutex<ApiResponse>,
    fail: Mutex<bool>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedApi {
    fn respond(&self, status: u16, body: Value) {
        *self.response.lock() = ApiResponse { status, body };
    }
}

#[async_trait]
impl ApiClient for ScriptedApi {
    async fn execute(&self, request: &Request) -> Result<ApiResponse> {
        self.log
            .lock()
            .push(format!("execute {} {}", request.method, request.path));

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let fail = *self.fail.lock();
        if fail {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        let response = self.response.lock().clone();
        Ok(response)
    }
}

/// SQLite-backed database that records every call
struct RecordingDb {
    inner: SqliteDb,
    log: CallLog,
    fail_insert: Mutex<bool>,
    fail_fetch: Mutex<bool>,
    /// Resets that succeed before every further reset fails; `None` never fails
    reset_budget: Mutex<Option<usize>>,
}

#[async_trait]
impl DbClient for RecordingDb {
    async fn reset(&self, targets: &[TableRef]) -> Result<()> {
        let names: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
        self.log.lock().push(format!("reset {}", names.join(",")));
        {
            let mut budget = self.reset_budget.lock();
            match *budget {
                Some(0) => return Err(Error::InvalidConfig("database is read-only".to_string())),
                Some(n) => *budget = Some(n - 1),
                None => {}
            }
        }
        self.inner.reset(targets).await
    }

    async fn bulk_insert(&self, target: &TableRef, rows: &[Row]) -> Result<()> {
        self.log
            .lock()
            .push(format!("insert {} ({})", target, rows.len()));
        let fail = *self.fail_insert.lock();
        if fail {
            return Err(Error::InvalidRow {
                table: target.to_string(),
                reason: "constraint violation".to_string(),
            });
        }
        self.inner.bulk_insert(target, rows).await
    }

    async fn fetch_all(&self, target: &TableRef) -> Result<Value> {
        self.log.lock().push(format!("fetch {}", target));
        let fail = *self.fail_fetch.lock();
        if fail {
            return Err(Error::InvalidConfig("database went away".to_string()));
        }
        self.inner.fetch_all(target).await
    }
}

const ORDERS: &str = r#"
name: order lookup
reset:
  - { schema: public, table: orders }
setup:
  - schema: public
    table: orders
    body:
      - { id: 1, status: NEW }
execute:
  method: GET
  path: /orders/1
verification:
  httpStatus: 200
  result: { isCheck: true, excludes: [updatedAt] }
  tables:
    - { schema: public, table: orders }
"#;

const USERS: &str = r#"
execute:
  method: GET
  path: /users/1
verification:
  httpStatus: 200
"#;

const MISSING_TABLE: &str = r#"
reset:
  - { schema: public, table: nope }
execute:
  method: GET
  path: /nope
verification:
  httpStatus: 200
"#;

struct Harness {
    dir: TempDir,
    log: CallLog,
    api: Arc<ScriptedApi>,
    db: Arc<RecordingDb>,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("fixture")).unwrap();

        let log: CallLog = Arc::new(Mutex::new(Vec::new()));

        let inner = SqliteDb::open_memory().unwrap();
        inner.attach("public", ":memory:").unwrap();
        inner
            .execute_batch(
                "CREATE TABLE public.orders (id INTEGER PRIMARY KEY, status TEXT NOT NULL);",
            )
            .unwrap();

        let api = Arc::new(ScriptedApi {
            log: log.clone(),
            response: Mutex::new(ApiResponse {
                status: 200,
                body: order_body("NEW", "2024-01-01T00:00:00Z"),
            }),
            fail: Mutex::new(false),
            delay: Mutex::new(None),
        });
        let db = Arc::new(RecordingDb {
            inner,
            log: log.clone(),
            fail_insert: Mutex::new(false),
            fail_fetch: Mutex::new(false),
            reset_budget: Mutex::new(None),
        });

        Self { dir, log, api, db }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    fn config(&self) -> RunnerConfig {
        RunnerConfig {
            fixture_dir: self.path("fixture"),
            golden_dir: self.path("golden"),
            spec_dir: self.path("testspec"),
            settings_path: self.path("testSetting.yaml"),
            output_dir: self.path("results"),
            ..RunnerConfig::default()
        }
    }

    fn fixture(&self, file_name: &str, yaml: &str) -> PathBuf {
        let path = self.path("fixture").join(file_name);
        std::fs::write(&path, yaml).unwrap();
        path
    }

    fn runner(&self, settings: &str, config: RunnerConfig) -> TestRunner {
        TestRunner::new(
            self.api.clone(),
            self.db.clone(),
            Settings::from_yaml(settings).unwrap(),
            config,
        )
    }

    /// Calls made so far, clearing the log
    fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.lock())
    }

    fn order_rows(&self) -> usize {
        self.db
            .inner
            .select_all(&TableRef::new("public", "orders"))
            .unwrap()
            .len()
    }

    /// Run once in update mode so verify runs have golden files to compare with
    async fn record_goldens(&self) {
        let suite = self
            .runner("updateGolden: [orders]\n", self.config())
            .run_all()
            .await
            .unwrap();
        assert!(suite.success(), "{:#?}", suite);
        self.take_calls();
    }
}

fn order_body(status: &str, updated_at: &str) -> Value {
    json!({"id": 1, "status": status, "updatedAt": updated_at})
}

fn read_json(path: PathBuf) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_orders_scenario_end_to_end() {
    let h = Harness::new();
    h.fixture("orders.yaml", ORDERS);
    h.record_goldens().await;

    assert_eq!(
        read_json(h.path("golden/orders.golden")),
        order_body("NEW", "2024-01-01T00:00:00Z")
    );
    assert_eq!(
        read_json(h.path("golden/orders-public-orders.golden")),
        json!([{"id": 1, "status": "NEW"}])
    );

    // Only the excluded field differs
    h.api.respond(200, order_body("NEW", "2025-06-30T12:00:00Z"));
    let runner = h.runner("", h.config());
    let suite = runner.run_all().await.unwrap();
    let orders = suite.scenario("orders").unwrap();
    assert_eq!(orders.outcome, ScenarioOutcome::Passed, "{:#?}", orders.failures);
    assert_eq!(orders.name, "order lookup");
    assert!(!orders.update_golden);
    assert_eq!(orders.checks.len(), 2);
    assert_eq!(
        h.take_calls(),
        vec![
            "reset public.orders",
            "insert public.orders (1)",
            "execute GET /orders/1",
            "fetch public.orders",
            "reset public.orders",
        ]
    );
    assert_eq!(h.order_rows(), 0);

    let stages: Vec<Stage> = orders.checkpoints.iter().map(|c| c.stage).collect();
    assert_eq!(
        stages,
        vec![
            Stage::ResetBefore,
            Stage::Seeding,
            Stage::Executing,
            Stage::Verifying,
            Stage::SpecWritten,
            Stage::ResetAfter,
        ]
    );

    // A real difference fails
    h.api.respond(200, order_body("PAID", "2025-06-30T12:00:00Z"));
    let suite = runner.run_all().await.unwrap();
    let orders = suite.scenario("orders").unwrap();
    assert_eq!(orders.outcome, ScenarioOutcome::Failed);
    assert_eq!(orders.failures.len(), 1);
    assert_eq!(orders.failures[0].stage, Stage::Verifying);
    assert!(orders.failures[0].message.starts_with("api response: status"));
    assert!(orders.reached(Stage::ResetAfter));
}

#[tokio::test]
async fn test_update_mode_overwrites_and_passes() {
    let h = Harness::new();
    h.fixture("orders.yaml", ORDERS);
    std::fs::create_dir_all(h.path("golden")).unwrap();
    std::fs::write(h.path("golden/orders.golden"), "{\"stale\": true}\n").unwrap();

    h.api.respond(200, order_body("SHIPPED", "t"));
    let suite = h
        .runner("updateGolden: [orders.yaml]\n", h.config())
        .run_all()
        .await
        .unwrap();
    assert!(suite.success());
    assert!(suite.scenario("orders").unwrap().update_golden);
    assert_eq!(read_json(h.path("golden/orders.golden")), order_body("SHIPPED", "t"));

    // The fresh golden verifies cleanly
    let suite = h.runner("", h.config()).run_all().await.unwrap();
    assert!(suite.success());
}

#[tokio::test]
async fn test_force_update_from_config() {
    let h = Harness::new();
    h.fixture("orders.yaml", ORDERS);

    let config = RunnerConfig {
        force_update: true,
        ..h.config()
    };
    let suite = h.runner("", config).run_all().await.unwrap();
    assert!(suite.success());
    assert!(h.path("golden/orders-public-orders.golden").exists());
}

#[tokio::test]
async fn test_missing_golden_fails_verification() {
    let h = Harness::new();
    h.fixture("orders.yaml", ORDERS);

    let suite = h.runner("", h.config()).run_all().await.unwrap();
    let orders = suite.scenario("orders").unwrap();
    assert_eq!(orders.outcome, ScenarioOutcome::Failed);
    assert_eq!(orders.failures.len(), 2);
    assert!(orders
        .failures
        .iter()
        .all(|f| f.message.contains("golden file not found")));
}

#[tokio::test]
async fn test_wip_scenario_never_touches_collaborators() {
    let h = Harness::new();
    h.fixture("orders.yaml", ORDERS);

    let suite = h
        .runner("wipList: [orders]\nupdateGolden: [orders]\n", h.config())
        .run_all()
        .await
        .unwrap();

    let orders = suite.scenario("orders").unwrap();
    assert_eq!(orders.outcome, ScenarioOutcome::Skipped);
    assert_eq!(orders.skip_reason, Some(SkipReason::WorkInProgress));
    assert_eq!(orders.final_stage, Stage::Skipped);
    assert!(orders.checkpoints.is_empty());
    assert!(suite.success());
    assert!(h.take_calls().is_empty());
    assert!(!h.path("golden").exists());
    assert!(!h.path("testspec/orders.md").exists());
}

#[tokio::test]
async fn test_partial_run_only_runs_whitelist() {
    let h = Harness::new();
    h.fixture("orders.yaml", ORDERS);
    h.fixture("users.yaml", USERS);

    let suite = h
        .runner("partialTest: true\nwhiteList: [users]\n", h.config())
        .run_all()
        .await
        .unwrap();

    assert_eq!((suite.total, suite.passed, suite.skipped), (2, 1, 1));
    assert_eq!(
        suite.scenario("orders").unwrap().skip_reason,
        Some(SkipReason::NotWhitelisted)
    );
    assert_eq!(
        h.take_calls(),
        vec!["reset ", "execute GET /users/1", "reset "]
    );
}

#[tokio::test]
async fn test_parse_failure_is_recorded_and_run_continues() {
    let h = Harness::new();
    h.fixture("broken.yaml", "execute: [not, a, request]\n");
    h.fixture("users.yaml", USERS);

    let suite = h.runner("", h.config()).run_all().await.unwrap();
    assert_eq!((suite.total, suite.passed, suite.failed), (2, 1, 1));

    let broken = suite.scenario("broken").unwrap();
    assert_eq!(broken.outcome, ScenarioOutcome::Failed);
    assert_eq!(broken.failures[0].stage, Stage::Loaded);
    assert!(broken.failures[0].message.contains("broken.yaml"));
    assert!(!broken.reached(Stage::ResetBefore));

    // Only the users scenario reached the collaborators
    assert!(h.take_calls().iter().all(|c| !c.contains("orders")));
}

#[tokio::test]
async fn test_execute_failure_leaves_tables_dirty() {
    let h = Harness::new();
    h.fixture("orders.yaml", ORDERS);
    *h.api.fail.lock() = true;

    let suite = h.runner("", h.config()).run_all().await.unwrap();
    let orders = suite.scenario("orders").unwrap();
    assert_eq!(orders.outcome, ScenarioOutcome::Failed);
    assert_eq!(orders.failures[0].stage, Stage::Executing);
    assert!(orders.failures[0].message.contains("connection refused"));
    assert!(!orders.reached(Stage::ResetAfter));
    assert!(!orders.reached(Stage::SpecWritten));

    assert_eq!(
        h.take_calls(),
        vec![
            "reset public.orders",
            "insert public.orders (1)",
            "execute GET /orders/1",
        ]
    );
    assert_eq!(h.order_rows(), 1);
}

#[tokio::test]
async fn test_always_reset_cleans_up_after_execute_failure() {
    let h = Harness::new();
    h.fixture("orders.yaml", ORDERS);
    *h.api.fail.lock() = true;

    let config = RunnerConfig {
        cleanup: CleanupPolicy::AlwaysReset,
        ..h.config()
    };
    let suite = h.runner("", config).run_all().await.unwrap();
    let orders = suite.scenario("orders").unwrap();
    assert_eq!(orders.outcome, ScenarioOutcome::Failed);
    assert!(orders.reached(Stage::ResetAfter));
    assert_eq!(h.take_calls().last().unwrap(), "reset public.orders");
    assert_eq!(h.order_rows(), 0);
}

#[tokio::test]
async fn test_seed_failure_skips_execute() {
    let h = Harness::new();
    h.fixture("orders.yaml", ORDERS);
    *h.db.fail_insert.lock() = true;

    let suite = h.runner("", h.config()).run_all().await.unwrap();
    let orders = suite.scenario("orders").unwrap();
    assert_eq!(orders.failures[0].stage, Stage::Seeding);
    assert!(orders.failures[0].message.contains("public.orders"));
    assert_eq!(
        h.take_calls(),
        vec!["reset public.orders", "insert public.orders (1)"]
    );
}

#[tokio::test]
async fn test_status_mismatch_keeps_verifying_and_resets() {
    let h = Harness::new();
    h.fixture("orders.yaml", ORDERS);
    h.record_goldens().await;

    h.api.respond(500, order_body("NEW", "later"));
    let suite = h.runner("", h.config()).run_all().await.unwrap();
    let orders = suite.scenario("orders").unwrap();

    assert_eq!(orders.outcome, ScenarioOutcome::Failed);
    assert_eq!(orders.failures.len(), 1);
    assert_eq!(
        orders.failures[0].message,
        "HttpStatus mismatch: expected 200, got 500"
    );
    let status = orders.status_check.unwrap();
    assert_eq!((status.expected, status.actual), (200, 500));
    assert_eq!(orders.checks.len(), 2);
    assert!(orders.checks.iter().all(|c| c.passed()));
    assert!(orders.reached(Stage::ResetAfter));
    assert!(h.path("testspec/orders.md").exists());
}

#[tokio::test]
async fn test_table_fetch_failure_aborts() {
    let h = Harness::new();
    h.fixture("orders.yaml", ORDERS);
    h.record_goldens().await;
    *h.db.fail_fetch.lock() = true;

    let suite = h.runner("", h.config()).run_all().await.unwrap();
    let orders = suite.scenario("orders").unwrap();
    assert_eq!(orders.outcome, ScenarioOutcome::Failed);
    assert_eq!(orders.final_stage, Stage::Done);
    assert!(orders.failures[0].message.contains("fetch public.orders"));
    assert!(!orders.reached(Stage::ResetAfter));
    assert_eq!(h.take_calls().last().unwrap(), "fetch public.orders");
}

#[tokio::test]
async fn test_scenario_timeout_aborts_and_resets_when_asked() {
    let h = Harness::new();
    h.fixture("orders.yaml", ORDERS);
    *h.api.delay.lock() = Some(Duration::from_secs(10));

    let config = RunnerConfig {
        scenario_timeout_secs: Some(1),
        cleanup: CleanupPolicy::AlwaysReset,
        ..h.config()
    };
    let suite = h.runner("", config).run_all().await.unwrap();
    let orders = suite.scenario("orders").unwrap();

    assert_eq!(orders.outcome, ScenarioOutcome::Failed);
    assert_eq!(orders.failures[0].stage, Stage::Executing);
    assert!(orders.failures[0].message.contains("timed out"));
    assert!(orders.reached(Stage::ResetAfter));
    assert_eq!(h.order_rows(), 0);
}

#[tokio::test]
async fn test_golden_write_failure_stops_the_run() {
    let h = Harness::new();
    h.fixture("orders.yaml", ORDERS);
    std::fs::write(h.path("golden"), "not a directory").unwrap();

    let result = h
        .runner("updateGolden: [orders]\n", h.config())
        .run_all()
        .await;
    assert!(matches!(result, Err(RunnerError::Golden(_))));
}

#[tokio::test]
async fn test_specification_write_failure_keeps_outcome_and_resets() {
    let h = Harness::new();
    h.fixture("orders.yaml", ORDERS);
    h.record_goldens().await;
    std::fs::remove_dir_all(h.path("testspec")).unwrap();
    std::fs::write(h.path("testspec"), "not a directory").unwrap();

    let suite = h.runner("", h.config()).run_all().await.unwrap();
    let orders = suite.scenario("orders").unwrap();
    assert_eq!(orders.outcome, ScenarioOutcome::Passed, "{:#?}", orders.failures);
    assert!(orders.failures.is_empty());

    let spec = orders
        .checkpoints
        .iter()
        .find(|c| c.stage == Stage::SpecWritten)
        .unwrap();
    assert!(!spec.ok);
    assert!(orders.reached(Stage::ResetAfter));
    assert_eq!(h.take_calls().last().unwrap(), "reset public.orders");
    assert_eq!(h.order_rows(), 0);
}

#[tokio::test]
async fn test_reset_before_failure_fails_only_that_scenario() {
    let h = Harness::new();
    h.fixture("missing.yaml", MISSING_TABLE);
    h.fixture("users.yaml", USERS);

    let config = RunnerConfig {
        cleanup: CleanupPolicy::AlwaysReset,
        ..h.config()
    };
    let suite = h.runner("", config).run_all().await.unwrap();
    assert_eq!((suite.total, suite.passed, suite.failed), (2, 1, 1));

    let missing = suite.scenario("missing").unwrap();
    assert_eq!(missing.outcome, ScenarioOutcome::Failed);
    assert_eq!(missing.final_stage, Stage::Done);
    assert_eq!(missing.failures.len(), 1);
    assert_eq!(missing.failures[0].stage, Stage::ResetBefore);
    assert!(missing.failures[0].message.contains("nope"));
    assert!(!missing.reached(Stage::Seeding));
    assert!(!missing.reached(Stage::ResetAfter));

    assert_eq!(
        suite.scenario("users").unwrap().outcome,
        ScenarioOutcome::Passed
    );
    assert_eq!(
        h.take_calls(),
        vec!["reset public.nope", "reset ", "execute GET /users/1", "reset "]
    );
}

#[tokio::test]
async fn test_reset_after_failure_fails_the_scenario() {
    let h = Harness::new();
    h.fixture("orders.yaml", ORDERS);
    h.record_goldens().await;
    *h.db.reset_budget.lock() = Some(1);

    let suite = h.runner("", h.config()).run_all().await.unwrap();
    let orders = suite.scenario("orders").unwrap();
    assert_eq!(orders.outcome, ScenarioOutcome::Failed);
    assert_eq!(orders.final_stage, Stage::Done);
    assert_eq!(orders.failures.len(), 1);
    assert_eq!(orders.failures[0].stage, Stage::ResetAfter);
    assert!(orders.failures[0].message.contains("read-only"));
    assert!(orders.checks.iter().all(|c| c.passed()));

    // Seeded rows stay behind
    assert_eq!(h.order_rows(), 1);
}

#[tokio::test]
async fn test_duplicate_identity_fails_later_fixture() {
    let h = Harness::new();
    let sources = vec![
        h.fixture(
            "orders.json",
            r#"{"execute": {"method": "GET", "path": "/users/1"}, "verification": {"httpStatus": 200}}"#,
        ),
        h.fixture("orders.yaml", ORDERS),
    ];

    let suite = h.runner("", h.config()).run_all().await.unwrap();
    assert_eq!((suite.total, suite.passed, suite.failed), (2, 1, 1));

    let first = &suite.scenarios[0];
    assert_eq!(first.source.as_deref(), Some(sources[0].as_path()));
    assert_eq!(first.outcome, ScenarioOutcome::Passed);

    let second = &suite.scenarios[1];
    assert_eq!(second.id, "orders");
    assert_eq!(second.outcome, ScenarioOutcome::Failed);
    assert_eq!(second.failures[0].stage, Stage::Loaded);
    assert!(second.failures[0]
        .message
        .contains("duplicate scenario identity"));
    assert!(second.failures[0].message.contains("orders.json"));

    // The later fixture never reached the collaborators
    assert_eq!(
        h.take_calls(),
        vec!["reset ", "execute GET /users/1", "reset "]
    );

    let written = write_specifications(&sources, &h.path("specs"));
    assert!(written[0].is_ok());
    assert!(written[1].is_err());
}

#[tokio::test]
async fn test_run_only_selects_one_fixture() {
    let h = Harness::new();
    h.fixture("orders.yaml", ORDERS);
    h.fixture("users.yaml", USERS);

    let runner = h.runner("", h.config());
    let suite = runner.run_only("users.yaml").await.unwrap();
    assert_eq!(suite.total, 1);
    assert_eq!(suite.scenarios[0].id, "users");

    assert!(matches!(
        runner.run_only("nope").await,
        Err(RunnerError::Config(_))
    ));
}

#[tokio::test]
async fn test_results_file_is_written() {
    let h = Harness::new();
    h.fixture("users.yaml", USERS);

    let runner = h.runner("", h.config());
    let suite = runner.run_all().await.unwrap();
    let path = runner.write_results(&suite).unwrap();

    assert_eq!(path, h.path("results/test-results.json"));
    let written = read_json(path);
    assert_eq!(written["total"], 1);
    assert_eq!(written["scenarios"][0]["outcome"], "passed");
}

#[tokio::test]
async fn test_specification_documents_are_deterministic() {
    let h = Harness::new();
    let sources = vec![h.fixture("orders.yaml", ORDERS)];
    let spec_dir = h.path("testspec");

    let first = write_specifications(&sources, &spec_dir);
    assert!(first[0].is_ok());
    let rendered = std::fs::read(spec_dir.join("orders.md")).unwrap();

    write_specifications(&sources, &spec_dir);
    assert_eq!(std::fs::read(spec_dir.join("orders.md")).unwrap(), rendered);

    // A run writes the same document
    std::fs::remove_file(spec_dir.join("orders.md")).unwrap();
    h.runner("", h.config()).run_all().await.unwrap();
    assert_eq!(std::fs::read(spec_dir.join("orders.md")).unwrap(), rendered);
}

#[test]
fn test_plan_classifies_without_running() {
    let h = Harness::new();
    let sources = vec![
        h.fixture("draft.yaml", USERS),
        h.fixture("orders.yaml", ORDERS),
        h.fixture("users.yaml", USERS),
    ];
    let settings = Settings::from_yaml(
        "wipList: [draft]\npartialTest: true\nwhiteList: [draft, orders]\nupdateGolden: [orders]\n",
    )
    .unwrap();

    let entries = plan(&sources, &settings, false).unwrap();
    let decisions: Vec<(&str, Classification, bool)> = entries
        .iter()
        .map(|e| (e.id.as_str(), e.classification, e.update_golden))
        .collect();
    assert_eq!(
        decisions,
        vec![
            ("draft", Classification::Skip(SkipReason::WorkInProgress), false),
            ("orders", Classification::WhitelistOnly, true),
            ("users", Classification::Skip(SkipReason::NotWhitelisted), false),
        ]
    );
    assert!(h.take_calls().is_empty());
}

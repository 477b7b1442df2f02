//! apitest runner
//!
//! Fixture-driven golden-file testing for database-backed HTTP APIs:
//! - Parses one declarative YAML fixture per scenario
//! - Resets and seeds database tables before each call
//! - Executes the request and compares status, response body and table
//!   contents with golden files, ignoring excluded paths
//! - Regenerates golden files on demand and writes a specification document
//!   per scenario
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        TestRunner                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  classify(id, settings) -> Run | WhitelistOnly | Skip       │
//! │  per scenario:                                              │
//! │    reset(before) -> setup -> execute -> verification        │
//! │      -> specification -> reset(after)                       │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │  ApiClient (HttpApi)         │  DbClient (SqliteDb)         │
//! │    execute(request)          │    reset / bulk_insert /     │
//! │                              │    fetch_all                 │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │  GoldenVerifier                                             │
//! │    update: write canonical JSON                             │
//! │    verify: diff(expected, actual, excludes) -> mismatches   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod diff;
pub mod error;
pub mod fixture;
pub mod golden;
pub mod report;
pub mod runner;
pub mod settings;
pub mod stage;

pub use config::RunnerConfig;
pub use diff::{diff, ExcludePath, Mismatch, MismatchKind};
pub use error::{FixtureError, GoldenError, RunnerError, RunnerResult, SettingsError};
pub use fixture::{Fixture, ScenarioId};
pub use golden::{GoldenReport, GoldenStatus, GoldenVerifier};
pub use report::{ScenarioOutcome, ScenarioReport, SuiteReport};
pub use runner::{plan, write_specifications, PlanEntry, TestRunner};
pub use settings::{classify, Classification, Settings, SkipReason};
pub use stage::{CleanupPolicy, Stage, Transition};

//! CLI Commands

pub mod init;
pub mod plan;
pub mod run;
pub mod spec;

use anyhow::Result;
use std::path::PathBuf;

use apitest_runner::{Fixture, RunnerConfig};

/// Fixture files in the configured directory
pub(crate) fn fixture_sources(config: &RunnerConfig) -> Result<Vec<PathBuf>> {
    Ok(Fixture::discover(&config.fixture_dir)?)
}

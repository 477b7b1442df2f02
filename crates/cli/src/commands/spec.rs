//! Spec Command

use anyhow::Result;

use apitest_runner::{write_specifications, RunnerConfig};

use super::fixture_sources;
use crate::output::{print_error, print_success, print_warning};

pub fn execute(config: &RunnerConfig) -> Result<bool> {
    let sources = fixture_sources(config)?;
    if sources.is_empty() {
        print_warning(&format!("No fixtures in {}", config.fixture_dir.display()));
        return Ok(true);
    }

    let mut ok = true;
    for result in write_specifications(&sources, &config.spec_dir) {
        match result {
            Ok(path) => print_success(&format!("Wrote {}", path.display())),
            Err(e) => {
                print_error(&e.to_string());
                ok = false;
            }
        }
    }
    Ok(ok)
}

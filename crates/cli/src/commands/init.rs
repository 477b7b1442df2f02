//! Init Config Command

use anyhow::{bail, Result};
use clap::Args;
use std::path::Path;

use apitest_runner::RunnerConfig;

use crate::output::print_success;

#[derive(Args, Debug)]
pub struct InitConfigArgs {
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

pub fn execute(args: InitConfigArgs, path: &Path) -> Result<bool> {
    if path.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    RunnerConfig::default().save(path)?;
    print_success(&format!("Wrote default configuration to {}", path.display()));
    Ok(true)
}

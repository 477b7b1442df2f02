//! Per-scenario pipeline state machine
//!
//! ```text
//! LOADED ─skip─▶ SKIPPED
//!   │
//!   ▼
//! RESET_BEFORE ─abort─▶ DONE
//!   ▼
//! SEEDING ─abort─┐
//!   ▼            │
//! EXECUTING ─abort─┤  LeaveDirty  ─▶ DONE
//!   ▼            │   AlwaysReset ─▶ RESET_AFTER
//! VERIFYING ─abort─┘
//!   ▼
//! SPEC_WRITTEN ─▶ RESET_AFTER ─▶ DONE
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Loaded,
    Skipped,
    ResetBefore,
    Seeding,
    Executing,
    Verifying,
    SpecWritten,
    ResetAfter,
    Done,
}

/// Result of running the work attached to a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Proceed,
    /// Only meaningful on entry; elsewhere it is the same as `Proceed`
    Skip,
    Abort,
}

/// Whether a scenario that aborts after seeding started still resets its tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupPolicy {
    /// Leave the tables as the failure left them so they can be inspected
    #[default]
    LeaveDirty,
    AlwaysReset,
}

impl FromStr for CleanupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leave-dirty" => Ok(CleanupPolicy::LeaveDirty),
            "always-reset" => Ok(CleanupPolicy::AlwaysReset),
            other => Err(format!(
                "unknown cleanup policy {:?} (expected leave-dirty or always-reset)",
                other
            )),
        }
    }
}

impl fmt::Display for CleanupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CleanupPolicy::LeaveDirty => "leave-dirty",
            CleanupPolicy::AlwaysReset => "always-reset",
        })
    }
}

impl Stage {
    pub fn transition(self, transition: Transition, cleanup: CleanupPolicy) -> Stage {
        use Stage::*;
        use Transition::*;

        let after_abort = match cleanup {
            CleanupPolicy::LeaveDirty => Done,
            CleanupPolicy::AlwaysReset => ResetAfter,
        };

        match (self, transition) {
            (Loaded, Skip) => Skipped,
            (Loaded, Abort) => Done,
            (Loaded, Proceed) => ResetBefore,
            (ResetBefore, Abort) => Done,
            (ResetBefore, _) => Seeding,
            (Seeding, Abort) | (Executing, Abort) | (Verifying, Abort) => after_abort,
            (Seeding, _) => Executing,
            (Executing, _) => Verifying,
            (Verifying, _) => SpecWritten,
            (SpecWritten, _) => ResetAfter,
            (ResetAfter, _) => Done,
            (Done, _) => Done,
            (Skipped, _) => Skipped,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Skipped)
    }

    /// Checkpoint name used in logs and reports
    pub fn label(self) -> &'static str {
        match self {
            Stage::Loaded => "load",
            Stage::Skipped => "skipped",
            Stage::ResetBefore => "reset(before)",
            Stage::Seeding => "setupTable",
            Stage::Executing => "execute",
            Stage::Verifying => "verification",
            Stage::SpecWritten => "specification",
            Stage::ResetAfter => "reset(after)",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

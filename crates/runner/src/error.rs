//! Error types for the orchestrator

use std::path::PathBuf;
use thiserror::Error;

/// A fixture that cannot be read or does not describe a runnable scenario.
/// Fatal for that scenario only.
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("cannot read fixture {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse fixture {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid fixture {id}: {reason}")]
    Invalid { id: String, reason: String },

    #[error("cannot write specification {}: {source}", path.display())]
    WriteSpecification {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Settings problems abort the whole run
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("cannot read settings {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse settings {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Golden file write failures abort the whole run
#[derive(Error, Debug)]
pub enum GoldenError {
    #[error("cannot write golden file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialize golden value: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Run-level errors
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Golden(#[from] GoldenError),

    #[error(transparent)]
    Fixture(#[from] FixtureError),

    #[error("cannot list fixtures in {}: {source}", dir.display())]
    Discover {
        dir: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub type RunnerResult<T> = Result<T, RunnerError>;

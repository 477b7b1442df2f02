//! Runner configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use apitest_common::HttpConfig;

use crate::error::RunnerResult;
use crate::stage::CleanupPolicy;

/// Runner configuration, usually `apitest.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// One fixture file per scenario
    pub fixture_dir: PathBuf,

    /// Golden snapshots
    pub golden_dir: PathBuf,

    /// Generated specification documents
    pub spec_dir: PathBuf,

    /// Selection policy file
    pub settings_path: PathBuf,

    /// Output directory for results
    pub output_dir: PathBuf,

    /// Treat every scenario as a golden update target
    pub force_update: bool,

    /// Wall-clock limit for one scenario; none by default
    pub scenario_timeout_secs: Option<u64>,

    /// What happens to the database when a scenario aborts mid-way
    pub cleanup: CleanupPolicy,

    /// API under test
    pub api: ApiConfig,

    /// Database behind the API
    pub database: DatabaseConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            fixture_dir: PathBuf::from("testdata/fixture"),
            golden_dir: PathBuf::from("testdata/golden"),
            spec_dir: PathBuf::from("testdata/testspec"),
            settings_path: PathBuf::from("testdata/testSetting.yaml"),
            output_dir: PathBuf::from("test-results"),
            force_update: false,
            scenario_timeout_secs: None,
            cleanup: CleanupPolicy::default(),
            api: ApiConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,

    /// Per-request timeout
    pub timeout_secs: u64,

    /// Sent with every request
    pub headers: BTreeMap<String, String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout_secs: 30,
            headers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Primary database file (schema `main`)
    pub path: PathBuf,

    /// Extra schemas: name to database file
    pub attach: BTreeMap<String, PathBuf>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("app.db"),
            attach: BTreeMap::new(),
        }
    }
}

impl RunnerConfig {
    /// Load configuration from file, or defaults when it does not exist
    pub fn load(path: &Path) -> RunnerResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> RunnerResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn scenario_timeout(&self) -> Option<Duration> {
        self.scenario_timeout_secs.map(Duration::from_secs)
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            base_url: self.api.base_url.clone(),
            timeout: Duration::from_secs(self.api.timeout_secs),
            default_headers: self.api.headers.clone(),
        }
    }

    /// `{output_dir}/test-results.json`
    pub fn results_path(&self) -> PathBuf {
        self.output_dir.join("test-results.json")
    }
}

use crate::supervisor::SupervisorSettings;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from stallwatch.toml.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct StallwatchConfig {
    pub job: JobConfig,
    pub watchdog: WatchdogConfig,
    pub harness: HarnessConfig,
}

/// The supervised job. `{size}` in args is replaced by the problem size and
/// `{env:NAME}` by the value of `NAME` in `env`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct JobConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchdogConfig {
    pub stall_timeout_secs: u64,
    pub grace_period_secs: u64,
    pub poll_interval_ms: u64,
    pub drain_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Problem sizes, run in order until one fails.
    pub sizes: Vec<u32>,
    /// Where to write `run-<size>.json` reports. No export when unset.
    pub report_dir: Option<PathBuf>,
}

/// Errors from loading or validating the config file.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl StallwatchConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.job.command.trim().is_empty() {
            return Err(ConfigError::Invalid("job.command is empty".to_string()));
        }
        if self.watchdog.stall_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "watchdog.stall_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.watchdog.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "watchdog.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.harness.sizes.is_empty() {
            return Err(ConfigError::Invalid("harness.sizes is empty".to_string()));
        }
        Ok(())
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.watchdog.stall_timeout_secs)
    }

    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            poll_interval: Duration::from_millis(self.watchdog.poll_interval_ms),
            grace_period: Duration::from_secs(self.watchdog.grace_period_secs),
            drain_timeout: Duration::from_secs(self.watchdog.drain_timeout_secs),
            ..SupervisorSettings::default()
        }
    }
}

// --- Default implementations ---

impl Default for JobConfig {
    fn default() -> Self {
        let args = [
            "mimic_direct_extract.py",
            "--duckdb_database",
            "{env:MIMIC_DB_PATH}",
            "--extract_notes",
            "0",
            "--out_path",
            "{env:OUTPUT_DIR}",
            "--resource_path",
            "./resources/",
            "--queries_path",
            "./SQL_Queries/",
            "--duckdb_schema_name",
            "main",
            "--pop_size",
            "{size}",
            "--plot_hist",
            "0",
        ];
        Self {
            command: "python3".to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: BTreeMap::from([
                ("MIMIC_DB_PATH".to_string(), "data/mimic3.db".to_string()),
                ("OUTPUT_DIR".to_string(), "output".to_string()),
            ]),
            working_dir: None,
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            stall_timeout_secs: 30,
            grace_period_secs: 2,
            poll_interval_ms: 100,
            drain_timeout_secs: 5,
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            sizes: vec![20, 21],
            report_dir: None,
        }
    }
}

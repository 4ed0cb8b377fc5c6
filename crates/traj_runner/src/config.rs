//! Runner configuration, loadable from a JSON file.
//!
//! Every field has a default, so `{}` is a valid configuration:
//!
//! ```json
//! {
//!   "mode": { "kind": "pooled", "workers": 4 },
//!   "admission_poll_ms": 100,
//!   "fail_fast": false,
//!   "progress": true,
//!   "admission": { "min_available_mb": 512, "max_cpu_percent": 90.0 }
//! }
//! ```

use std::fs;
use std::io;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Index order on the calling thread.
    #[default]
    Sequential,
    /// Bounded worker pool. `workers: 0` means one per available core.
    Pooled { workers: usize },
}

impl ExecutionMode {
    pub fn pooled(workers: usize) -> Self {
        Self::Pooled { workers }
    }

    /// Slots the pool gets; sequential mode counts as one.
    pub fn worker_slots(&self) -> usize {
        match *self {
            Self::Sequential => 1,
            Self::Pooled { workers: 0 } => std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            Self::Pooled { workers } => workers,
        }
    }
}

/// Thresholds for the system resource probe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdmissionLimits {
    /// Minimum available memory, in MiB, before a new run is dispatched.
    #[serde(default)]
    pub min_available_mb: u64,
    /// Maximum global CPU usage, in percent.
    #[serde(default = "default_max_cpu_percent")]
    pub max_cpu_percent: f32,
}

fn default_max_cpu_percent() -> f32 {
    100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub mode: ExecutionMode,
    /// How long to wait before asking the admission gate again.
    pub admission_poll_ms: u64,
    /// Abort the exploration after the first failed run.
    pub fail_fast: bool,
    /// Draw a progress bar on stderr.
    pub progress: bool,
    /// Resource thresholds; `None` admits unconditionally.
    pub admission: Option<AdmissionLimits>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Sequential,
            admission_poll_ms: 100,
            fail_fast: false,
            progress: false,
            admission: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read runner config: {0}")]
    Io(#[from] io::Error),
    #[error("invalid runner config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid runner config: {0}")]
    Invalid(String),
}

impl RunnerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.admission_poll_ms == 0 {
            return Err(ConfigError::Invalid(
                "admission_poll_ms must be positive".to_string(),
            ));
        }
        if let Some(limits) = &self.admission {
            if !(0.0..=100.0).contains(&limits.max_cpu_percent) {
                return Err(ConfigError::Invalid(format!(
                    "max_cpu_percent must be within 0..=100, got {}",
                    limits.max_cpu_percent
                )));
            }
        }
        Ok(())
    }

    pub fn admission_poll(&self) -> Duration {
        Duration::from_millis(self.admission_poll_ms)
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = RunnerConfig::from_json_str("{}").expect("defaults");
        assert_eq!(config, RunnerConfig::default());
        assert_eq!(config.mode.worker_slots(), 1);
    }

    #[test]
    fn test_pooled_mode_from_json() {
        let config = RunnerConfig::from_json_str(
            r#"{"mode": {"kind": "pooled", "workers": 3}, "fail_fast": true,
                "admission": {"min_available_mb": 256}}"#,
        )
        .expect("parse");
        assert_eq!(config.mode, ExecutionMode::pooled(3));
        assert_eq!(config.mode.worker_slots(), 3);
        assert!(config.fail_fast);
        assert_eq!(
            config.admission,
            Some(AdmissionLimits {
                min_available_mb: 256,
                max_cpu_percent: 100.0,
            })
        );
    }

    #[test]
    fn test_zero_workers_means_available_cores() {
        assert!(ExecutionMode::pooled(0).worker_slots() >= 1);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            RunnerConfig::from_json_str(r#"{"admission_poll_ms": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RunnerConfig::from_json_str(r#"{"admission": {"max_cpu_percent": 250.0}}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RunnerConfig::from_json_str(r#"{"mode": {"kind": "forked"}}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("runner.json");
        fs::write(&path, r#"{"progress": true}"#).expect("write config");
        let config = RunnerConfig::from_json_file(&path).expect("load");
        assert!(config.progress);
        assert!(RunnerConfig::from_json_file(dir.path().join("missing.json")).is_err());
    }
}

//! Worker configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables of the simulation worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    /// Share of the remaining cook window that stepping may use.
    pub pacing_ratio: f64,
    /// Lower bound of the adaptive step count.
    pub min_steps: u32,
    /// Upper bound of the adaptive step count.
    pub max_steps: u32,
    /// Step count used before any step duration has been measured.
    pub fallback_steps: u32,
    /// Max queued status events before new ones are dropped.
    pub status_capacity: usize,
    /// Name of the worker thread.
    pub thread_name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pacing_ratio: 0.66,
            min_steps: 1,
            max_steps: 100,
            fallback_steps: 100,
            status_capacity: 64,
            thread_name: "foldsim-worker".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Parses and validates a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Validate the configuration.
    ///
    /// This must be called before starting a worker with a hand-built config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.pacing_ratio > 0.0 && self.pacing_ratio <= 1.0) {
            return Err(ConfigError::Invalid {
                field: "pacing_ratio",
                reason: format!("must be in (0, 1], got {}", self.pacing_ratio),
            });
        }
        if self.min_steps == 0 {
            return Err(ConfigError::Invalid {
                field: "min_steps",
                reason: "must be > 0".to_string(),
            });
        }
        if self.max_steps < self.min_steps {
            return Err(ConfigError::Invalid {
                field: "max_steps",
                reason: format!("must be >= min_steps ({})", self.min_steps),
            });
        }
        if !(self.min_steps..=self.max_steps).contains(&self.fallback_steps) {
            return Err(ConfigError::Invalid {
                field: "fallback_steps",
                reason: format!("must be in [{}, {}]", self.min_steps, self.max_steps),
            });
        }
        if self.status_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "status_capacity",
                reason: "must be > 0".to_string(),
            });
        }
        if self.thread_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "thread_name",
                reason: "cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::frame::{Facing, Normalization, Resolution};
use crate::store::DEFAULT_MAX_EXAMPLES_PER_LABEL;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// How the recording loop chooses which label to collect for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum CollectionPolicy {
    /// Hold-to-record: collect for one label until stopped or full.
    #[default]
    Manual,
    /// Collect `samples_per_label` for each label in turn, then stop.
    RoundRobin { samples_per_label: usize },
}

impl CollectionPolicy {
    pub fn round_robin() -> Self {
        CollectionPolicy::RoundRobin { samples_per_label: 20 }
    }
}

/// Session settings. Every field has a default, so a config file only needs the overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_examples_per_label: usize,
    pub record_interval_ms: u64,
    pub predict_interval_ms: u64,
    /// Delay before retrying after a failed prediction cycle.
    pub backoff_interval_ms: u64,
    pub max_consecutive_failures: u32,
    /// Enter prediction automatically when recording stops and two labels are trained.
    pub auto_predict: bool,
    pub collection: CollectionPolicy,
    /// Neighbours consulted by the default k-NN classifier.
    pub k: usize,
    pub normalization: Normalization,
    pub resolution: Resolution,
    pub facing: Facing,
    /// Mirror every captured frame left to right before it is embedded.
    pub mirror: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_examples_per_label: DEFAULT_MAX_EXAMPLES_PER_LABEL,
            record_interval_ms: 100,
            predict_interval_ms: 200,
            backoff_interval_ms: 500,
            max_consecutive_failures: 5,
            auto_predict: true,
            collection: CollectionPolicy::Manual,
            k: 3,
            normalization: Normalization::default(),
            resolution: Resolution::default(),
            facing: Facing::User,
            mirror: false,
        }
    }
}

impl SessionConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_examples_per_label == 0 {
            return Err(ConfigError::Invalid("max_examples_per_label must be at least 1".into()));
        }
        if self.record_interval_ms == 0 || self.predict_interval_ms == 0 || self.backoff_interval_ms == 0 {
            return Err(ConfigError::Invalid("loop intervals must be greater than zero".into()));
        }
        if self.max_consecutive_failures == 0 {
            return Err(ConfigError::Invalid("max_consecutive_failures must be at least 1".into()));
        }
        if self.k == 0 {
            return Err(ConfigError::Invalid("k must be at least 1".into()));
        }
        if self.normalization.scale == 0.0 || !self.normalization.scale.is_finite() {
            return Err(ConfigError::Invalid("normalization scale must be a non-zero number".into()));
        }
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(ConfigError::Invalid("resolution must be non-zero".into()));
        }
        if let CollectionPolicy::RoundRobin { samples_per_label: 0 } = self.collection {
            return Err(ConfigError::Invalid("samples_per_label must be at least 1".into()));
        }
        Ok(())
    }

    pub fn record_interval(&self) -> Duration {
        Duration::from_millis(self.record_interval_ms)
    }

    pub fn predict_interval(&self) -> Duration {
        Duration::from_millis(self.predict_interval_ms)
    }

    pub fn backoff_interval(&self) -> Duration {
        Duration::from_millis(self.backoff_interval_ms)
    }
}

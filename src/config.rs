//! Engine configuration, loaded from JSON with every field defaulted.

use crate::error::{DesignError, DesignResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub max_iterations: u32,
    /// Objective evaluation cap; `None` means 1000 per free parameter
    pub max_evaluations: Option<usize>,
    /// Relative decrease per cycle below which the search stops
    pub function_tolerance: f64,
    /// Brent iterations per line search
    pub line_search_iterations: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            max_evaluations: None,
            function_tolerance: 1e-4,
            line_search_iterations: 100,
        }
    }
}

/// Acceptance window around the target.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceConfig {
    pub frequency_ghz: f64,
    pub bandwidth_mhz: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            frequency_ghz: 0.03,
            bandwidth_mhz: 15.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrainConfig {
    pub min_samples: usize,
    pub interval: usize,
    pub hidden_layers: Vec<usize>,
    pub epochs: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for RetrainConfig {
    fn default() -> Self {
        Self {
            min_samples: 12,
            interval: 8,
            hidden_layers: vec![64, 32],
            epochs: 300,
            learning_rate: 0.01,
            seed: 42,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub ledger_path: PathBuf,
    pub retrain_marker_path: PathBuf,
    pub correction_model_path: PathBuf,
    /// How long an append waits for the ledger lock before giving up
    pub lock_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from("feedback/feedback_log.csv"),
            retrain_marker_path: PathBuf::from("feedback/retrain_state.json"),
            correction_model_path: PathBuf::from("models/correction/correction_model.json"),
            lock_timeout_ms: 2000,
        }
    }
}

impl StorageConfig {
    /// All three files under one directory, with default file names.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            ledger_path: dir.join("feedback_log.csv"),
            retrain_marker_path: dir.join("retrain_state.json"),
            correction_model_path: dir.join("correction_model.json"),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignConfig {
    pub optimizer: OptimizerConfig,
    pub tolerance: ToleranceConfig,
    /// Autocorrector damping in [0, 1]
    pub damping: f64,
    pub max_attempts: u32,
    pub retrain: RetrainConfig,
    pub storage: StorageConfig,
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self {
            optimizer: OptimizerConfig::default(),
            tolerance: ToleranceConfig::default(),
            damping: 0.6,
            max_attempts: 5,
            retrain: RetrainConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl DesignConfig {
    pub fn from_json_str(json: &str) -> DesignResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DesignError::Config(format!("malformed configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> DesignResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| DesignError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> DesignResult<()> {
        let bad = |msg: String| Err(DesignError::Config(msg));

        if self.optimizer.max_iterations == 0 {
            return bad("optimizer.max_iterations must be at least 1".into());
        }
        if self.optimizer.max_evaluations == Some(0) {
            return bad("optimizer.max_evaluations must be at least 1".into());
        }
        if !(self.optimizer.function_tolerance.is_finite() && self.optimizer.function_tolerance >= 0.0) {
            return bad(format!(
                "optimizer.function_tolerance must be non-negative, got {}",
                self.optimizer.function_tolerance
            ));
        }
        if !(self.tolerance.frequency_ghz.is_finite() && self.tolerance.frequency_ghz > 0.0) {
            return bad(format!(
                "tolerance.frequency_ghz must be positive, got {}",
                self.tolerance.frequency_ghz
            ));
        }
        if !(self.tolerance.bandwidth_mhz.is_finite() && self.tolerance.bandwidth_mhz > 0.0) {
            return bad(format!(
                "tolerance.bandwidth_mhz must be positive, got {}",
                self.tolerance.bandwidth_mhz
            ));
        }
        if !(0.0..=1.0).contains(&self.damping) {
            return bad(format!("damping must lie in [0, 1], got {}", self.damping));
        }
        if self.max_attempts == 0 {
            return bad("max_attempts must be at least 1".into());
        }
        if self.retrain.min_samples == 0 {
            return bad("retrain.min_samples must be at least 1".into());
        }
        if self.retrain.hidden_layers.is_empty() || self.retrain.hidden_layers.contains(&0) {
            return bad("retrain.hidden_layers must list non-zero layer widths".into());
        }
        if self.retrain.epochs == 0 {
            return bad("retrain.epochs must be at least 1".into());
        }
        if !(self.retrain.learning_rate.is_finite() && self.retrain.learning_rate > 0.0) {
            return bad(format!(
                "retrain.learning_rate must be positive, got {}",
                self.retrain.learning_rate
            ));
        }
        Ok(())
    }

    pub fn with_tolerance(mut self, frequency_ghz: f64, bandwidth_mhz: f64) -> Self {
        self.tolerance = ToleranceConfig {
            frequency_ghz,
            bandwidth_mhz,
        };
        self
    }

    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_retrain(mut self, retrain: RetrainConfig) -> Self {
        self.retrain = retrain;
        self
    }

    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }
}

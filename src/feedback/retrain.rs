use super::ledger::{FeedbackLedger, TrainingSample, FEATURE_COUNT, LABEL_COUNT};
use super::regressor::{FitOptions, Mlp, Standardizer};
use super::write_atomic;
use crate::config::{RetrainConfig, StorageConfig};
use crate::core::{ParameterVector, Target};
use crate::error::{DesignError, DesignResult};
use crate::surrogate::Prediction;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const CORRECTION_MODEL_VERSION: u32 = 1;

/// Ledger row count at the last successful refit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrainState {
    pub last_retrain_rows: usize,
}

impl RetrainState {
    /// Read the marker; a missing or corrupt marker means "never retrained".
    pub fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Self::default(),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "retrain marker unreadable");
                return Self::default();
            }
        };
        serde_json::from_str(&text).unwrap_or_else(|err| {
            tracing::warn!(path = %path.display(), error = %err, "retrain marker corrupt");
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> DesignResult<()> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| DesignError::Retrain(format!("encode marker: {}", e)))?;
        write_atomic(path, &bytes).map_err(|e| {
            DesignError::Retrain(format!("write marker {}: {}", path.display(), e))
        })
    }
}

/// Refitted feedback regressor with the statistics used to standardize its data.
///
/// Inputs are target frequency, target bandwidth and the six numeric
/// parameters; outputs are the measured frequency and bandwidth.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrectionModel {
    pub version: u32,
    pub layer_sizes: Vec<usize>,
    pub network: Mlp,
    pub input_scaler: Standardizer,
    pub output_scaler: Standardizer,
    pub trained_rows: usize,
    pub final_loss: f64,
}

impl CorrectionModel {
    pub fn train(
        samples: &[TrainingSample],
        rows: usize,
        config: &RetrainConfig,
    ) -> DesignResult<Self> {
        if samples.is_empty() {
            return Err(DesignError::Retrain("ledger has no usable rows".into()));
        }
        let features: Vec<Vec<f64>> = samples.iter().map(|s| s.features.to_vec()).collect();
        let labels: Vec<Vec<f64>> = samples.iter().map(|s| s.labels.to_vec()).collect();

        let input_scaler = Standardizer::fit(&features)?;
        let output_scaler = Standardizer::fit(&labels)?;
        let xs: Vec<Vec<f64>> = features.iter().map(|f| input_scaler.transform(f)).collect();
        let ys: Vec<Vec<f64>> = labels.iter().map(|l| output_scaler.transform(l)).collect();

        let mut layer_sizes = vec![FEATURE_COUNT];
        layer_sizes.extend(&config.hidden_layers);
        layer_sizes.push(LABEL_COUNT);

        let mut network = Mlp::new(&layer_sizes, config.seed)?;
        let report = network.fit(
            &xs,
            &ys,
            FitOptions {
                epochs: config.epochs,
                learning_rate: config.learning_rate,
            },
        )?;

        Ok(Self {
            version: CORRECTION_MODEL_VERSION,
            layer_sizes,
            network,
            input_scaler,
            output_scaler,
            trained_rows: rows,
            final_loss: report.final_loss,
        })
    }

    /// Measured outcome the feedback data predicts for this request.
    pub fn predict(&self, target: &Target, params: &ParameterVector) -> DesignResult<Prediction> {
        let mut features = Vec::with_capacity(FEATURE_COUNT);
        features.push(target.frequency_ghz);
        features.push(target.bandwidth_mhz);
        features.extend_from_slice(&params.numeric());

        let scaled = self.network.predict(&self.input_scaler.transform(&features))?;
        let out = self.output_scaler.inverse(&scaled);
        match out.as_slice() {
            [frequency_ghz, bandwidth_mhz] => Ok(Prediction {
                frequency_ghz: *frequency_ghz,
                bandwidth_mhz: *bandwidth_mhz,
            }),
            _ => Err(DesignError::Prediction(format!(
                "correction model produced {} outputs",
                out.len()
            ))),
        }
    }

    pub fn load(path: &Path) -> DesignResult<Self> {
        let text = fs::read_to_string(path)?;
        let model: Self = serde_json::from_str(&text)
            .map_err(|e| DesignError::Retrain(format!("decode {}: {}", path.display(), e)))?;
        if model.version != CORRECTION_MODEL_VERSION {
            return Err(DesignError::Retrain(format!(
                "unsupported correction model version {}",
                model.version
            )));
        }
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> DesignResult<()> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| DesignError::Retrain(format!("encode model: {}", e)))?;
        write_atomic(path, &bytes)
            .map_err(|e| DesignError::Retrain(format!("write model {}: {}", path.display(), e)))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    BelowMinimum { min_samples: usize },
    Cooldown { since_last: usize, interval: usize },
}

#[derive(Clone, Debug, PartialEq)]
pub enum RetrainOutcome {
    Skipped { rows: usize, reason: SkipReason },
    Retrained { rows: usize, samples: usize, final_loss: f64 },
    Failed { rows: usize, error: String },
}

impl RetrainOutcome {
    pub fn retrained(&self) -> bool {
        matches!(self, Self::Retrained { .. })
    }
}

/// Throttled refit of the [`CorrectionModel`] from ledger growth.
#[derive(Debug)]
pub struct RetrainScheduler {
    config: RetrainConfig,
    model_path: PathBuf,
    marker_path: PathBuf,
    state: RetrainState,
}

impl RetrainScheduler {
    pub fn new(
        config: RetrainConfig,
        model_path: impl Into<PathBuf>,
        marker_path: impl Into<PathBuf>,
        state: RetrainState,
    ) -> Self {
        Self {
            config,
            model_path: model_path.into(),
            marker_path: marker_path.into(),
            state,
        }
    }

    /// Scheduler over the configured files, resuming from the persisted marker.
    pub fn from_storage(config: RetrainConfig, storage: &StorageConfig) -> Self {
        let state = RetrainState::load(&storage.retrain_marker_path);
        Self::new(
            config,
            &storage.correction_model_path,
            &storage.retrain_marker_path,
            state,
        )
    }

    pub fn state(&self) -> RetrainState {
        self.state
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Why a ledger of `rows` rows would not be refit, if it would not.
    pub fn check(&self, rows: usize) -> Option<SkipReason> {
        if rows < self.config.min_samples {
            return Some(SkipReason::BelowMinimum {
                min_samples: self.config.min_samples,
            });
        }
        // A ledger shorter than the marker was replaced; count from zero.
        let since_last = rows
            .checked_sub(self.state.last_retrain_rows)
            .unwrap_or(rows);
        if since_last < self.config.interval {
            return Some(SkipReason::Cooldown {
                since_last,
                interval: self.config.interval,
            });
        }
        None
    }

    /// Refit if the ledger has grown enough. Never fails; errors become
    /// [`RetrainOutcome::Failed`] and leave the artifact and marker untouched.
    ///
    /// The row count is re-read first so appends from other processes count.
    pub fn maybe_retrain(&mut self, ledger: &mut FeedbackLedger) -> RetrainOutcome {
        let rows = ledger.refresh();
        if let Some(reason) = self.check(rows) {
            tracing::debug!(rows, ?reason, "retrain skipped");
            return RetrainOutcome::Skipped { rows, reason };
        }
        match self.retrain(ledger, rows) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(rows, error = %err, "correction model retrain failed");
                RetrainOutcome::Failed {
                    rows,
                    error: err.to_string(),
                }
            }
        }
    }

    fn retrain(&mut self, ledger: &FeedbackLedger, rows: usize) -> DesignResult<RetrainOutcome> {
        let snapshot = ledger.snapshot()?;
        let model = CorrectionModel::train(&snapshot.samples, rows, &self.config)?;
        model.save(&self.model_path)?;

        let next = RetrainState {
            last_retrain_rows: rows,
        };
        next.save(&self.marker_path)?;
        self.state = next;

        tracing::info!(
            rows,
            samples = snapshot.samples.len(),
            dropped = snapshot.dropped(),
            final_loss = model.final_loss,
            "correction model retrained"
        );
        Ok(RetrainOutcome::Retrained {
            rows,
            samples: snapshot.samples.len(),
            final_loss: model.final_loss,
        })
    }
}

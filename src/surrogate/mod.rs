//! Learned (or closed-form) models the optimizer searches against.
//!
//! The engine never looks inside a surrogate: it encodes a parameter vector the
//! way the models were trained (six raw numerics followed by a one-hot feed
//! type), calls [`ForwardSurrogate::predict`], and reads back frequency and
//! bandwidth. Which models exist is decided once, when a [`SurrogateSet`] is
//! built, and reported through [`Capabilities`].

pub mod analytic;
pub mod probe;

pub use analytic::{
    design_patch, design_patch_with, inset_depth, PatchDesign, TransmissionLineInverse,
    TransmissionLineSurrogate,
};
pub use probe::{probe_artifacts, ArtifactLayout, ArtifactLoader};

use crate::core::{
    CategoricalDecoding, NearestIndex, ParameterVector, Target, NUMERIC_PARAM_COUNT,
};
use crate::error::{DesignError, DesignResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Model input in training-time encoding.
#[derive(Clone, Debug, PartialEq)]
pub struct SurrogateInput {
    values: Vec<f64>,
}

impl SurrogateInput {
    /// Six numeric parameters followed by a one-hot vector of `label_count` entries.
    pub fn encode(params: &ParameterVector, feed_index: usize, label_count: usize) -> Self {
        let mut values = Vec::with_capacity(NUMERIC_PARAM_COUNT + label_count);
        values.extend_from_slice(&params.numeric());
        values.extend((0..label_count).map(|i| if i == feed_index { 1.0 } else { 0.0 }));
        Self { values }
    }

    pub fn numeric(&self) -> &[f64] {
        &self.values[..NUMERIC_PARAM_COUNT]
    }

    pub fn one_hot(&self) -> &[f64] {
        &self.values[NUMERIC_PARAM_COUNT..]
    }

    /// Index of the hot entry, if any.
    pub fn feed_index(&self) -> Option<usize> {
        self.one_hot().iter().position(|&v| v == 1.0)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub frequency_ghz: f64,
    pub bandwidth_mhz: f64,
}

/// Parameter vector -> (frequency, bandwidth).
pub trait ForwardSurrogate {
    fn predict(&self, input: &SurrogateInput) -> DesignResult<Prediction>;

    /// Label table for the one-hot feed-type columns, in column order.
    fn feed_labels(&self) -> &[String];

    /// Decode a feed-type index, falling back to the stringified index.
    fn decode_label(&self, index: usize) -> String {
        self.feed_labels()
            .get(index)
            .cloned()
            .unwrap_or_else(|| index.to_string())
    }
}

/// Initial design guess from a requested (frequency, bandwidth).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InversePrediction {
    pub parameters: ParameterVector,
    pub feed_type_label: String,
}

/// Target -> parameter vector.
pub trait InversePredictor {
    fn predict_parameters(&self, target: &Target) -> DesignResult<InversePrediction>;
}

/// Which surrogate directions are loaded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub forward: bool,
    pub inverse: bool,
}

/// Surrogates resolved once at startup and passed by reference afterwards.
#[derive(Default)]
pub struct SurrogateSet {
    forward: Option<Box<dyn ForwardSurrogate>>,
    inverse: Option<Box<dyn InversePredictor>>,
}

impl SurrogateSet {
    pub fn new(
        forward: Option<Box<dyn ForwardSurrogate>>,
        inverse: Option<Box<dyn InversePredictor>>,
    ) -> Self {
        Self { forward, inverse }
    }

    pub fn with_forward(forward: impl ForwardSurrogate + 'static) -> Self {
        Self::new(Some(Box::new(forward)), None)
    }

    /// Probe `model_dir` and load every complete bundle through `loader`.
    ///
    /// Incomplete bundles are never handed to the loader. A bundle that fails
    /// to load is logged and left unavailable.
    pub fn from_artifacts(
        model_dir: &Path,
        layout: &ArtifactLayout,
        loader: &dyn ArtifactLoader,
    ) -> Self {
        let found = probe_artifacts(model_dir, layout);
        let forward = if found.forward {
            loader
                .load_forward(model_dir)
                .inspect_err(|err| tracing::warn!(error = %err, "forward model failed to load"))
                .ok()
        } else {
            None
        };
        let inverse = if found.inverse {
            loader
                .load_inverse(model_dir)
                .inspect_err(|err| tracing::warn!(error = %err, "inverse model failed to load"))
                .ok()
        } else {
            None
        };
        let set = Self::new(forward, inverse);
        tracing::info!(capabilities = ?set.capabilities(), "surrogates resolved");
        set
    }

    pub fn with_inverse(mut self, inverse: impl InversePredictor + 'static) -> Self {
        self.inverse = Some(Box::new(inverse));
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            forward: self.forward.is_some(),
            inverse: self.inverse.is_some(),
        }
    }

    pub fn forward(&self) -> DesignResult<&dyn ForwardSurrogate> {
        self.forward.as_deref().ok_or_else(|| {
            DesignError::SurrogateUnavailable("forward model artifacts are not loaded".into())
        })
    }

    pub fn inverse(&self) -> DesignResult<&dyn InversePredictor> {
        self.inverse.as_deref().ok_or_else(|| {
            DesignError::SurrogateUnavailable("inverse model artifacts are not loaded".into())
        })
    }

    /// Initial parameter guess for a target.
    pub fn predict_input(&self, target: &Target) -> DesignResult<InversePrediction> {
        target.validate()?;
        self.inverse()?.predict_parameters(target)
    }

    /// Forward prediction for a full parameter vector.
    pub fn predict_output(&self, params: &ParameterVector) -> DesignResult<Prediction> {
        predict_with(self.forward()?, &NearestIndex, params)
    }
}

/// Encode `params` (decoding the feed type with `decoder`) and run the surrogate.
pub fn predict_with(
    surrogate: &dyn ForwardSurrogate,
    decoder: &dyn CategoricalDecoding,
    params: &ParameterVector,
) -> DesignResult<Prediction> {
    let labels = surrogate.feed_labels().len();
    let feed_index = decoder.decode(params.feed_type_raw(), labels);
    surrogate.predict(&SurrogateInput::encode(params, feed_index, labels))
}

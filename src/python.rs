use crate::config::OptimizerConfig;
use crate::core::{FixedSet, OptimizationResult, ParameterVector, Target, PARAM_COUNT};
use crate::error::{DesignError, DesignResult};
use crate::feedback::Autocorrector;
use crate::optimization::DesignOptimizer;
use crate::simulation::Measurement;
use crate::surrogate::{ForwardSurrogate, Prediction, SurrogateInput, SurrogateSet};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use std::collections::HashMap;

/// Forward surrogate backed by a Python callable taking the encoded input
/// list and returning `(frequency_GHz, bandwidth_MHz)`.
pub struct PyForwardSurrogate {
    model: PyObject,
    labels: Vec<String>,
}

impl PyForwardSurrogate {
    pub fn new(model: PyObject, labels: Vec<String>) -> Self {
        Self { model, labels }
    }
}

impl ForwardSurrogate for PyForwardSurrogate {
    fn predict(&self, input: &SurrogateInput) -> DesignResult<Prediction> {
        Python::with_gil(|py| {
            let out = self
                .model
                .call1(py, (input.as_slice().to_vec(),))
                .and_then(|value| value.extract::<(f64, f64)>(py))
                .map_err(|e| DesignError::Prediction(e.to_string()))?;
            Ok(Prediction {
                frequency_ghz: out.0,
                bandwidth_mhz: out.1,
            })
        })
    }

    fn feed_labels(&self) -> &[String] {
        &self.labels
    }
}

#[pyclass(name = "OptimizationResult")]
#[derive(Clone, Debug)]
pub struct PyOptimizationResult {
    inner: OptimizationResult,
}

#[pymethods]
impl PyOptimizationResult {
    #[getter]
    fn feed_type_label(&self) -> String {
        self.inner.feed_type_label.clone()
    }

    #[getter]
    fn success(&self) -> bool {
        self.inner.success
    }

    #[getter]
    fn objective(&self) -> f64 {
        self.inner.objective
    }

    #[getter]
    fn iterations(&self) -> u32 {
        self.inner.iterations
    }

    #[getter]
    fn evaluations(&self) -> usize {
        self.inner.evaluations
    }

    #[getter]
    fn message(&self) -> String {
        self.inner.message.clone()
    }

    /// Parameter values keyed by name, plus `substrate_W` and `substrate_L`.
    fn parameters(&self) -> HashMap<String, f64> {
        self.inner
            .named_values()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }

    fn __repr__(&self) -> String {
        format!(
            "OptimizationResult(feed_type='{}', success={}, objective={:.6})",
            self.inner.feed_type_label, self.inner.success, self.inner.objective
        )
    }
}

#[pyfunction]
#[pyo3(signature = (model, labels, frequency_ghz, bandwidth_mhz, fixed=None, max_iterations=1000))]
pub fn optimize_parameters(
    model: PyObject,
    labels: Vec<String>,
    frequency_ghz: f64,
    bandwidth_mhz: f64,
    fixed: Option<HashMap<String, f64>>,
    max_iterations: u32,
) -> PyResult<PyOptimizationResult> {
    let target = Target::new(frequency_ghz, bandwidth_mhz)?;
    let fixed = FixedSet::from_named(fixed.unwrap_or_default())?;
    let surrogates = SurrogateSet::with_forward(PyForwardSurrogate::new(model, labels));
    let optimizer = DesignOptimizer::new(OptimizerConfig {
        max_iterations,
        ..OptimizerConfig::default()
    });
    let inner = optimizer.optimize(&surrogates, &target, &fixed)?;
    Ok(PyOptimizationResult { inner })
}

/// Damped closed-form correction of a seven-value parameter list.
#[pyfunction]
#[pyo3(signature = (parameters, frequency_ghz, bandwidth_mhz, actual_ghz, actual_mhz=None, damping=0.6))]
pub fn autocorrect(
    parameters: Vec<f64>,
    frequency_ghz: f64,
    bandwidth_mhz: f64,
    actual_ghz: f64,
    actual_mhz: Option<f64>,
    damping: f64,
) -> PyResult<Vec<f64>> {
    let values = <[f64; PARAM_COUNT]>::try_from(parameters.as_slice()).map_err(|_| {
        PyValueError::new_err(format!(
            "expected {} parameters, got {}",
            PARAM_COUNT,
            parameters.len()
        ))
    })?;
    let target = Target::new(frequency_ghz, bandwidth_mhz)?;
    let measurement = Measurement {
        frequency_ghz: Some(actual_ghz),
        bandwidth_mhz: actual_mhz,
        s11_db: None,
    };
    let corrected = Autocorrector::new(damping)?.correct(
        &ParameterVector::new(values),
        &target,
        &measurement,
    );
    Ok(corrected.values().to_vec())
}

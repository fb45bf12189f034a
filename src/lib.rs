pub mod config;
pub mod core;
pub mod design;
pub mod error;
pub mod feedback;
pub mod logging;
pub mod optimization;
pub mod simulation;
pub mod surrogate;

#[cfg(feature = "python")]
mod python;

pub use config::{DesignConfig, OptimizerConfig, RetrainConfig, StorageConfig, ToleranceConfig};
pub use self::core::*;
pub use design::{AttemptReport, DesignLoop, DesignOutcome, DesignRequest, DesignStatus};
pub use error::{DesignError, DesignResult};
pub use feedback::{
    Autocorrector, FeedbackLedger, FeedbackRecord, RetrainOutcome, RetrainScheduler,
};
pub use optimization::DesignOptimizer;
pub use simulation::{BuildRequest, ExportingSimulator, Measurement, Simulator};
pub use surrogate::{ForwardSurrogate, InversePredictor, Prediction, SurrogateSet};

#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
#[pymodule]
fn antenna_designer(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<python::PyOptimizationResult>()?;
    m.add_function(wrap_pyfunction!(python::optimize_parameters, m)?)?;
    m.add_function(wrap_pyfunction!(python::autocorrect, m)?)?;
    Ok(())
}

use thiserror::Error;

pub type DesignResult<T> = Result<T, DesignError>;

/// Failures raised by the design engine.
///
/// Errors that make a design result meaningless (`InvalidParameter`,
/// `SurrogateUnavailable`, `Prediction`, `Config`) propagate to the caller.
/// Errors from the self-improvement machinery (`LedgerWrite`, `Retrain`) are
/// logged and swallowed by the design loop.
#[derive(Debug, Error)]
pub enum DesignError {
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("surrogate unavailable: {0}")]
    SurrogateUnavailable(String),

    #[error("surrogate prediction failed: {0}")]
    Prediction(String),

    #[error("could not parse simulator measurement: {0}")]
    MeasurementParse(String),

    #[error("failed to append feedback record: {0}")]
    LedgerWrite(String),

    #[error("correction model retraining failed: {0}")]
    Retrain(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("solver failed: {0}")]
    Solver(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DesignError {
    pub(crate) fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error ends the design request it occurred in.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameter { .. }
                | Self::SurrogateUnavailable(_)
                | Self::Prediction(_)
                | Self::Config(_)
                | Self::Solver(_)
        )
    }
}

#[cfg(feature = "python")]
impl From<DesignError> for pyo3::PyErr {
    fn from(err: DesignError) -> Self {
        pyo3::exceptions::PyValueError::new_err(err.to_string())
    }
}

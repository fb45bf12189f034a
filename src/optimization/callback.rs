use super::solvers::traits::OptimizationCallback;
use crate::error::DesignResult;

/// Iteration result for tracking optimization progress
#[derive(Debug, Clone)]
pub struct IterationResult {
    pub params: Vec<f64>,
    pub cost: f64,
}

/// Records the cost trajectory of a design search and traces it.
pub struct DesignProgressCallback {
    max_iterations: u32,
    iteration_count: u32,
    history: Vec<IterationResult>,
    param_names: Vec<&'static str>,
}

impl DesignProgressCallback {
    pub fn new(max_iterations: u32, param_names: Vec<&'static str>) -> Self {
        Self {
            max_iterations,
            iteration_count: 0,
            history: Vec::new(),
            param_names,
        }
    }

    /// Get iteration history
    pub fn history(&self) -> &[IterationResult] {
        &self.history
    }

    pub fn log_summary(&self, success: bool, stop_reason: &str) {
        let Some(last) = self.history.last() else {
            tracing::info!(success, stop_reason, "design search finished without iterating");
            return;
        };
        let params = self
            .param_names
            .iter()
            .zip(&last.params)
            .map(|(name, value)| format!("{}={:.6e}", name, value))
            .collect::<Vec<_>>()
            .join(", ");
        tracing::info!(
            success,
            stop_reason,
            iterations = self.history.len(),
            cost = last.cost,
            %params,
            "design search finished"
        );
    }
}

impl OptimizationCallback for DesignProgressCallback {
    fn on_iteration(&mut self, iteration: u32, params: &[f64], cost: f64) -> DesignResult<()> {
        self.iteration_count = iteration;
        self.history.push(IterationResult {
            params: params.to_vec(),
            cost,
        });
        tracing::debug!(iteration, cost, "optimizer cycle");
        Ok(())
    }

    fn should_stop(&self) -> bool {
        self.iteration_count >= self.max_iterations
    }
}

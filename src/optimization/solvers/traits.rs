use crate::error::DesignResult;

#[derive(Clone, Debug)]
pub struct SolverResult {
    pub success: bool,
    pub cost: f64,
    pub iterations: u32,
    pub message: String,
    pub params: Vec<f64>,
    pub cost_evals: usize,
}

/// Callback interface for optimization progress
pub trait OptimizationCallback {
    /// Called at each iteration with current parameters and cost
    fn on_iteration(&mut self, iteration: u32, params: &[f64], cost: f64) -> DesignResult<()>;

    /// Check if optimization should stop early
    fn should_stop(&self) -> bool {
        false
    }
}

/// Core problem definition - just the essentials
pub trait Problem {
    /// Evaluate cost for given parameters (calls the surrogate)
    fn cost(&self, params: &[f64]) -> DesignResult<f64>;

    /// Number of free parameters
    fn num_params(&self) -> usize;

    /// Initial parameter values
    fn initial_params(&self) -> &[f64];

    /// Parameter bounds (min, max) for each parameter
    fn bounds(&self) -> &[(f64, f64)];

    /// Project parameters onto the feasible set (modifies params in place)
    fn apply_constraints(&self, params: &mut [f64]) -> DesignResult<()>;
}

/// Solver interface - takes problem and callback
pub trait Solver {
    fn name(&self) -> &str;

    /// Solve the optimization problem with callback for progress tracking.
    ///
    /// `success` in the returned result must reflect the solver's own
    /// convergence test; hitting an iteration or evaluation cap is a failure.
    fn solve(
        &mut self,
        problem: &dyn Problem,
        callback: &mut dyn OptimizationCallback,
    ) -> DesignResult<SolverResult>;
}

#[inline]
pub(crate) fn clamp_to_bounds(params: &mut [f64], bounds: &[(f64, f64)]) {
    for (param, &(min, max)) in params.iter_mut().zip(bounds) {
        *param = param.clamp(min, max);
    }
}

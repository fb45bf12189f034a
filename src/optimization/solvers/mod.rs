mod powell;
pub mod traits;

pub use powell::PowellOptimizer;
pub use traits::{OptimizationCallback, Problem, Solver, SolverResult};

use crate::config::OptimizerConfig;

/// Build the direction-set solver for a problem with `num_params` free parameters.
///
/// Returns the solver and a short description of how it was configured.
pub fn select_solver(num_params: usize, config: &OptimizerConfig) -> (Box<dyn Solver>, String) {
    let max_evals = config.max_evaluations.unwrap_or(1000 * num_params.max(1));
    let solver = PowellOptimizer::new(config.max_iterations, config.function_tolerance)
        .with_max_evaluations(Some(max_evals))
        .with_line_search_iterations(config.line_search_iterations);
    let reason = format!(
        "{} params → Powell (max_iter={}, max_evals={}, ftol={:.1e})",
        num_params, config.max_iterations, max_evals, config.function_tolerance
    );
    (Box::new(solver), reason)
}

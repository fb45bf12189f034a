pub mod callback;
pub mod problem;
pub mod solvers;

pub use callback::DesignProgressCallback;
pub use problem::{objective, DesignProblem};
pub use solvers::{select_solver, PowellOptimizer};
pub use solvers::{OptimizationCallback, Problem, Solver, SolverResult};

use crate::config::OptimizerConfig;
use crate::core::{
    CategoricalDecoding, FixedSet, NearestIndex, OptimizationResult, ParamName, ParameterSpace,
    Partition, Target,
};
use crate::error::{DesignError, DesignResult};
use crate::surrogate::{ForwardSurrogate, SurrogateSet};

/// Searches the free design parameters against a forward surrogate.
pub struct DesignOptimizer {
    space: ParameterSpace,
    config: OptimizerConfig,
    decoder: Box<dyn CategoricalDecoding>,
}

impl Default for DesignOptimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

impl DesignOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            space: ParameterSpace::default(),
            config,
            decoder: Box::new(NearestIndex),
        }
    }

    /// Replace the rounding step that turns the searched feed type into a label index.
    pub fn with_decoder(mut self, decoder: impl CategoricalDecoding + 'static) -> Self {
        self.decoder = Box::new(decoder);
        self
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Optimize with the forward model of `surrogates`.
    ///
    /// Fails with `SurrogateUnavailable` when no forward model is loaded and
    /// with `InvalidParameter` when `fixed` does not fit the parameter space.
    pub fn optimize(
        &self,
        surrogates: &SurrogateSet,
        target: &Target,
        fixed: &FixedSet,
    ) -> DesignResult<OptimizationResult> {
        target.validate()?;
        let partition = self.space.partition(fixed)?;
        let surrogate = surrogates.forward()?;
        self.optimize_partition(surrogate, target, &partition)
    }

    pub fn optimize_partition(
        &self,
        surrogate: &dyn ForwardSurrogate,
        target: &Target,
        partition: &Partition,
    ) -> DesignResult<OptimizationResult> {
        let labels = surrogate.feed_labels().len();
        if let Some(&(_, value)) = partition
            .fixed()
            .iter()
            .find(|(name, _)| *name == ParamName::FeedType)
        {
            if value >= labels as f64 {
                return Err(DesignError::invalid(
                    ParamName::FeedType.as_str(),
                    format!("index {} but the forward model has {} feed labels", value, labels),
                ));
            }
        }

        let problem = DesignProblem::new(partition, *target, surrogate, self.decoder.as_ref());
        let mut callback =
            DesignProgressCallback::new(self.config.max_iterations, problem.free_names());
        let (mut solver, reason) = select_solver(partition.free_count(), &self.config);
        tracing::debug!(solver = solver.name(), %reason, "starting design search");

        let result = solver.solve(&problem, &mut callback)?;
        callback.log_summary(result.success, &result.message);

        let parameters = problem.full_vector(&result.params);
        let feed_type_label = surrogate.decode_label(parameters.feed_type_raw() as usize);

        Ok(OptimizationResult {
            parameters,
            feed_type_label,
            success: result.success,
            objective: result.cost,
            iterations: result.iterations,
            evaluations: result.cost_evals,
            message: result.message,
        })
    }
}

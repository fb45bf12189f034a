use super::traits::{clamp_to_bounds, OptimizationCallback, Problem, Solver, SolverResult};
use crate::error::{DesignError, DesignResult};
use argmin::core::{CostFunction, Error as ArgminError, Executor, State};
use argmin::solver::brent::BrentOpt;
use argmin_math::{ArgminL2Norm, ArgminScaledAdd, ArgminSub};
use std::cell::Cell;

/// Bounded Powell direction-set minimizer.
///
/// Each cycle runs a bounded Brent line search along every direction in the
/// set, starting from the coordinate axes. After a cycle the net displacement
/// is tried as a new direction and, when Powell's test accepts it, replaces
/// the direction that gave the largest decrease. No gradients are used.
pub struct PowellOptimizer {
    max_iter: u32,
    max_evals: Option<usize>,
    ftol: f64,
    line_search_iters: u64,
}

impl PowellOptimizer {
    pub fn new(max_iter: u32, ftol: f64) -> Self {
        Self {
            max_iter,
            max_evals: None,
            ftol,
            line_search_iters: 100,
        }
    }

    /// Cap on objective evaluations (default: 1000 per free parameter)
    pub fn with_max_evaluations(mut self, max_evals: Option<usize>) -> Self {
        self.max_evals = max_evals;
        self
    }

    pub fn with_line_search_iterations(mut self, iters: u64) -> Self {
        self.line_search_iters = iters.max(1);
        self
    }

    /// Minimize along `direction` from `origin`, staying inside `bounds`.
    ///
    /// Returns the accepted step and its cost, or `(0.0, current)` when no
    /// feasible step improves on `current`.
    fn line_search(
        &self,
        problem: &dyn Problem,
        origin: &Vec<f64>,
        direction: &Vec<f64>,
        current: f64,
        evals: &Cell<usize>,
    ) -> DesignResult<(f64, f64)> {
        let (lo, hi) = feasible_interval(origin, direction, problem.bounds());
        if !(hi - lo > 1e-12) {
            return Ok((0.0, current));
        }

        let line = LineProblem {
            problem,
            origin,
            direction,
            evals,
        };
        let result = Executor::new(line, BrentOpt::new(lo, hi))
            .configure(|state| state.max_iters(self.line_search_iters))
            .run()
            .map_err(from_argmin)?;

        let state = result.state();
        let step = state.get_best_param().copied().unwrap_or(0.0);
        let cost = state.get_best_cost();
        if cost < current {
            Ok((step, cost))
        } else {
            Ok((0.0, current))
        }
    }
}

impl Solver for PowellOptimizer {
    fn name(&self) -> &str {
        "Powell"
    }

    fn solve(
        &mut self,
        problem: &dyn Problem,
        callback: &mut dyn OptimizationCallback,
    ) -> DesignResult<SolverResult> {
        let n = problem.num_params();
        let bounds = problem.bounds();
        let evals = Cell::new(0usize);

        let mut x = problem.initial_params().to_vec();
        problem.apply_constraints(&mut x)?;
        clamp_to_bounds(&mut x, bounds);

        let mut fval = problem.cost(&x)?;
        evals.set(1);

        if n == 0 {
            callback.on_iteration(1, &x, fval)?;
            return Ok(SolverResult {
                success: true,
                cost: fval,
                iterations: 0,
                message: "No free parameters".into(),
                params: x,
                cost_evals: evals.get(),
            });
        }

        let max_evals = self.max_evals.unwrap_or(1000 * n);
        let mut directions: Vec<Vec<f64>> = (0..n)
            .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
            .collect();
        let mut x1 = x.clone();

        for iter in 1..=self.max_iter {
            let fx = fval;
            let mut biggest = 0usize;
            let mut delta = 0.0;

            for (i, direction) in directions.iter().enumerate() {
                let before = fval;
                let (step, cost) = self.line_search(problem, &x, direction, fval, &evals)?;
                if step != 0.0 {
                    x = x.scaled_add(&step, direction);
                    clamp_to_bounds(&mut x, bounds);
                    fval = cost;
                }
                if before - fval > delta {
                    delta = before - fval;
                    biggest = i;
                }
            }

            callback.on_iteration(iter, &x, fval)?;

            if 2.0 * (fx - fval) <= self.ftol * (fx.abs() + fval.abs()) + 1e-20 {
                return Ok(SolverResult {
                    success: true,
                    cost: fval,
                    iterations: iter,
                    message: "Converged".into(),
                    params: x,
                    cost_evals: evals.get(),
                });
            }

            if callback.should_stop() {
                return Ok(SolverResult {
                    success: false,
                    cost: fval,
                    iterations: iter,
                    message: "Stopped by callback".into(),
                    params: x,
                    cost_evals: evals.get(),
                });
            }

            if evals.get() >= max_evals {
                return Ok(SolverResult {
                    success: false,
                    cost: fval,
                    iterations: iter,
                    message: "Maximum number of function evaluations exceeded".into(),
                    params: x,
                    cost_evals: evals.get(),
                });
            }

            // Extrapolate along the net displacement of this cycle.
            let displacement: Vec<f64> = x.sub(&x1);
            let (_, reach) = feasible_interval(&x, &displacement, bounds);
            let mut x2 = x.scaled_add(&reach.clamp(0.0, 1.0), &displacement);
            clamp_to_bounds(&mut x2, bounds);
            x1 = x.clone();

            let fx2 = problem.cost(&x2)?;
            evals.set(evals.get() + 1);

            if fx > fx2 {
                let mut t = 2.0 * (fx + fx2 - 2.0 * fval);
                let temp = fx - fval - delta;
                t *= temp * temp;
                let temp = fx - fx2;
                t -= delta * temp * temp;

                if t < 0.0 {
                    let (step, cost) =
                        self.line_search(problem, &x, &displacement, fval, &evals)?;
                    if step != 0.0 {
                        x = x.scaled_add(&step, &displacement);
                        clamp_to_bounds(&mut x, bounds);
                        fval = cost;
                        tracing::trace!(
                            iteration = iter,
                            replaced = biggest,
                            norm = displacement.l2_norm(),
                            "direction set updated"
                        );
                        directions[biggest] = directions[n - 1].clone();
                        directions[n - 1] = displacement;
                    }
                }
            }
        }

        Ok(SolverResult {
            success: false,
            cost: fval,
            iterations: self.max_iter,
            message: "Maximum number of iterations has been exceeded".into(),
            params: x,
            cost_evals: evals.get(),
        })
    }
}

/// One-dimensional slice of a [`Problem`] for the Brent line search.
struct LineProblem<'a> {
    problem: &'a dyn Problem,
    origin: &'a Vec<f64>,
    direction: &'a Vec<f64>,
    evals: &'a Cell<usize>,
}

impl CostFunction for LineProblem<'_> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, step: &Self::Param) -> Result<Self::Output, ArgminError> {
        let mut point = self.origin.scaled_add(step, self.direction);
        clamp_to_bounds(&mut point, self.problem.bounds());
        self.evals.set(self.evals.get() + 1);
        Ok(self.problem.cost(&point)?)
    }
}

/// Range of `t` keeping `origin + t * direction` inside `bounds`.
fn feasible_interval(origin: &[f64], direction: &[f64], bounds: &[(f64, f64)]) -> (f64, f64) {
    let mut lo = f64::NEG_INFINITY;
    let mut hi = f64::INFINITY;
    for ((&x, &d), &(min, max)) in origin.iter().zip(direction).zip(bounds) {
        if d.abs() < 1e-15 {
            continue;
        }
        let a = (min - x) / d;
        let b = (max - x) / d;
        lo = lo.max(a.min(b));
        hi = hi.min(a.max(b));
    }
    if lo.is_finite() && hi.is_finite() && lo <= hi {
        (lo, hi)
    } else {
        (0.0, 0.0)
    }
}

fn from_argmin(err: ArgminError) -> DesignError {
    match err.downcast::<DesignError>() {
        Ok(design) => design,
        Err(other) => DesignError::Solver(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quadratic {
        center: Vec<f64>,
        initial: Vec<f64>,
        bounds: Vec<(f64, f64)>,
    }

    impl Problem for Quadratic {
        fn cost(&self, params: &[f64]) -> DesignResult<f64> {
            let spread: f64 = params
                .iter()
                .zip(&self.center)
                .enumerate()
                .map(|(i, (p, c))| (i as f64 + 1.0) * (p - c).powi(2))
                .sum();
            Ok(1.0 + spread)
        }
        fn num_params(&self) -> usize {
            self.initial.len()
        }
        fn initial_params(&self) -> &[f64] {
            &self.initial
        }
        fn bounds(&self) -> &[(f64, f64)] {
            &self.bounds
        }
        fn apply_constraints(&self, params: &mut [f64]) -> DesignResult<()> {
            clamp_to_bounds(params, &self.bounds);
            Ok(())
        }
    }

    struct Counter(u32);

    impl OptimizationCallback for Counter {
        fn on_iteration(&mut self, iteration: u32, _: &[f64], _: f64) -> DesignResult<()> {
            self.0 = iteration;
            Ok(())
        }
    }

    #[test]
    fn finds_interior_minimum() {
        let problem = Quadratic {
            center: vec![0.3, -0.7, 1.2],
            initial: vec![0.0, 0.0, 0.0],
            bounds: vec![(-2.0, 2.0); 3],
        };
        let mut solver = PowellOptimizer::new(200, 1e-8);
        let mut counter = Counter(0);
        let result = solver.solve(&problem, &mut counter).unwrap();

        assert!(result.success, "{}", result.message);
        for (x, c) in result.params.iter().zip(&problem.center) {
            assert!((x - c).abs() < 1e-4, "{} vs {}", x, c);
        }
        assert_eq!(counter.0, result.iterations);
    }

    #[test]
    fn respects_bounds_when_minimum_is_outside() {
        let problem = Quadratic {
            center: vec![5.0, -5.0],
            initial: vec![0.5, 0.5],
            bounds: vec![(0.0, 1.0), (0.0, 1.0)],
        };
        let mut solver = PowellOptimizer::new(100, 1e-8);
        let result = solver.solve(&problem, &mut Counter(0)).unwrap();

        assert!((result.params[0] - 1.0).abs() < 1e-4);
        assert!(result.params[1].abs() < 1e-4);
        assert!(result.params.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn iteration_cap_is_reported_as_failure() {
        let problem = Quadratic {
            center: vec![0.3, -0.7, 1.2, 0.9],
            initial: vec![-2.0, 2.0, -2.0, 2.0],
            bounds: vec![(-2.0, 2.0); 4],
        };
        let mut solver = PowellOptimizer::new(1, 0.0).with_line_search_iterations(2);
        let result = solver.solve(&problem, &mut Counter(0)).unwrap();
        assert!(!result.success);
        assert_eq!(result.iterations, 1);
    }

    #[test]
    fn no_free_parameters_evaluates_once() {
        let problem = Quadratic {
            center: vec![],
            initial: vec![],
            bounds: vec![],
        };
        let mut solver = PowellOptimizer::new(10, 1e-6);
        let result = solver.solve(&problem, &mut Counter(0)).unwrap();
        assert!(result.success);
        assert_eq!(result.cost_evals, 1);
        assert_eq!(result.cost, 1.0);
    }

    #[test]
    fn feasible_interval_stops_at_nearest_wall() {
        let (lo, hi) = feasible_interval(&[0.5, 0.2], &[1.0, -1.0], &[(0.0, 1.0), (0.0, 1.0)]);
        assert!((lo + 0.5).abs() < 1e-12);
        assert!((hi - 0.2).abs() < 1e-12);
    }
}

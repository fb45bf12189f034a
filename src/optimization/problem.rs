use super::solvers::traits::{clamp_to_bounds, Problem};
use crate::core::{CategoricalDecoding, ParamName, ParameterVector, Partition, Target};
use crate::error::DesignResult;
use crate::surrogate::{ForwardSurrogate, Prediction, SurrogateInput};

pub const FREQUENCY_NORM_GHZ: f64 = 10.0;
pub const BANDWIDTH_NORM_MHZ: f64 = 100.0;
pub const FREQUENCY_WEIGHT: f64 = 10.0;
pub const BANDWIDTH_WEIGHT: f64 = 1.0;

/// Cost assigned to a prediction that is not a finite number.
const NON_FINITE_PENALTY: f64 = 1e12;

/// Weighted squared normalized error of a prediction against the target.
pub fn objective(prediction: &Prediction, target: &Target) -> f64 {
    let df = (prediction.frequency_ghz - target.frequency_ghz) / FREQUENCY_NORM_GHZ;
    let dbw = (prediction.bandwidth_mhz - target.bandwidth_mhz) / BANDWIDTH_NORM_MHZ;
    FREQUENCY_WEIGHT * df * df + BANDWIDTH_WEIGHT * dbw * dbw
}

/// Design search over the free parameters of one request.
pub struct DesignProblem<'a> {
    partition: &'a Partition,
    target: Target,
    surrogate: &'a dyn ForwardSurrogate,
    decoder: &'a dyn CategoricalDecoding,
}

impl<'a> DesignProblem<'a> {
    pub fn new(
        partition: &'a Partition,
        target: Target,
        surrogate: &'a dyn ForwardSurrogate,
        decoder: &'a dyn CategoricalDecoding,
    ) -> Self {
        Self {
            partition,
            target,
            surrogate,
            decoder,
        }
    }

    pub fn partition(&self) -> &Partition {
        self.partition
    }

    pub fn free_names(&self) -> Vec<&'static str> {
        self.partition.free().iter().map(|n| n.as_str()).collect()
    }

    fn feed_index(&self, params: &ParameterVector) -> usize {
        self.decoder
            .decode(params.feed_type_raw(), self.surrogate.feed_labels().len())
    }

    /// Full parameter vector. A free feed type is replaced by its decoded
    /// index; a fixed one is returned as given.
    pub fn full_vector(&self, free_values: &[f64]) -> ParameterVector {
        let mut params = self.partition.assemble(free_values);
        if self.partition.free().contains(&ParamName::FeedType) {
            let index = self.feed_index(&params);
            params.set(ParamName::FeedType, index as f64);
        }
        params
    }

    pub fn predict(&self, free_values: &[f64]) -> DesignResult<(ParameterVector, Prediction)> {
        let params = self.partition.assemble(free_values);
        let labels = self.surrogate.feed_labels().len();
        let index = self.feed_index(&params);
        let prediction = self
            .surrogate
            .predict(&SurrogateInput::encode(&params, index, labels))?;
        Ok((params, prediction))
    }
}

impl Problem for DesignProblem<'_> {
    fn cost(&self, params: &[f64]) -> DesignResult<f64> {
        let (_, prediction) = self.predict(params)?;
        let cost = objective(&prediction, &self.target);
        if cost.is_finite() {
            Ok(cost)
        } else {
            tracing::debug!(?prediction, "non-finite surrogate output penalised");
            Ok(NON_FINITE_PENALTY)
        }
    }

    fn num_params(&self) -> usize {
        self.partition.free_count()
    }

    fn initial_params(&self) -> &[f64] {
        self.partition.initial()
    }

    fn bounds(&self) -> &[(f64, f64)] {
        self.partition.bounds()
    }

    fn apply_constraints(&self, params: &mut [f64]) -> DesignResult<()> {
        clamp_to_bounds(params, self.partition.bounds());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FixedSet, NearestIndex, ParameterSpace};
    use crate::surrogate::TransmissionLineSurrogate;

    #[test]
    fn objective_weights_frequency_ten_times_bandwidth() {
        let target = Target::new(2.4, 100.0).unwrap();
        let off_freq = Prediction {
            frequency_ghz: 3.4,
            bandwidth_mhz: 100.0,
        };
        let off_bw = Prediction {
            frequency_ghz: 2.4,
            bandwidth_mhz: 110.0,
        };
        assert!((objective(&off_freq, &target) - 0.1).abs() < 1e-12);
        assert!((objective(&off_bw, &target) - 0.01).abs() < 1e-12);
        assert_eq!(
            objective(
                &Prediction {
                    frequency_ghz: 2.4,
                    bandwidth_mhz: 100.0
                },
                &target
            ),
            0.0
        );
    }

    #[test]
    fn feed_type_is_rounded_before_encoding() {
        let fixed = FixedSet::new().with(ParamName::EpsR, 4.4);
        let partition = ParameterSpace::default().partition(&fixed).unwrap();
        let surrogate = TransmissionLineSurrogate::default();
        let problem = DesignProblem::new(
            &partition,
            Target::new(2.4, 100.0).unwrap(),
            &surrogate,
            &NearestIndex,
        );

        let mut free = partition.initial().to_vec();
        *free.last_mut().unwrap() = 1.6;
        let params = problem.full_vector(&free);
        assert_eq!(params.feed_type_raw(), 2.0);
        assert_eq!(params.eps_r(), 4.4);

        let near = problem.cost(&free).unwrap();
        *free.last_mut().unwrap() = 2.4;
        assert_eq!(problem.cost(&free).unwrap(), near);
    }
}

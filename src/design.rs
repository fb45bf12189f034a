//! One design request, end to end.
//!
//! ```text
//! PROPOSE -> SIMULATE -> MEASURE -> LOG -> CORRECT -> DECIDE
//!    ^                                                  |
//!    +------------------ corrected proposal ------------+
//! ```
//!
//! The first proposal comes from the optimizer; later ones are the
//! autocorrector's output. The loop ends on a measurement inside tolerance
//! (`Converged`), when the attempt budget runs out (`GaveUp`), or as soon as
//! the simulator fails to report a resonance (`Degraded`).

use crate::config::{DesignConfig, ToleranceConfig};
use crate::core::{FixedSet, OptimizationResult, ParameterVector, Substrate, Target};
use crate::error::DesignResult;
use crate::feedback::{
    Autocorrector, FeedbackLedger, FeedbackRecord, RetrainOutcome, RetrainScheduler,
};
use crate::optimization::DesignOptimizer;
use crate::simulation::{BuildRequest, Measurement, Simulator};
use crate::surrogate::SurrogateSet;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq)]
pub struct DesignRequest {
    pub family: String,
    pub shape: String,
    pub target: Target,
    pub fixed: FixedSet,
    pub substrate: String,
    pub conductor: String,
}

impl DesignRequest {
    pub fn new(target: Target) -> Self {
        Self {
            family: "Microstrip Patch".into(),
            shape: "Rectangular".into(),
            target,
            fixed: FixedSet::new(),
            substrate: Substrate::Fr4.name().to_string(),
            conductor: "Copper".into(),
        }
    }

    /// Pin `eps_r` and `substrate_h` to the catalog substrate.
    pub fn with_substrate(mut self, substrate: Substrate) -> Self {
        self.fixed.extend(&substrate.fixed_set());
        self.substrate = substrate.name().to_string();
        self
    }

    pub fn with_fixed(mut self, fixed: FixedSet) -> Self {
        self.fixed.extend(&fixed);
        self
    }

    pub fn with_conductor(mut self, conductor: impl Into<String>) -> Self {
        self.conductor = conductor.into();
        self
    }

    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = family.into();
        self
    }

    pub fn with_shape(mut self, shape: impl Into<String>) -> Self {
        self.shape = shape.into();
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DesignStatus {
    /// Measured frequency and bandwidth are both within tolerance
    Converged,
    /// Attempt budget exhausted without meeting tolerance
    GaveUp,
    /// The simulator returned no usable measurement
    Degraded,
}

/// What happened in one pass through the loop.
#[derive(Clone, Debug, PartialEq)]
pub struct AttemptReport {
    pub attempt: u32,
    pub proposal: ParameterVector,
    pub measurement: Measurement,
    pub within_tolerance: bool,
    pub logged: bool,
    /// Autocorrector output for the next attempt
    pub corrected: ParameterVector,
    pub retrain: RetrainOutcome,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DesignOutcome {
    pub status: DesignStatus,
    /// Last proposal handed to the simulator
    pub parameters: ParameterVector,
    pub feed_type_label: String,
    pub optimization: OptimizationResult,
    pub attempts: Vec<AttemptReport>,
}

impl DesignOutcome {
    pub fn last_measurement(&self) -> Option<&Measurement> {
        self.attempts.last().map(|a| &a.measurement)
    }
}

/// Whether a measurement meets the target; unknown bandwidth never does.
pub fn within_tolerance(
    measurement: &Measurement,
    target: &Target,
    tolerance: &ToleranceConfig,
) -> bool {
    let freq_ok = measurement
        .frequency_ghz
        .is_some_and(|f| (f - target.frequency_ghz).abs() < tolerance.frequency_ghz);
    let bw_ok = measurement
        .bandwidth_mhz
        .is_some_and(|bw| (bw - target.bandwidth_mhz).abs() < tolerance.bandwidth_mhz);
    freq_ok && bw_ok
}

/// Drives design requests against one simulator, ledger and retrain schedule.
pub struct DesignLoop {
    config: DesignConfig,
    surrogates: SurrogateSet,
    optimizer: DesignOptimizer,
    corrector: Autocorrector,
    ledger: FeedbackLedger,
    scheduler: RetrainScheduler,
}

impl DesignLoop {
    /// Validate `config`, open the ledger and resume the retrain marker.
    pub fn new(config: DesignConfig, surrogates: SurrogateSet) -> DesignResult<Self> {
        config.validate()?;
        let corrector = Autocorrector::new(config.damping)?;
        let ledger = FeedbackLedger::open(
            &config.storage.ledger_path,
            config.storage.lock_timeout_ms,
        );
        let scheduler = RetrainScheduler::from_storage(config.retrain.clone(), &config.storage);
        let optimizer = DesignOptimizer::new(config.optimizer.clone());
        tracing::info!(
            capabilities = ?surrogates.capabilities(),
            ledger_rows = ledger.row_count(),
            last_retrain_rows = scheduler.state().last_retrain_rows,
            "design loop ready"
        );
        Ok(Self {
            config,
            surrogates,
            optimizer,
            corrector,
            ledger,
            scheduler,
        })
    }

    pub fn config(&self) -> &DesignConfig {
        &self.config
    }

    pub fn surrogates(&self) -> &SurrogateSet {
        &self.surrogates
    }

    pub fn ledger(&self) -> &FeedbackLedger {
        &self.ledger
    }

    pub fn scheduler(&self) -> &RetrainScheduler {
        &self.scheduler
    }

    pub fn run(
        &mut self,
        request: &DesignRequest,
        simulator: &mut dyn Simulator,
    ) -> DesignResult<DesignOutcome> {
        let target = request.target;
        let optimization = self
            .optimizer
            .optimize(&self.surrogates, &target, &request.fixed)?;
        let feed_type_label = optimization.feed_type_label.clone();

        let mut proposal = optimization.parameters;
        let mut attempts = Vec::new();

        for attempt in 1..=self.config.max_attempts {
            // SIMULATE / MEASURE
            let build = BuildRequest::new(target, request.substrate.clone(), proposal)
                .with_family(request.family.clone())
                .with_shape(request.shape.clone())
                .with_conductor(request.conductor.clone())
                .with_feed_label(feed_type_label.clone());
            let measurement = match simulator.build_and_measure(&build) {
                Ok(m) if m.is_observed() => m,
                Ok(_) => {
                    tracing::warn!(attempt, "simulator reported no resonance");
                    return Ok(self.finish(
                        DesignStatus::Degraded,
                        proposal,
                        feed_type_label,
                        optimization,
                        attempts,
                    ));
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "simulation failed");
                    return Ok(self.finish(
                        DesignStatus::Degraded,
                        proposal,
                        feed_type_label,
                        optimization,
                        attempts,
                    ));
                }
            };

            // LOG
            let record =
                FeedbackRecord::new(target, &proposal, feed_type_label.clone(), measurement);
            let logged = self.ledger.log(&record);

            // CORRECT
            let mut corrected = self.corrector.correct(&proposal, &target, &measurement);
            for (name, value) in request.fixed.iter() {
                corrected.set(name, value);
            }

            // DECIDE
            let done = within_tolerance(&measurement, &target, &self.config.tolerance);
            tracing::info!(
                attempt,
                actual_ghz = ?measurement.frequency_ghz,
                actual_mhz = ?measurement.bandwidth_mhz,
                within_tolerance = done,
                "design attempt measured"
            );

            let retrain = self.scheduler.maybe_retrain(&mut self.ledger);
            attempts.push(AttemptReport {
                attempt,
                proposal,
                measurement,
                within_tolerance: done,
                logged,
                corrected,
                retrain,
            });

            if done {
                return Ok(self.finish(
                    DesignStatus::Converged,
                    proposal,
                    feed_type_label,
                    optimization,
                    attempts,
                ));
            }
            if attempt < self.config.max_attempts {
                proposal = corrected;
            }
        }

        Ok(self.finish(
            DesignStatus::GaveUp,
            proposal,
            feed_type_label,
            optimization,
            attempts,
        ))
    }

    fn finish(
        &self,
        status: DesignStatus,
        parameters: ParameterVector,
        feed_type_label: String,
        optimization: OptimizationResult,
        attempts: Vec<AttemptReport>,
    ) -> DesignOutcome {
        tracing::info!(?status, attempts = attempts.len(), "design request finished");
        DesignOutcome {
            status,
            parameters,
            feed_type_label,
            optimization,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_bandwidth_is_out_of_tolerance() {
        let target = Target::new(2.4, 100.0).unwrap();
        let tolerance = ToleranceConfig::default();
        let measurement = Measurement {
            frequency_ghz: Some(2.4),
            bandwidth_mhz: None,
            s11_db: Some(-20.0),
        };
        assert!(!within_tolerance(&measurement, &target, &tolerance));
        assert!(within_tolerance(
            &Measurement::new(2.41, 95.0, -20.0),
            &target,
            &tolerance
        ));
        assert!(!within_tolerance(
            &Measurement::new(2.5, 90.0, -20.0),
            &target,
            &tolerance
        ));
    }

    #[test]
    fn substrate_pins_eps_r_and_height() {
        let request = DesignRequest::new(Target::new(2.4, 100.0).unwrap())
            .with_substrate(Substrate::Rogers5880);
        assert_eq!(request.fixed.len(), 2);
        assert_eq!(request.substrate, Substrate::Rogers5880.name());
    }
}

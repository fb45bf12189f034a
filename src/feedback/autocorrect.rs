use crate::core::{bound_of, ParamName, ParameterVector, Target};
use crate::error::{DesignError, DesignResult};
use crate::simulation::Measurement;

/// Closed-form nudge of a rejected proposal toward the target.
///
/// Resonant length scales inversely with frequency, so a design that resonated
/// high gets a proportionally larger patch. Bandwidth is steered through the
/// feed width with a square-root response.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Autocorrector {
    damping: f64,
}

impl Default for Autocorrector {
    fn default() -> Self {
        Self { damping: 0.6 }
    }
}

impl Autocorrector {
    pub fn new(damping: f64) -> DesignResult<Self> {
        if !(0.0..=1.0).contains(&damping) {
            return Err(DesignError::invalid(
                "damping",
                format!("must lie in [0, 1], got {}", damping),
            ));
        }
        Ok(Self { damping })
    }

    pub fn damping(&self) -> f64 {
        self.damping
    }

    fn damped(&self, ratio: f64) -> f64 {
        (1.0 - self.damping) + self.damping * ratio
    }

    /// Scaled parameters before clipping, or `None` if any value is not finite.
    pub fn unclipped(
        &self,
        params: &ParameterVector,
        target: &Target,
        measurement: &Measurement,
    ) -> Option<ParameterVector> {
        let ratio = match measurement.frequency_ghz {
            Some(actual) if target.frequency_ghz != 0.0 => actual / target.frequency_ghz,
            _ => 1.0,
        };
        let length_scale = self.damped(ratio);

        let mut corrected = *params;
        corrected.set(ParamName::PatchL, params.patch_l() * length_scale);
        corrected.set(ParamName::PatchW, params.patch_w() * length_scale);

        if let Some(actual_bw) = measurement.bandwidth_mhz.filter(|bw| *bw > 0.0) {
            let width_scale = self.damped((target.bandwidth_mhz / actual_bw).sqrt());
            corrected.set(ParamName::FeedWidth, params.feed_width() * width_scale);
        }

        corrected.is_finite().then_some(corrected)
    }

    /// Corrected proposal with `patch_W`, `patch_L` and `feed_width` clamped to bounds.
    ///
    /// Returns `params` unchanged when the correction is not numerically usable.
    pub fn correct(
        &self,
        params: &ParameterVector,
        target: &Target,
        measurement: &Measurement,
    ) -> ParameterVector {
        let Some(mut corrected) = self.unclipped(params, target, measurement) else {
            tracing::warn!(?measurement, "correction produced non-finite values; keeping proposal");
            return *params;
        };
        for name in [ParamName::PatchW, ParamName::PatchL, ParamName::FeedWidth] {
            corrected.set(name, bound_of(name).clamp(corrected.get(name)));
        }
        corrected
    }
}

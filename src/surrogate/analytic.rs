//! Transmission-line model of a rectangular microstrip patch.

use super::{ForwardSurrogate, InversePrediction, InversePredictor, Prediction, SurrogateInput};
use crate::core::{
    bound_of, FeedType, ParamName, ParameterVector, Substrate, Target, GROUND_MARGIN_FACTOR,
};
use crate::error::{DesignError, DesignResult};
use serde::{Deserialize, Serialize};

const SPEED_OF_LIGHT: f64 = 3e8;
const FEED_IMPEDANCE_OHMS: f64 = 50.0;

/// Bandwidth multiplier per feed type, in [`FeedType::ALL`] order.
pub const FEED_BANDWIDTH_FACTORS: [f64; 4] = [1.0, 0.9, 1.1, 1.05];

/// Closed-form patch dimensions for one frequency and substrate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchDesign {
    pub frequency_ghz: f64,
    pub eps_r: f64,
    pub substrate_h: f64,
    pub patch_w: f64,
    pub patch_l: f64,
    pub eps_eff: f64,
    pub length_extension: f64,
    pub substrate_w: f64,
    pub substrate_l: f64,
    /// Inset depth for a 50 Ω feed; zero when the edge resistance is already below 50 Ω.
    pub inset_depth: f64,
}

pub fn effective_permittivity(eps_r: f64, h: f64, w: f64) -> f64 {
    (eps_r + 1.0) / 2.0 + (eps_r - 1.0) / 2.0 * (1.0 + 12.0 * h / w).powf(-0.5)
}

/// Fringing-field length extension on each radiating edge.
pub fn length_extension(eps_eff: f64, h: f64, w: f64) -> f64 {
    0.412 * h * ((eps_eff + 0.3) * (w / h + 0.264)) / ((eps_eff - 0.258) * (w / h + 0.8))
}

/// Inset depth matching the patch edge to a 50 Ω line.
pub fn inset_depth(w: f64, l: f64) -> f64 {
    let edge_resistance = 90.0 * (w / l).powi(2);
    if !(edge_resistance.is_finite() && edge_resistance >= FEED_IMPEDANCE_OHMS) {
        return 0.0;
    }
    (l / std::f64::consts::PI) * (FEED_IMPEDANCE_OHMS / edge_resistance).sqrt().acos()
}

pub fn design_patch(frequency_ghz: f64, substrate: Substrate) -> DesignResult<PatchDesign> {
    design_patch_with(frequency_ghz, substrate.eps_r(), substrate.thickness())
}

pub fn design_patch_with(frequency_ghz: f64, eps_r: f64, h: f64) -> DesignResult<PatchDesign> {
    if !(frequency_ghz.is_finite() && frequency_ghz > 0.0) {
        return Err(DesignError::invalid("frequency", "must be positive"));
    }
    if !(eps_r.is_finite() && eps_r > 1.0) {
        return Err(DesignError::invalid("eps_r", "must exceed 1"));
    }
    if !(h.is_finite() && h > 0.0) {
        return Err(DesignError::invalid("substrate_h", "must be positive"));
    }

    let f = frequency_ghz * 1e9;
    let w = SPEED_OF_LIGHT / (2.0 * f) * (2.0 / (eps_r + 1.0)).sqrt();
    let eps_eff = effective_permittivity(eps_r, h, w);
    let delta_l = length_extension(eps_eff, h, w);
    let l = SPEED_OF_LIGHT / (2.0 * f * eps_eff.sqrt()) - 2.0 * delta_l;

    let inset_depth = inset_depth(w, l);

    Ok(PatchDesign {
        frequency_ghz,
        eps_r,
        substrate_h: h,
        patch_w: w,
        patch_l: l,
        eps_eff,
        length_extension: delta_l,
        substrate_w: w + GROUND_MARGIN_FACTOR * h,
        substrate_l: l + GROUND_MARGIN_FACTOR * h,
        inset_depth,
    })
}

/// Forward model: resonance from the extended patch length, bandwidth from the
/// thickness-to-width ratio.
#[derive(Clone, Debug)]
pub struct TransmissionLineSurrogate {
    labels: Vec<String>,
}

impl Default for TransmissionLineSurrogate {
    fn default() -> Self {
        Self {
            labels: FeedType::default_labels(),
        }
    }
}

impl ForwardSurrogate for TransmissionLineSurrogate {
    fn predict(&self, input: &SurrogateInput) -> DesignResult<Prediction> {
        let numeric = input.numeric();
        let (w, l, eps_eff, h, eps_r) = (numeric[0], numeric[1], numeric[2], numeric[3], numeric[4]);
        if [w, l, eps_eff, h, eps_r]
            .iter()
            .any(|v| !v.is_finite() || *v <= 0.0)
        {
            return Err(DesignError::Prediction(format!(
                "non-physical input {:?}",
                numeric
            )));
        }

        let delta_l = length_extension(eps_eff, h, w);
        let f = SPEED_OF_LIGHT / (2.0 * eps_eff.sqrt() * (l + 2.0 * delta_l));
        let factor = input
            .feed_index()
            .and_then(|i| FEED_BANDWIDTH_FACTORS.get(i))
            .copied()
            .unwrap_or(1.0);
        let bandwidth = 1.5 * h / w * eps_r.sqrt() * f * factor;

        Ok(Prediction {
            frequency_ghz: f / 1e9,
            bandwidth_mhz: bandwidth / 1e6,
        })
    }

    fn feed_labels(&self) -> &[String] {
        &self.labels
    }
}

/// Inverse model built on [`design_patch`] for a fixed substrate and inset feed.
#[derive(Clone, Debug)]
pub struct TransmissionLineInverse {
    substrate: Substrate,
    feed: FeedType,
    feed_width: f64,
}

impl TransmissionLineInverse {
    pub fn new(substrate: Substrate) -> Self {
        Self {
            substrate,
            feed: FeedType::Inset,
            feed_width: 0.003,
        }
    }

    pub fn with_feed(mut self, feed: FeedType, feed_width: f64) -> Self {
        self.feed = feed;
        self.feed_width = feed_width;
        self
    }
}

impl InversePredictor for TransmissionLineInverse {
    fn predict_parameters(&self, target: &Target) -> DesignResult<InversePrediction> {
        let design = design_patch(target.frequency_ghz, self.substrate)?;
        let feed_index = FeedType::ALL
            .iter()
            .position(|&f| f == self.feed)
            .unwrap_or(0);

        let mut params = ParameterVector::new([
            design.patch_w,
            design.patch_l,
            design.eps_eff,
            design.substrate_h,
            design.eps_r,
            self.feed_width,
            feed_index as f64,
        ]);
        for name in ParamName::ALL {
            params.set(name, bound_of(name).clamp(params.get(name)));
        }

        Ok(InversePrediction {
            parameters: params,
            feed_type_label: self.feed.label().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NearestIndex;
    use crate::surrogate::predict_with;

    #[test]
    fn fr4_patch_at_2_4_ghz_matches_textbook_dimensions() {
        let design = design_patch(2.4, Substrate::Fr4).unwrap();
        assert!((design.patch_w - 0.03804).abs() < 1e-4, "W = {}", design.patch_w);
        assert!((design.patch_l - 0.02942).abs() < 2e-4, "L = {}", design.patch_l);
        assert!(design.eps_eff > 3.9 && design.eps_eff < 4.4);
        assert_eq!(design.substrate_w, design.patch_w + 6.0 * 0.0016);
        assert!(design.inset_depth > 0.0 && design.inset_depth < design.patch_l / 2.0);
    }

    #[test]
    fn forward_model_inverts_the_calculator() {
        let design = design_patch(2.4, Substrate::Fr4).unwrap();
        let params = ParameterVector::new([
            design.patch_w,
            design.patch_l,
            design.eps_eff,
            design.substrate_h,
            design.eps_r,
            0.003,
            0.0,
        ]);
        let surrogate = TransmissionLineSurrogate::default();
        let prediction = predict_with(&surrogate, &NearestIndex, &params).unwrap();
        assert!((prediction.frequency_ghz - 2.4).abs() < 1e-9);
        assert!(prediction.bandwidth_mhz > 0.0);
    }

    #[test]
    fn longer_patch_resonates_lower() {
        let surrogate = TransmissionLineSurrogate::default();
        let short = ParameterVector::new([0.04, 0.03, 4.0, 0.0016, 4.4, 0.003, 0.0]);
        let mut long = short;
        long.set(ParamName::PatchL, 0.035);
        let f_short = predict_with(&surrogate, &NearestIndex, &short).unwrap().frequency_ghz;
        let f_long = predict_with(&surrogate, &NearestIndex, &long).unwrap().frequency_ghz;
        assert!(f_long < f_short);
    }

    #[test]
    fn feed_type_scales_bandwidth() {
        let surrogate = TransmissionLineSurrogate::default();
        let edge = ParameterVector::new([0.04, 0.03, 4.0, 0.0016, 4.4, 0.003, 0.0]);
        let mut inset = edge;
        inset.set(ParamName::FeedType, 1.0);
        let bw_edge = predict_with(&surrogate, &NearestIndex, &edge).unwrap().bandwidth_mhz;
        let bw_inset = predict_with(&surrogate, &NearestIndex, &inset).unwrap().bandwidth_mhz;
        assert!((bw_inset / bw_edge - 0.9).abs() < 1e-12);
    }

    #[test]
    fn inverse_prediction_stays_in_bounds() {
        let inverse = TransmissionLineInverse::new(Substrate::Rogers5880);
        let guess = inverse
            .predict_parameters(&Target::new(2.4, 100.0).unwrap())
            .unwrap();
        guess.parameters.validate().unwrap();
        assert_eq!(guess.feed_type_label, "inset");
    }
}

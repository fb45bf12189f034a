use crate::error::{DesignError, DesignResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const PARAM_COUNT: usize = 7;
pub const NUMERIC_PARAM_COUNT: usize = 6;

/// Ground plane extends this many substrate thicknesses past the patch on each side.
pub const GROUND_MARGIN_FACTOR: f64 = 6.0;

// ===== PARAMETER NAMES =====

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParamName {
    PatchW,
    PatchL,
    EpsEff,
    SubstrateH,
    EpsR,
    FeedWidth,
    FeedType,
}

impl ParamName {
    /// All parameters in model input order.
    pub const ALL: [ParamName; PARAM_COUNT] = [
        Self::PatchW,
        Self::PatchL,
        Self::EpsEff,
        Self::SubstrateH,
        Self::EpsR,
        Self::FeedWidth,
        Self::FeedType,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PatchW => "patch_W",
            Self::PatchL => "patch_L",
            Self::EpsEff => "eps_eff",
            Self::SubstrateH => "substrate_h",
            Self::EpsR => "eps_r",
            Self::FeedWidth => "feed_width",
            Self::FeedType => "feed_type",
        }
    }

    pub const fn is_categorical(self) -> bool {
        matches!(self, Self::FeedType)
    }
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamName {
    type Err = DesignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed == "feed_width_m" {
            return Ok(Self::FeedWidth);
        }
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == trimmed)
            .ok_or_else(|| DesignError::invalid(trimmed, "unknown parameter name"))
    }
}

// ===== BOUNDS =====

/// Closed interval a parameter must stay within.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub min: f64,
    pub max: f64,
}

impl Bound {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn as_tuple(&self) -> (f64, f64) {
        (self.min, self.max)
    }
}

/// System-wide parameter bounds, indexed by [`ParamName::index`].
pub const PARAMETER_BOUNDS: [Bound; PARAM_COUNT] = [
    Bound::new(0.001, 0.1),
    Bound::new(0.001, 0.1),
    Bound::new(1.0, 10.0),
    Bound::new(0.0005, 0.003),
    Bound::new(2.0, 10.0),
    Bound::new(0.001, 0.006),
    Bound::new(0.0, 3.0),
];

/// Initial guess used for every free parameter.
pub const DEFAULT_VALUES: [f64; PARAM_COUNT] = [0.03, 0.03, 3.0, 0.001, 4.0, 0.002, 0.0];

pub fn bound_of(name: ParamName) -> Bound {
    PARAMETER_BOUNDS[name.index()]
}

// ===== FEED TYPES =====

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedType {
    MicrostripLine,
    Inset,
    Probe,
    ApertureCoupled,
}

impl FeedType {
    pub const ALL: [FeedType; 4] = [
        Self::MicrostripLine,
        Self::Inset,
        Self::Probe,
        Self::ApertureCoupled,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::MicrostripLine => "microstrip-line",
            Self::Inset => "inset",
            Self::Probe => "probe",
            Self::ApertureCoupled => "aperture-coupled",
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn default_labels() -> Vec<String> {
        Self::ALL.iter().map(|f| f.label().to_string()).collect()
    }
}

// ===== PARAMETER VECTOR =====

/// Full design vector in model order. `feed_type` is stored as a numeric index.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterVector {
    values: [f64; PARAM_COUNT],
}

impl Default for ParameterVector {
    fn default() -> Self {
        Self {
            values: DEFAULT_VALUES,
        }
    }
}

impl ParameterVector {
    /// Build a vector without validation. Use [`ParameterVector::validate`] before
    /// handing it to anything that assumes the bounds hold.
    pub fn new(values: [f64; PARAM_COUNT]) -> Self {
        Self { values }
    }

    /// Build and validate against [`PARAMETER_BOUNDS`].
    pub fn try_new(values: [f64; PARAM_COUNT]) -> DesignResult<Self> {
        let vector = Self::new(values);
        vector.validate()?;
        Ok(vector)
    }

    pub fn get(&self, name: ParamName) -> f64 {
        self.values[name.index()]
    }

    pub fn set(&mut self, name: ParamName, value: f64) {
        self.values[name.index()] = value;
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn values(&self) -> [f64; PARAM_COUNT] {
        self.values
    }

    pub fn patch_w(&self) -> f64 {
        self.get(ParamName::PatchW)
    }

    pub fn patch_l(&self) -> f64 {
        self.get(ParamName::PatchL)
    }

    pub fn eps_eff(&self) -> f64 {
        self.get(ParamName::EpsEff)
    }

    pub fn substrate_h(&self) -> f64 {
        self.get(ParamName::SubstrateH)
    }

    pub fn eps_r(&self) -> f64 {
        self.get(ParamName::EpsR)
    }

    pub fn feed_width(&self) -> f64 {
        self.get(ParamName::FeedWidth)
    }

    /// Raw feed-type coordinate as stored. Use a categorical decoder to turn it
    /// into a label index.
    pub fn feed_type_raw(&self) -> f64 {
        self.get(ParamName::FeedType)
    }

    /// The six numeric parameters, in model order.
    pub fn numeric(&self) -> [f64; NUMERIC_PARAM_COUNT] {
        let mut out = [0.0; NUMERIC_PARAM_COUNT];
        out.copy_from_slice(&self.values[..NUMERIC_PARAM_COUNT]);
        out
    }

    pub fn substrate_w(&self) -> f64 {
        self.patch_w() + GROUND_MARGIN_FACTOR * self.substrate_h()
    }

    pub fn substrate_l(&self) -> f64 {
        self.patch_l() + GROUND_MARGIN_FACTOR * self.substrate_h()
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Check every value against its bound and the feed type against the label range.
    pub fn validate(&self) -> DesignResult<()> {
        for name in ParamName::ALL {
            let value = self.get(name);
            let bound = bound_of(name);
            if !value.is_finite() || !bound.contains(value) {
                return Err(DesignError::invalid(
                    name.as_str(),
                    format!("value {} outside [{}, {}]", value, bound.min, bound.max),
                ));
            }
            if name.is_categorical() && value.fract() != 0.0 {
                return Err(DesignError::invalid(
                    name.as_str(),
                    format!("categorical index must be integral, got {}", value),
                ));
            }
        }
        Ok(())
    }
}

// ===== TARGET =====

/// Requested resonant frequency (GHz) and bandwidth (MHz).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub frequency_ghz: f64,
    pub bandwidth_mhz: f64,
}

impl Target {
    pub fn new(frequency_ghz: f64, bandwidth_mhz: f64) -> DesignResult<Self> {
        let target = Self {
            frequency_ghz,
            bandwidth_mhz,
        };
        target.validate()?;
        Ok(target)
    }

    pub fn validate(&self) -> DesignResult<()> {
        if !(self.frequency_ghz.is_finite() && self.frequency_ghz > 0.0) {
            return Err(DesignError::invalid(
                "target_frequency",
                format!("must be positive, got {}", self.frequency_ghz),
            ));
        }
        if !(self.bandwidth_mhz.is_finite() && self.bandwidth_mhz > 0.0) {
            return Err(DesignError::invalid(
                "target_bandwidth",
                format!("must be positive, got {}", self.bandwidth_mhz),
            ));
        }
        Ok(())
    }
}

// ===== OPTIMIZATION RESULT =====

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub parameters: ParameterVector,
    pub feed_type_label: String,
    pub success: bool,
    pub objective: f64,
    pub iterations: u32,
    pub evaluations: usize,
    pub message: String,
}

impl OptimizationResult {
    pub fn get_parameter(&self, name: ParamName) -> f64 {
        self.parameters.get(name)
    }

    pub fn substrate_w(&self) -> f64 {
        self.parameters.substrate_w()
    }

    pub fn substrate_l(&self) -> f64 {
        self.parameters.substrate_l()
    }

    /// Numeric view keyed by parameter name, including the derived ground plane size.
    pub fn named_values(&self) -> IndexMap<&'static str, f64> {
        let mut named = IndexMap::with_capacity(PARAM_COUNT + 2);
        for name in ParamName::ALL {
            named.insert(name.as_str(), self.parameters.get(name));
        }
        named.insert("substrate_W", self.substrate_w());
        named.insert("substrate_L", self.substrate_l());
        named
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_names_round_trip_through_strings() {
        for name in ParamName::ALL {
            assert_eq!(name.as_str().parse::<ParamName>().unwrap(), name);
        }
        assert_eq!("feed_width_m".parse::<ParamName>().unwrap(), ParamName::FeedWidth);
        assert!("patch_area".parse::<ParamName>().is_err());
    }

    #[test]
    fn defaults_lie_within_bounds() {
        ParameterVector::default().validate().unwrap();
    }

    #[test]
    fn substrate_extends_six_thicknesses() {
        let v = ParameterVector::new([0.04, 0.03, 3.0, 0.0016, 4.4, 0.003, 1.0]);
        assert_eq!(v.substrate_w(), 0.04 + 6.0 * 0.0016);
        assert_eq!(v.substrate_l(), 0.03 + 6.0 * 0.0016);
    }

    #[test]
    fn validation_rejects_fractional_feed_type() {
        let v = ParameterVector::new([0.04, 0.03, 3.0, 0.0016, 4.4, 0.003, 1.5]);
        assert!(matches!(
            v.validate(),
            Err(DesignError::InvalidParameter { ref name, .. }) if name == "feed_type"
        ));
    }

    #[test]
    fn target_must_be_positive() {
        assert!(Target::new(2.4, 100.0).is_ok());
        assert!(Target::new(0.0, 100.0).is_err());
        assert!(Target::new(2.4, -5.0).is_err());
        assert!(Target::new(f64::NAN, 100.0).is_err());
    }

    #[test]
    fn named_values_include_ground_plane() {
        let result = OptimizationResult {
            parameters: ParameterVector::default(),
            feed_type_label: "microstrip-line".into(),
            success: true,
            objective: 0.0,
            iterations: 1,
            evaluations: 1,
            message: "Converged".into(),
        };
        let named = result.named_values();
        assert_eq!(named.len(), PARAM_COUNT + 2);
        assert_eq!(named["substrate_W"], 0.03 + 6.0 * 0.001);
    }
}

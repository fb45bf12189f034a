//! Boundary to the external electromagnetic simulator.
//!
//! The engine hands a [`BuildRequest`] to a [`Simulator`] and gets back a
//! [`Measurement`] whose fields may each be absent. How the geometry is built
//! and solved is the collaborator's business.

pub mod export;

pub use export::{S11Sweep, REFERENCE_LEVEL_DB};

use crate::core::{OptimizationResult, ParameterVector, Target};
use crate::error::DesignResult;
use crate::surrogate::inset_depth;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Everything the simulator needs to materialize one design.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub family: String,
    pub shape: String,
    pub target: Target,
    pub substrate: String,
    pub conductor: String,
    pub parameters: ParameterVector,
    pub feed_type_label: String,
}

impl BuildRequest {
    pub fn new(target: Target, substrate: impl Into<String>, parameters: ParameterVector) -> Self {
        Self {
            family: "Microstrip Patch".into(),
            shape: "Rectangular".into(),
            target,
            substrate: substrate.into(),
            conductor: "Copper".into(),
            parameters,
            feed_type_label: String::new(),
        }
    }

    pub fn from_result(
        target: Target,
        substrate: impl Into<String>,
        result: &OptimizationResult,
    ) -> Self {
        Self::new(target, substrate, result.parameters)
            .with_feed_label(result.feed_type_label.clone())
    }

    pub fn with_feed_label(mut self, label: impl Into<String>) -> Self {
        self.feed_type_label = label.into();
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

    /// Geometry in meters keyed the way the simulator driver names it.
    pub fn geometry(&self) -> IndexMap<&'static str, f64> {
        let p = &self.parameters;
        let mut geometry = IndexMap::with_capacity(8);
        geometry.insert("patch_width_m", p.patch_w());
        geometry.insert("patch_length_m", p.patch_l());
        geometry.insert("substrate_thickness_m", p.substrate_h());
        geometry.insert("substrate_width_m", p.substrate_w());
        geometry.insert("substrate_length_m", p.substrate_l());
        geometry.insert("inset_feed_m", inset_depth(p.patch_w(), p.patch_l()));
        geometry.insert("feed_width_m", p.feed_width());
        geometry.insert("frequency_GHz", self.target.frequency_ghz);
        geometry
    }
}

/// Simulator outcome; `None` marks a quantity the export did not yield.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub frequency_ghz: Option<f64>,
    pub bandwidth_mhz: Option<f64>,
    pub s11_db: Option<f64>,
}

impl Measurement {
    pub fn new(frequency_ghz: f64, bandwidth_mhz: f64, s11_db: f64) -> Self {
        Self {
            frequency_ghz: Some(frequency_ghz),
            bandwidth_mhz: Some(bandwidth_mhz),
            s11_db: Some(s11_db),
        }
    }

    pub fn absent() -> Self {
        Self::default()
    }

    /// A measurement counts as obtained once it carries a resonant frequency.
    pub fn is_observed(&self) -> bool {
        self.frequency_ghz.is_some_and(f64::is_finite)
    }
}

/// External collaborator that builds a design and measures it.
pub trait Simulator {
    fn build_and_measure(&mut self, request: &BuildRequest) -> DesignResult<Measurement>;
}

/// Adapter for drivers that leave an S11 sweep export on disk.
///
/// `run` builds and solves the design and returns the export path, which is
/// then parsed into a [`Measurement`].
pub struct ExportingSimulator<F> {
    run: F,
}

impl<F> ExportingSimulator<F>
where
    F: FnMut(&BuildRequest) -> DesignResult<PathBuf>,
{
    pub fn new(run: F) -> Self {
        Self { run }
    }
}

impl<F> Simulator for ExportingSimulator<F>
where
    F: FnMut(&BuildRequest) -> DesignResult<PathBuf>,
{
    fn build_and_measure(&mut self, request: &BuildRequest) -> DesignResult<Measurement> {
        let path = (self.run)(request)?;
        let text = fs::read_to_string(&path)?;
        Ok(S11Sweep::parse(&text)?.summarize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DesignError;

    #[test]
    fn geometry_derives_ground_plane_from_patch() {
        let params = ParameterVector::new([0.038, 0.029, 4.1, 0.0016, 4.4, 0.003, 1.0]);
        let request = BuildRequest::new(Target::new(2.4, 100.0).unwrap(), "FR-4 (lossy)", params);
        let geometry = request.geometry();
        assert_eq!(geometry["substrate_width_m"], 0.038 + 6.0 * 0.0016);
        assert_eq!(geometry["substrate_length_m"], 0.029 + 6.0 * 0.0016);
        assert!(geometry["inset_feed_m"] > 0.0);
        assert_eq!(geometry.get_index(0).map(|(k, _)| *k), Some("patch_width_m"));
    }

    #[test]
    fn exporting_simulator_parses_the_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let export = dir.path().join("s11.txt");
        fs::write(
            &export,
            "# Frequency / GHz\tS1,1 [dB]\n2.3 -4\n2.4 -12\n2.5 -20\n2.6 -12\n2.7 -4\n",
        )
        .unwrap();

        let path = export.clone();
        let mut sim = ExportingSimulator::new(move |_: &BuildRequest| Ok(path.clone()));
        let request = BuildRequest::new(
            Target::new(2.4, 100.0).unwrap(),
            "FR-4 (lossy)",
            ParameterVector::default(),
        );
        let measurement = sim.build_and_measure(&request).unwrap();
        assert_eq!(measurement.frequency_ghz, Some(2.5));
        assert_eq!(measurement.s11_db, Some(-20.0));
        assert!(measurement.is_observed());
    }

    #[test]
    fn missing_export_is_an_error() {
        let mut sim =
            ExportingSimulator::new(|_: &BuildRequest| Ok(PathBuf::from("/nonexistent/s11.txt")));
        let request = BuildRequest::new(
            Target::new(2.4, 100.0).unwrap(),
            "FR-4 (lossy)",
            ParameterVector::default(),
        );
        assert!(matches!(sim.build_and_measure(&request), Err(DesignError::Io(_))));
    }
}

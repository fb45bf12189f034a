use super::{Capabilities, ForwardSurrogate, InversePredictor};
use crate::error::DesignResult;
use std::path::Path;

/// Turns a complete artifact bundle into a live model.
pub trait ArtifactLoader {
    fn load_forward(&self, model_dir: &Path) -> DesignResult<Box<dyn ForwardSurrogate>>;
    fn load_inverse(&self, model_dir: &Path) -> DesignResult<Box<dyn InversePredictor>>;
}

/// File patterns (relative to a model directory) that make up each artifact bundle.
#[derive(Clone, Debug)]
pub struct ArtifactLayout {
    pub forward: Vec<String>,
    pub inverse: Vec<String>,
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self {
            forward: vec![
                "forward-predict/forward_model.*".into(),
                "forward-predict/forward_scaler.*".into(),
                "forward-predict/forward_encoder.*".into(),
            ],
            inverse: vec![
                "inverse-predict/inverse_model.*".into(),
                "inverse-predict/inverse_scaler.*".into(),
                "inverse-predict/inverse_encoder.*".into(),
            ],
        }
    }
}

/// Report which surrogate bundles are complete under `model_dir`.
pub fn probe_artifacts(model_dir: &Path, layout: &ArtifactLayout) -> Capabilities {
    let capabilities = Capabilities {
        forward: bundle_present(model_dir, &layout.forward),
        inverse: bundle_present(model_dir, &layout.inverse),
    };
    tracing::debug!(
        dir = %model_dir.display(),
        forward = capabilities.forward,
        inverse = capabilities.inverse,
        "probed surrogate artifacts"
    );
    capabilities
}

fn bundle_present(model_dir: &Path, patterns: &[String]) -> bool {
    let Some(dir) = model_dir.to_str() else {
        return false;
    };
    let prefix = glob::Pattern::escape(dir);
    !patterns.is_empty()
        && patterns.iter().all(|pattern| {
            let full = format!("{}/{}", prefix, pattern);
            match glob::glob(&full) {
                Ok(mut paths) => paths.any(|entry| entry.map(|p| p.is_file()).unwrap_or(false)),
                Err(_) => false,
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn complete_forward_bundle_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let forward = dir.path().join("forward-predict");
        fs::create_dir_all(&forward).unwrap();
        for name in ["forward_model.h5", "forward_scaler.save", "forward_encoder.save"] {
            fs::write(forward.join(name), b"artifact").unwrap();
        }

        let caps = probe_artifacts(dir.path(), &ArtifactLayout::default());
        assert!(caps.forward);
        assert!(!caps.inverse);
    }

    #[test]
    fn partial_bundle_is_not_available() {
        let dir = tempfile::tempdir().unwrap();
        let inverse = dir.path().join("inverse-predict");
        fs::create_dir_all(&inverse).unwrap();
        fs::write(inverse.join("inverse_model.h5"), b"artifact").unwrap();

        let caps = probe_artifacts(dir.path(), &ArtifactLayout::default());
        assert_eq!(caps, Capabilities::default());
    }
}

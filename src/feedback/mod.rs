//! Self-improvement machinery: feedback ledger, autocorrection and retraining.
//!
//! Nothing in here may abort a design request. Ledger and retrain failures
//! surface as values and `warn!` events, never as propagated errors.

pub mod autocorrect;
pub mod ledger;
pub mod regressor;
pub mod retrain;

pub use autocorrect::Autocorrector;
pub use ledger::{FeedbackLedger, FeedbackRecord, LedgerSnapshot, TrainingSample, LEDGER_HEADER};
pub use regressor::{FitOptions, FitReport, Mlp, Standardizer};
pub use retrain::{CorrectionModel, RetrainOutcome, RetrainScheduler, RetrainState, SkipReason};

use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Replace `path` with `bytes` through a sibling temp file and a rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        write_atomic(&path, b"{\"a\":1}").unwrap();
        write_atomic(&path, b"{\"a\":2}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\":2}");
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}

use crate::core::{ParameterVector, Target, NUMERIC_PARAM_COUNT};
use crate::error::{DesignError, DesignResult};
use crate::simulation::Measurement;
use chrono::{DateTime, SecondsFormat, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

pub const LEDGER_HEADER: [&str; 13] = [
    "timestamp",
    "target_Fr_GHz",
    "target_BW_MHz",
    "param_0",
    "param_1",
    "param_2",
    "param_3",
    "param_4",
    "param_5",
    "feed_type_label",
    "actual_Fr_GHz",
    "actual_BW_MHz",
    "S11_dB",
];

/// Features per training sample: target frequency, target bandwidth, six numerics.
pub const FEATURE_COUNT: usize = 2 + NUMERIC_PARAM_COUNT;
/// Labels per training sample: measured frequency and bandwidth.
pub const LABEL_COUNT: usize = 2;

const LOCK_POLL: Duration = Duration::from_millis(10);

/// One simulator outcome against the request that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedbackRecord {
    pub timestamp: DateTime<Utc>,
    pub target: Target,
    pub parameters: [f64; NUMERIC_PARAM_COUNT],
    pub feed_type_label: String,
    pub measurement: Measurement,
}

impl FeedbackRecord {
    pub fn new(
        target: Target,
        parameters: &ParameterVector,
        feed_type_label: impl Into<String>,
        measurement: Measurement,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            target,
            parameters: parameters.numeric(),
            feed_type_label: feed_type_label.into(),
            measurement,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Ledger row in [`LEDGER_HEADER`] order; absent measurements are empty fields.
    pub fn to_row(&self) -> Vec<String> {
        let optional = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_default();
        let mut row = Vec::with_capacity(LEDGER_HEADER.len());
        row.push(self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true));
        row.push(self.target.frequency_ghz.to_string());
        row.push(self.target.bandwidth_mhz.to_string());
        row.extend(self.parameters.iter().map(f64::to_string));
        row.push(self.feed_type_label.clone());
        row.push(optional(self.measurement.frequency_ghz));
        row.push(optional(self.measurement.bandwidth_mhz));
        row.push(optional(self.measurement.s11_db));
        row
    }
}

/// Numeric view of one ledger row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrainingSample {
    pub features: [f64; FEATURE_COUNT],
    pub labels: [f64; LABEL_COUNT],
}

/// Ledger contents at one point in time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LedgerSnapshot {
    /// Data rows in the file, usable or not
    pub rows: usize,
    /// Rows whose feature and label fields all parsed
    pub samples: Vec<TrainingSample>,
}

impl LedgerSnapshot {
    pub fn dropped(&self) -> usize {
        self.rows - self.samples.len()
    }
}

/// Append-only CSV record of design outcomes.
#[derive(Debug)]
pub struct FeedbackLedger {
    path: PathBuf,
    lock_timeout: Duration,
    rows: usize,
}

impl FeedbackLedger {
    /// Open (without creating) the ledger at `path` and recover its row count.
    pub fn open(path: impl Into<PathBuf>, lock_timeout_ms: u64) -> Self {
        let path = path.into();
        let rows = match count_rows(&path) {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ledger unreadable, starting row count at 0");
                0
            }
        };
        tracing::debug!(path = %path.display(), rows, "opened feedback ledger");
        Self {
            path,
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            rows,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Re-read the row count, picking up appends from other processes.
    pub fn refresh(&mut self) -> usize {
        self.rows = count_rows(&self.path).unwrap_or(self.rows);
        self.rows
    }

    /// Append one record, writing the header first if the store is empty.
    ///
    /// The row reaches the file in a single write while an exclusive advisory
    /// lock is held on the ledger handle, so a failed append leaves no partial
    /// row behind. The OS drops the lock with the handle, including when the
    /// holding process dies.
    pub fn append(&mut self, record: &FeedbackRecord) -> DesignResult<()> {
        let fail = |what: &str, err: &dyn std::fmt::Display| {
            DesignError::LedgerWrite(format!("{} {}: {}", what, self.path.display(), err))
        };

        let row = encode_record(record.to_row()).map_err(|e| fail("encode row for", &e))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| fail("create directory for", &e))?;
        }

        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| fail("open", &e))?;
        lock_exclusive(&file, &self.path, self.lock_timeout)?;
        let empty = file.metadata().map_err(|e| fail("stat", &e))?.len() == 0;

        let mut payload = if empty {
            encode_record(LEDGER_HEADER).map_err(|e| fail("encode header for", &e))?
        } else {
            Vec::new()
        };
        payload.extend_from_slice(&row);
        file.write_all(&payload).map_err(|e| fail("write", &e))?;
        file.sync_data().map_err(|e| fail("sync", &e))?;

        self.rows += 1;
        Ok(())
    }

    /// Best-effort append: failures are logged and reported as `false`.
    pub fn log(&mut self, record: &FeedbackRecord) -> bool {
        match self.append(record) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "feedback record not logged");
                false
            }
        }
    }

    /// Parse every row; rows with missing or non-numeric fields are counted but not sampled.
    pub fn snapshot(&self) -> DesignResult<LedgerSnapshot> {
        if !self.path.exists() {
            return Ok(LedgerSnapshot::default());
        }
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)
            .map_err(csv_error)?;

        let mut snapshot = LedgerSnapshot::default();
        for result in reader.records() {
            snapshot.rows += 1;
            let Ok(record) = result else {
                continue;
            };
            let number = |i: usize| {
                record
                    .get(i)
                    .and_then(|s| s.trim().parse::<f64>().ok())
                    .filter(|v| v.is_finite())
            };

            let mut features = [0.0; FEATURE_COUNT];
            let mut labels = [0.0; LABEL_COUNT];
            let parsed = (0..FEATURE_COUNT).all(|i| match number(1 + i) {
                Some(v) => {
                    features[i] = v;
                    true
                }
                None => false,
            }) && (0..LABEL_COUNT).all(|i| match number(10 + i) {
                Some(v) => {
                    labels[i] = v;
                    true
                }
                None => false,
            });
            if parsed {
                snapshot.samples.push(TrainingSample { features, labels });
            }
        }
        Ok(snapshot)
    }
}

fn encode_record<I, T>(fields: I) -> io::Result<Vec<u8>>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    writer.write_record(fields).map_err(io::Error::other)?;
    writer.into_inner().map_err(|e| io::Error::other(e.to_string()))
}

fn count_rows(path: &Path) -> DesignResult<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(csv_error)?;
    let mut rows = 0;
    for record in reader.records() {
        record.map_err(csv_error)?;
        rows += 1;
    }
    Ok(rows)
}

fn csv_error(err: csv::Error) -> DesignError {
    DesignError::Io(io::Error::other(err))
}

fn lock_exclusive(file: &File, path: &Path, timeout: Duration) -> DesignResult<()> {
    let start = Instant::now();
    loop {
        match file.try_lock() {
            Ok(()) => return Ok(()),
            Err(TryLockError::WouldBlock) => {
                if start.elapsed() >= timeout {
                    return Err(DesignError::LedgerWrite(format!(
                        "timed out after {:?} waiting for the lock on {}",
                        timeout,
                        path.display()
                    )));
                }
                thread::sleep(LOCK_POLL);
            }
            Err(TryLockError::Error(err)) => {
                return Err(DesignError::LedgerWrite(format!(
                    "cannot lock {}: {}",
                    path.display(),
                    err
                )));
            }
        }
    }
}

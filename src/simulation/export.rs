use super::Measurement;
use crate::error::{DesignError, DesignResult};
use regex::Regex;
use std::sync::OnceLock;

/// Return-loss level that delimits the impedance bandwidth.
pub const REFERENCE_LEVEL_DB: f64 = -10.0;

fn data_line() -> DesignResult<&'static Regex> {
    static LINE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    LINE.get_or_init(|| {
        let number = r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?";
        Regex::new(&format!(r"^\s*({number})[\s,;]+({number})\s*$"))
    })
    .as_ref()
    .map_err(|e| DesignError::MeasurementParse(format!("sample pattern: {}", e)))
}

/// Frequency (GHz) / S11 (dB) sweep read from a simulator export.
#[derive(Clone, Debug, PartialEq)]
pub struct S11Sweep {
    points: Vec<(f64, f64)>,
}

impl S11Sweep {
    /// Parse a two-column export. Header, comment and separator lines are skipped.
    pub fn parse(text: &str) -> DesignResult<Self> {
        let line = data_line()?;
        let mut points = Vec::new();
        for raw in text.lines() {
            let Some(caps) = line.captures(raw) else {
                continue;
            };
            let (Ok(freq), Ok(db)) = (caps[1].parse::<f64>(), caps[2].parse::<f64>()) else {
                continue;
            };
            if freq.is_finite() && db.is_finite() {
                points.push((freq, db));
            }
        }
        if points.is_empty() {
            return Err(DesignError::MeasurementParse(
                "export contains no frequency/S11 samples".into(),
            ));
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Self { points })
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Resonance at the deepest dip and the −10 dB bandwidth around it.
    ///
    /// Bandwidth is absent when the dip never reaches the reference level or
    /// the sweep ends before the response climbs back above it.
    pub fn summarize(&self) -> Measurement {
        let Some((dip_index, &(dip_freq, dip_db))) = self
            .points
            .iter()
            .enumerate()
            .min_by(|a, b| a.1 .1.total_cmp(&b.1 .1))
        else {
            return Measurement::absent();
        };

        Measurement {
            frequency_ghz: Some(dip_freq),
            bandwidth_mhz: self.bandwidth_mhz(dip_index),
            s11_db: Some(dip_db),
        }
    }

    fn bandwidth_mhz(&self, dip: usize) -> Option<f64> {
        if self.points[dip].1 >= REFERENCE_LEVEL_DB {
            return None;
        }
        let lower = (1..=dip)
            .rev()
            .find(|&i| self.points[i - 1].1 >= REFERENCE_LEVEL_DB)
            .map(|i| crossing(self.points[i - 1], self.points[i]))?;
        let upper = (dip + 1..self.points.len())
            .find(|&i| self.points[i].1 >= REFERENCE_LEVEL_DB)
            .map(|i| crossing(self.points[i - 1], self.points[i]))?;
        Some((upper - lower) * 1e3)
    }
}

/// Frequency where the segment between two samples meets the reference level.
fn crossing((f0, s0): (f64, f64), (f1, s1): (f64, f64)) -> f64 {
    if s1 == s0 {
        return f0;
    }
    f0 + (REFERENCE_LEVEL_DB - s0) * (f1 - f0) / (s1 - s0)
}

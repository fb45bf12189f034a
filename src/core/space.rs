use super::types::*;
use crate::error::{DesignError, DesignResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ===== FIXED SET =====

/// Parameters held constant for a request. Anything not listed is free.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FixedSet {
    values: IndexMap<ParamName, f64>,
}

impl FixedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. Validation happens when the set is partitioned.
    pub fn with(mut self, name: ParamName, value: f64) -> Self {
        self.values.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: ParamName, value: f64) -> Option<f64> {
        self.values.insert(name, value)
    }

    /// Build from string-keyed pairs, failing on the first unknown name.
    pub fn from_named<I, S>(pairs: I) -> DesignResult<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let mut fixed = Self::new();
        for (name, value) in pairs {
            fixed.insert(name.as_ref().parse()?, value);
        }
        Ok(fixed)
    }

    pub fn get(&self, name: ParamName) -> Option<f64> {
        self.values.get(&name).copied()
    }

    pub fn contains(&self, name: ParamName) -> bool {
        self.values.contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamName, f64)> + '_ {
        self.values.iter().map(|(&name, &value)| (name, value))
    }

    /// Merge another set on top of this one; later values win.
    pub fn extend(&mut self, other: &FixedSet) {
        for (name, value) in other.iter() {
            self.values.insert(name, value);
        }
    }
}

// ===== CATEGORICAL DECODING =====

/// Maps the continuous search coordinate of a categorical parameter onto a label index.
pub trait CategoricalDecoding: Send + Sync {
    fn decode(&self, raw: f64, label_count: usize) -> usize;
}

/// Round to the nearest index and clamp into the label range.
#[derive(Clone, Copy, Debug, Default)]
pub struct NearestIndex;

impl CategoricalDecoding for NearestIndex {
    fn decode(&self, raw: f64, label_count: usize) -> usize {
        if label_count == 0 || !raw.is_finite() {
            return 0;
        }
        let max = (label_count - 1) as f64;
        raw.round().clamp(0.0, max) as usize
    }
}

// ===== PARAMETER SPACE =====

/// The seven design parameters with their bounds and initial values.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterSpace {
    bounds: [Bound; PARAM_COUNT],
    defaults: [f64; PARAM_COUNT],
}

impl Default for ParameterSpace {
    fn default() -> Self {
        Self {
            bounds: PARAMETER_BOUNDS,
            defaults: DEFAULT_VALUES,
        }
    }
}

impl ParameterSpace {
    pub fn bound(&self, name: ParamName) -> Bound {
        self.bounds[name.index()]
    }

    pub fn bounds(&self) -> &[Bound; PARAM_COUNT] {
        &self.bounds
    }

    pub fn defaults(&self) -> ParameterVector {
        ParameterVector::new(self.defaults)
    }

    /// Split the parameters into fixed and free subsets.
    ///
    /// Free indices keep model order. Fails when a fixed value lies outside its
    /// bound or a fixed feed type is not an integral label index.
    pub fn partition(&self, fixed: &FixedSet) -> DesignResult<Partition> {
        for (name, value) in fixed.iter() {
            let bound = self.bound(name);
            if !value.is_finite() || !bound.contains(value) {
                return Err(DesignError::invalid(
                    name.as_str(),
                    format!(
                        "fixed value {} outside [{}, {}]",
                        value, bound.min, bound.max
                    ),
                ));
            }
            if name.is_categorical() && value.fract() != 0.0 {
                return Err(DesignError::invalid(
                    name.as_str(),
                    format!("fixed categorical index must be integral, got {}", value),
                ));
            }
        }

        let mut fixed_entries = Vec::with_capacity(fixed.len());
        let mut free = Vec::with_capacity(PARAM_COUNT - fixed.len());
        for name in ParamName::ALL {
            match fixed.get(name) {
                Some(value) => fixed_entries.push((name, value)),
                None => free.push(name),
            }
        }

        let initial = free.iter().map(|&n| self.defaults[n.index()]).collect();
        let bounds = free.iter().map(|&n| self.bound(n).as_tuple()).collect();

        Ok(Partition {
            defaults: self.defaults,
            fixed: fixed_entries,
            free,
            initial,
            bounds,
        })
    }
}

/// Fixed/free split of the parameter vector for one request.
#[derive(Clone, Debug, PartialEq)]
pub struct Partition {
    defaults: [f64; PARAM_COUNT],
    fixed: Vec<(ParamName, f64)>,
    free: Vec<ParamName>,
    initial: Vec<f64>,
    bounds: Vec<(f64, f64)>,
}

impl Partition {
    pub fn free(&self) -> &[ParamName] {
        &self.free
    }

    pub fn fixed(&self) -> &[(ParamName, f64)] {
        &self.fixed
    }

    /// Initial guess for the free parameters only.
    pub fn initial(&self) -> &[f64] {
        &self.initial
    }

    /// Bounds for the free parameters only.
    pub fn bounds(&self) -> &[(f64, f64)] {
        &self.bounds
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Merge free values and fixed values back into full model order.
    pub fn assemble(&self, free_values: &[f64]) -> ParameterVector {
        let mut values = self.defaults;
        for (name, &value) in self.free.iter().zip(free_values) {
            values[name.index()] = value;
        }
        for &(name, value) in &self.fixed {
            values[name.index()] = value;
        }
        ParameterVector::new(values)
    }
}

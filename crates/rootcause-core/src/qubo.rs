//! Quadratic energy model construction.
//!
//! Converts abnormal sensors and candidate failure patterns into a QUBO:
//!
//! ```text
//! E(z, y) = alpha * Σ_i w_i (1 - z_i)
//!         + beta  * Σ_j y_j
//!         + gamma * Σ_i (z_i - Σ_j A_ij y_j)^2
//! ```
//!
//! `z_i` says sensor `i` is a genuine anomaly, `y_j` says pattern `j` is
//! selected, `w_i` is sensor severity and `A_ij = 1` when pattern `j` lists
//! sensor `i`. A pattern's own weight is carried for reporting only and does
//! not enter the energy.
//!
//! The squared consistency term is expanded into degree-two terms using
//! `b^2 = b` for every boolean `b`:
//!
//! ```text
//! (z - Σ_j y_j)^2 = z + Σ_j y_j - 2 Σ_j z y_j + 2 Σ_{j<k} y_j y_k
//! ```
//!
//! The [`VariableIndex`] produced here is the single source of truth for bit
//! positions in every later stage.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{DiagnosisError, Result};
use crate::observation::{FailurePattern, SensorObservation};

// ---------------------------------------------------------------------------
// Weights
// ---------------------------------------------------------------------------

/// Scalar weights of the three energy terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuboWeights {
    /// Anomaly coverage: cost of leaving a severe sensor unexplained.
    pub alpha: f64,
    /// Parsimony: cost per selected pattern.
    pub beta: f64,
    /// Consistency between sensor truth and selected coverage.
    pub gamma: f64,
}

impl Default for QuboWeights {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
            gamma: 1.0,
        }
    }
}

impl QuboWeights {
    pub fn new(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self { alpha, beta, gamma }
    }

    /// Reject non-finite weights. Negative values are accepted numerically.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("alpha", self.alpha), ("beta", self.beta), ("gamma", self.gamma)] {
            if !value.is_finite() {
                return Err(DiagnosisError::invalid_input(format!(
                    "weight {name} must be finite, got {value}"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Variables
// ---------------------------------------------------------------------------

/// What a boolean decision variable means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    /// "Is this sensor's anomaly real?"
    SensorTruth,
    /// "Is this pattern selected?"
    PatternActive,
}

impl std::fmt::Display for VariableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SensorTruth => write!(f, "sensor_truth"),
            Self::PatternActive => write!(f, "pattern_active"),
        }
    }
}

/// A named boolean decision dimension with a stable bit position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// `z_<sensor_id>` or `y_<pattern_id>`.
    pub name: String,
    pub kind: VariableKind,
    /// Sensor or pattern identifier this variable belongs to.
    pub entity_id: String,
    /// Bit position shared by every downstream stage.
    pub index: usize,
}

/// Deterministic variable numbering: sensors in input order, then patterns in
/// input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableIndex {
    variables: Vec<Variable>,
    by_name: HashMap<String, usize>,
}

impl VariableIndex {
    /// Assign indices to sensor-truth then pattern-active variables.
    /// Fails on duplicate sensor or pattern identifiers.
    pub fn from_entities(
        sensors: &[SensorObservation],
        patterns: &[FailurePattern],
    ) -> Result<Self> {
        let mut index = Self {
            variables: Vec::with_capacity(sensors.len() + patterns.len()),
            by_name: HashMap::new(),
        };
        for s in sensors {
            index.push(VariableKind::SensorTruth, s.sensor_id())?;
        }
        for p in patterns {
            index.push(VariableKind::PatternActive, p.pattern_id())?;
        }
        Ok(index)
    }

    fn push(&mut self, kind: VariableKind, entity_id: &str) -> Result<()> {
        let name = variable_name(kind, entity_id);
        if self.by_name.contains_key(&name) {
            let what = match kind {
                VariableKind::SensorTruth => "sensor",
                VariableKind::PatternActive => "pattern",
            };
            return Err(DiagnosisError::invalid_input(format!(
                "duplicate {what} id '{entity_id}'"
            )));
        }
        let idx = self.variables.len();
        self.by_name.insert(name.clone(), idx);
        self.variables.push(Variable {
            name,
            kind,
            entity_id: entity_id.to_string(),
            index: idx,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Variable> {
        self.variables.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter()
    }

    /// Index of a variable by its full name (`z_...` / `y_...`).
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn sensor_index(&self, sensor_id: &str) -> Option<usize> {
        self.index_of(&variable_name(VariableKind::SensorTruth, sensor_id))
    }

    pub fn pattern_index(&self, pattern_id: &str) -> Option<usize> {
        self.index_of(&variable_name(VariableKind::PatternActive, pattern_id))
    }

    /// Pattern-active variables in index order.
    pub fn pattern_variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables
            .iter()
            .filter(|v| v.kind == VariableKind::PatternActive)
    }

    /// Sensor-truth variables in index order.
    pub fn sensor_variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables
            .iter()
            .filter(|v| v.kind == VariableKind::SensorTruth)
    }
}

fn variable_name(kind: VariableKind, entity_id: &str) -> String {
    match kind {
        VariableKind::SensorTruth => format!("z_{entity_id}"),
        VariableKind::PatternActive => format!("y_{entity_id}"),
    }
}

// ---------------------------------------------------------------------------
// Coefficient map
// ---------------------------------------------------------------------------

/// Degree-two polynomial over boolean variables.
///
/// Keys are index pairs stored with `i <= j`; `(i, i)` is the linear
/// coefficient of variable `i`. Adding to an existing pair accumulates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CoefficientMap {
    num_variables: usize,
    terms: BTreeMap<(usize, usize), f64>,
    offset: f64,
}

/// One coefficient with its variable names, for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCoefficient {
    pub first: String,
    pub second: String,
    pub value: f64,
}

impl CoefficientMap {
    /// Empty map over `num_variables` variables.
    pub fn new(num_variables: usize) -> Self {
        Self {
            num_variables,
            terms: BTreeMap::new(),
            offset: 0.0,
        }
    }

    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    /// Accumulate `value` onto the unordered pair `{i, j}`.
    pub fn add(&mut self, i: usize, j: usize, value: f64) {
        let key = if i <= j { (i, j) } else { (j, i) };
        *self.terms.entry(key).or_insert(0.0) += value;
    }

    pub fn add_linear(&mut self, i: usize, value: f64) {
        self.add(i, i, value);
    }

    pub fn add_offset(&mut self, value: f64) {
        self.offset += value;
    }

    /// Coefficient of the unordered pair `{i, j}` (0.0 when absent).
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let key = if i <= j { (i, j) } else { (j, i) };
        self.terms.get(&key).copied().unwrap_or(0.0)
    }

    pub fn linear(&self, i: usize) -> f64 {
        self.get(i, i)
    }

    /// Constant term carried alongside the polynomial.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// All stored `((i, j), value)` entries, `i <= j`, in key order.
    pub fn terms(&self) -> impl Iterator<Item = ((usize, usize), f64)> + '_ {
        self.terms.iter().map(|(&k, &v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Exact boolean energy of `bits` (one per variable, index order).
    pub fn energy(&self, bits: &[bool]) -> Result<f64> {
        if bits.len() != self.num_variables {
            return Err(DiagnosisError::invalid_index(format!(
                "assignment has {} bits, model has {} variables",
                bits.len(),
                self.num_variables
            )));
        }
        let mut e = self.offset;
        for (&(i, j), &c) in &self.terms {
            if bits[i] && bits[j] {
                e += c;
            }
        }
        Ok(e)
    }

    /// Check the map against `index`: same variable count and no key outside
    /// the index space.
    pub fn check_index(&self, index: &VariableIndex) -> Result<()> {
        if self.num_variables != index.len() {
            return Err(DiagnosisError::invalid_index(format!(
                "coefficient map spans {} variables, index has {}",
                self.num_variables,
                index.len()
            )));
        }
        if let Some((&(i, j), _)) = self
            .terms
            .iter()
            .find(|&(&(_, j), _)| j >= index.len())
        {
            return Err(DiagnosisError::invalid_index(format!(
                "coefficient ({i}, {j}) references a variable outside the index (size {})",
                index.len()
            )));
        }
        Ok(())
    }

    /// Coefficient-wise comparison; absent entries count as zero.
    pub fn approx_eq(&self, other: &Self, tol: f64) -> bool {
        if self.num_variables != other.num_variables || (self.offset - other.offset).abs() > tol {
            return false;
        }
        let keys = self.terms.keys().chain(other.terms.keys());
        for &(i, j) in keys {
            if (self.get(i, j) - other.get(i, j)).abs() > tol {
                return false;
            }
        }
        true
    }

    /// Entries with variable names resolved through `index`.
    pub fn named(&self, index: &VariableIndex) -> Result<Vec<NamedCoefficient>> {
        self.check_index(index)?;
        Ok(self
            .terms
            .iter()
            .map(|(&(i, j), &value)| NamedCoefficient {
                first: index.variables[i].name.clone(),
                second: index.variables[j].name.clone(),
                value,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Output of [`build_energy_model`].
#[derive(Debug, Clone)]
pub struct EnergyModel {
    pub coefficients: CoefficientMap,
    pub index: VariableIndex,
}

/// Build the QUBO and its variable index.
///
/// Patterns may list sensors that are not in `sensors`; those entries simply
/// contribute nothing. Only emptiness, duplicates and non-finite weights are
/// rejected.
pub fn build_energy_model(
    sensors: &[SensorObservation],
    patterns: &[FailurePattern],
    weights: QuboWeights,
) -> Result<EnergyModel> {
    if sensors.is_empty() {
        return Err(DiagnosisError::invalid_input("at least one sensor is required"));
    }
    if patterns.is_empty() {
        return Err(DiagnosisError::invalid_input("at least one pattern is required"));
    }
    weights.validate()?;

    let index = VariableIndex::from_entities(sensors, patterns)?;
    let mut q = CoefficientMap::new(index.len());
    let QuboWeights { alpha, beta, gamma } = weights;
    let n_sensors = sensors.len();

    // alpha * w_i * (1 - z_i)
    for (i, s) in sensors.iter().enumerate() {
        q.add_offset(alpha * s.severity());
        q.add_linear(i, -alpha * s.severity());
    }

    // beta * y_j; the pattern weight is carried metadata, not a cost
    for j in 0..patterns.len() {
        q.add_linear(n_sensors + j, beta);
    }

    // gamma * (z_i - Σ_j A_ij y_j)^2
    for (i, s) in sensors.iter().enumerate() {
        let covering: Vec<usize> = patterns
            .iter()
            .enumerate()
            .filter(|(_, p)| p.covers(s.sensor_id()))
            .map(|(j, _)| n_sensors + j)
            .collect();

        q.add_linear(i, gamma);
        for (a, &yj) in covering.iter().enumerate() {
            q.add_linear(yj, gamma);
            q.add(i, yj, -2.0 * gamma);
            for &yk in &covering[a + 1..] {
                q.add(yj, yk, 2.0 * gamma);
            }
        }
    }

    log::debug!(
        "energy model: {} sensors, {} patterns, {} variables, {} terms",
        sensors.len(),
        patterns.len(),
        index.len(),
        q.len()
    );

    Ok(EnergyModel {
        coefficients: q,
        index,
    })
}

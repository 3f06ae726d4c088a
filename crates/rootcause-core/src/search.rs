//! Derivative-free classical searches over the variational parameters.
//!
//! Searches use an ask/tell protocol: [`ParameterSearch::ask`] proposes the
//! next point, the caller evaluates it, and [`ParameterSearch::tell`] feeds
//! the value back. The caller owns the evaluation loop, so it can enforce an
//! iteration budget, a per-call timeout and cancellation between any two
//! evaluations without the search knowing about any of them.

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{DiagnosisError, Result};

/// Initial simplex edge length (radians).
pub const DEFAULT_SIMPLEX_STEP: f64 = 0.5;

/// Consecutive quiet SPSA iterations required before declaring convergence.
const SPSA_STABLE_ITERATIONS: usize = 3;

/// Ask/tell interface shared by every search.
pub trait ParameterSearch: Send {
    /// Point to evaluate next. Repeated calls without `tell` return the
    /// same point.
    fn ask(&mut self) -> Vec<f64>;

    /// Objective value at the point last returned by `ask`.
    fn tell(&mut self, value: f64);

    /// True once the search's own stopping rule is satisfied.
    fn converged(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// Which search drives the variational loop.
///
/// `cobyla` is accepted as an alias for Nelder-Mead: both are
/// derivative-free local searches and only Nelder-Mead is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OptimizerKind {
    #[default]
    NelderMead,
    Spsa,
}

impl OptimizerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NelderMead => "nelder_mead",
            Self::Spsa => "spsa",
        }
    }

    /// Build a search starting at `initial`.
    pub fn build(
        &self,
        initial: &[f64],
        tolerance: f64,
        seed: Option<u64>,
    ) -> Box<dyn ParameterSearch> {
        match self {
            Self::NelderMead => Box::new(NelderMead::new(initial, DEFAULT_SIMPLEX_STEP, tolerance)),
            Self::Spsa => Box::new(Spsa::new(initial, tolerance, seed)),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizerKind {
    type Err = DiagnosisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nelder_mead" | "nelder-mead" | "neldermead" | "nm" | "cobyla" => Ok(Self::NelderMead),
            "spsa" => Ok(Self::Spsa),
            other => Err(DiagnosisError::invalid_input(format!(
                "unknown optimizer '{other}' (expected nelder_mead or spsa)"
            ))),
        }
    }
}

impl TryFrom<String> for OptimizerKind {
    type Error = DiagnosisError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<OptimizerKind> for String {
    fn from(kind: OptimizerKind) -> Self {
        kind.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// Nelder-Mead
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Phase {
    Initial(usize),
    Reflect,
    Expand { reflected: Vec<f64>, value: f64 },
    ContractOutside { value: f64 },
    ContractInside,
    Shrink(usize),
}

/// Downhill simplex with the standard coefficients
/// (reflect 1, expand 2, contract 0.5, shrink 0.5).
///
/// Converged when the spread of simplex values is within `tolerance`.
#[derive(Debug, Clone)]
pub struct NelderMead {
    vertices: Vec<Vec<f64>>,
    values: Vec<f64>,
    centroid: Vec<f64>,
    pending: Vec<f64>,
    phase: Phase,
    tolerance: f64,
}

impl NelderMead {
    pub fn new(initial: &[f64], step: f64, tolerance: f64) -> Self {
        let mut vertices = vec![initial.to_vec()];
        for i in 0..initial.len() {
            let mut v = initial.to_vec();
            v[i] += step;
            vertices.push(v);
        }
        let values = vec![f64::INFINITY; vertices.len()];
        Self {
            pending: initial.to_vec(),
            centroid: initial.to_vec(),
            vertices,
            values,
            phase: Phase::Initial(0),
            tolerance,
        }
    }

    /// Best vertex seen by the simplex so far.
    pub fn best(&self) -> (&[f64], f64) {
        let i = (0..self.values.len())
            .min_by(|&a, &b| self.values[a].total_cmp(&self.values[b]))
            .unwrap_or(0);
        (&self.vertices[i], self.values[i])
    }

    fn spread(&self) -> f64 {
        let lo = self.values.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        hi - lo
    }

    /// Along the ray from the centroid: `c + t·(x − c)`.
    fn along(&self, x: &[f64], t: f64) -> Vec<f64> {
        self.centroid
            .iter()
            .zip(x)
            .map(|(c, xi)| c + t * (xi - c))
            .collect()
    }

    fn begin_iteration(&mut self) {
        let mut order: Vec<usize> = (0..self.values.len()).collect();
        order.sort_by(|&a, &b| self.values[a].total_cmp(&self.values[b]));
        self.vertices = order.iter().map(|&i| self.vertices[i].clone()).collect();
        self.values = order.iter().map(|&i| self.values[i]).collect();

        let n = self.vertices.len() - 1;
        if n == 0 {
            self.pending = self.vertices[0].clone();
            self.phase = Phase::Initial(0);
            return;
        }

        let mut centroid = vec![0.0; n];
        for v in &self.vertices[..n] {
            for (c, x) in centroid.iter_mut().zip(v) {
                *c += x / n as f64;
            }
        }
        self.centroid = centroid;
        self.pending = self.along(&self.vertices[n], -1.0);
        self.phase = Phase::Reflect;
    }

    fn replace_worst(&mut self, point: Vec<f64>, value: f64) {
        let last = self.vertices.len() - 1;
        self.vertices[last] = point;
        self.values[last] = value;
        self.begin_iteration();
    }

    fn start_shrink(&mut self) {
        let best = self.vertices[0].clone();
        for i in 1..self.vertices.len() {
            let shrunk = best
                .iter()
                .zip(&self.vertices[i])
                .map(|(b, x)| b + 0.5 * (x - b))
                .collect();
            self.vertices[i] = shrunk;
            self.values[i] = f64::INFINITY;
        }
        self.pending = self.vertices[1].clone();
        self.phase = Phase::Shrink(1);
    }
}

impl ParameterSearch for NelderMead {
    fn ask(&mut self) -> Vec<f64> {
        self.pending.clone()
    }

    fn tell(&mut self, value: f64) {
        let n = self.vertices.len() - 1;
        match std::mem::replace(&mut self.phase, Phase::Reflect) {
            Phase::Initial(k) => {
                self.values[k] = value;
                if k < n {
                    self.pending = self.vertices[k + 1].clone();
                    self.phase = Phase::Initial(k + 1);
                } else {
                    self.begin_iteration();
                }
            }
            Phase::Reflect => {
                let reflected = self.pending.clone();
                if value < self.values[0] {
                    self.pending = self.along(&reflected, 2.0);
                    self.phase = Phase::Expand { reflected, value };
                } else if value < self.values[n - 1] {
                    self.replace_worst(reflected, value);
                } else if value < self.values[n] {
                    self.pending = self.along(&reflected, 0.5);
                    self.phase = Phase::ContractOutside { value };
                } else {
                    self.pending = self.along(&self.vertices[n], 0.5);
                    self.phase = Phase::ContractInside;
                }
            }
            Phase::Expand {
                reflected,
                value: reflected_value,
            } => {
                if value < reflected_value {
                    let expanded = self.pending.clone();
                    self.replace_worst(expanded, value);
                } else {
                    self.replace_worst(reflected, reflected_value);
                }
            }
            Phase::ContractOutside {
                value: reflected_value,
            } => {
                if value <= reflected_value {
                    let contracted = self.pending.clone();
                    self.replace_worst(contracted, value);
                } else {
                    self.start_shrink();
                }
            }
            Phase::ContractInside => {
                if value < self.values[n] {
                    let contracted = self.pending.clone();
                    self.replace_worst(contracted, value);
                } else {
                    self.start_shrink();
                }
            }
            Phase::Shrink(k) => {
                self.values[k] = value;
                if k < n {
                    self.pending = self.vertices[k + 1].clone();
                    self.phase = Phase::Shrink(k + 1);
                } else {
                    self.begin_iteration();
                }
            }
        }
    }

    fn converged(&self) -> bool {
        let settled = match self.phase {
            Phase::Reflect => true,
            Phase::Initial(0) => self.vertices.len() == 1 && self.values[0].is_finite(),
            _ => false,
        };
        settled && self.spread() <= self.tolerance
    }
}

// ---------------------------------------------------------------------------
// SPSA
// ---------------------------------------------------------------------------

/// Simultaneous-perturbation stochastic approximation.
///
/// Each iteration costs two evaluations, at `θ + c_k·Δ` and `θ − c_k·Δ` with
/// a random ±1 direction `Δ`. Gains follow Spall's schedule
/// `a_k = a / (k + 1 + A)^0.602`, `c_k = c / (k + 1)^0.101`.
#[derive(Debug, Clone)]
pub struct Spsa {
    theta: Vec<f64>,
    delta: Vec<f64>,
    k: usize,
    a: f64,
    c: f64,
    stability: f64,
    plus: Option<f64>,
    last_mean: Option<f64>,
    quiet: usize,
    tolerance: f64,
    rng: StdRng,
}

impl Spsa {
    pub fn new(initial: &[f64], tolerance: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };
        let mut spsa = Self {
            theta: initial.to_vec(),
            delta: Vec::new(),
            k: 0,
            a: 0.2,
            c: 0.1,
            stability: 10.0,
            plus: None,
            last_mean: None,
            quiet: 0,
            tolerance,
            rng,
        };
        spsa.draw_direction();
        spsa
    }

    pub fn current(&self) -> &[f64] {
        &self.theta
    }

    fn draw_direction(&mut self) {
        let rng = &mut self.rng;
        self.delta = (0..self.theta.len())
            .map(|_| if rng.random_bool(0.5) { 1.0 } else { -1.0 })
            .collect();
    }

    fn a_k(&self) -> f64 {
        self.a / (self.k as f64 + 1.0 + self.stability).powf(0.602)
    }

    fn c_k(&self) -> f64 {
        self.c / (self.k as f64 + 1.0).powf(0.101)
    }
}

impl ParameterSearch for Spsa {
    fn ask(&mut self) -> Vec<f64> {
        let sign = if self.plus.is_none() { 1.0 } else { -1.0 };
        let ck = self.c_k();
        self.theta
            .iter()
            .zip(&self.delta)
            .map(|(t, d)| t + sign * ck * d)
            .collect()
    }

    fn tell(&mut self, value: f64) {
        let Some(plus) = self.plus.take() else {
            self.plus = Some(value);
            return;
        };

        let (ak, ck) = (self.a_k(), self.c_k());
        for (t, d) in self.theta.iter_mut().zip(&self.delta) {
            let g = (plus - value) / (2.0 * ck * d);
            *t -= ak * g;
        }

        let mean = 0.5 * (plus + value);
        match self.last_mean {
            Some(prev) if (mean - prev).abs() <= self.tolerance => self.quiet += 1,
            _ => self.quiet = 0,
        }
        self.last_mean = Some(mean);
        self.k += 1;
        self.draw_direction();
    }

    fn converged(&self) -> bool {
        self.plus.is_none() && self.quiet >= SPSA_STABLE_ITERATIONS
    }
}

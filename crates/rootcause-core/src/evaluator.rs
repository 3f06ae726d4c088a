//! Evaluator capability: the execution substrate behind the variational loop.
//!
//! An [`Evaluator`] turns a variational parameter vector into either an
//! expected energy or a histogram of measured bit assignments. The substrate
//! may be a classical simulator ([`crate::simulator::StatevectorEvaluator`]),
//! remote hardware, or the deterministic [`FixedEvaluator`] used in tests.
//! Implementations signal [`DiagnosisError::BackendUnavailable`] when they
//! cannot run and [`DiagnosisError::InvalidCircuit`] when the problem exceeds
//! their limits.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{DiagnosisError, Result};
use crate::ising::SpinHamiltonian;

// ---------------------------------------------------------------------------
// Bitstrings
// ---------------------------------------------------------------------------

/// One bit per variable, position `k` = variable index `k`.
///
/// Rendered as a `'0'/'1'` string read left to right from index 0.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bitstring(Vec<bool>);

impl Bitstring {
    pub fn new(bits: Vec<bool>) -> Self {
        Self(bits)
    }

    /// Bits of basis state `basis` over `num_bits` positions (bit `k` of the
    /// integer is position `k`).
    pub fn from_basis(basis: usize, num_bits: usize) -> Self {
        Self((0..num_bits).map(|k| (basis >> k) & 1 == 1).collect())
    }

    pub fn bits(&self) -> &[bool] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, k: usize) -> bool {
        self.0.get(k).copied().unwrap_or(false)
    }

    pub fn count_ones(&self) -> usize {
        self.0.iter().filter(|&&b| b).count()
    }
}

impl fmt::Display for Bitstring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            f.write_str(if b { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl FromStr for Bitstring {
    type Err = DiagnosisError;

    fn from_str(s: &str) -> Result<Self> {
        s.chars()
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                other => Err(DiagnosisError::invalid_input(format!(
                    "bitstring '{s}' contains '{other}'"
                ))),
            })
            .collect::<Result<Vec<bool>>>()
            .map(Self)
    }
}

impl Serialize for Bitstring {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Bitstring {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Sample distribution
// ---------------------------------------------------------------------------

/// Histogram of measured bit assignments. Counts always sum to
/// `total_draws`, and every key has exactly `num_bits` bits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SampleCounts")]
pub struct SampleDistribution {
    num_bits: usize,
    total_draws: u64,
    counts: BTreeMap<Bitstring, u64>,
}

#[derive(Deserialize)]
struct SampleCounts {
    counts: BTreeMap<Bitstring, u64>,
}

impl TryFrom<SampleCounts> for SampleDistribution {
    type Error = DiagnosisError;

    fn try_from(raw: SampleCounts) -> Result<Self> {
        let num_bits = raw.counts.keys().next().map_or(0, Bitstring::len);
        Self::from_counts(num_bits, raw.counts)
    }
}

impl SampleDistribution {
    /// Empty histogram over `num_bits`-bit assignments.
    pub fn new(num_bits: usize) -> Self {
        Self {
            num_bits,
            total_draws: 0,
            counts: BTreeMap::new(),
        }
    }

    /// Build from `(bitstring, count)` pairs. Repeated keys are merged.
    pub fn from_counts(
        num_bits: usize,
        counts: impl IntoIterator<Item = (Bitstring, u64)>,
    ) -> Result<Self> {
        let mut dist = Self::new(num_bits);
        for (b, c) in counts {
            dist.record(b, c)?;
        }
        Ok(dist)
    }

    /// Add `count` draws of `bits`.
    pub fn record(&mut self, bits: Bitstring, count: u64) -> Result<()> {
        if bits.len() != self.num_bits {
            return Err(DiagnosisError::invalid_index(format!(
                "bitstring {bits} has {} bits, distribution expects {}",
                bits.len(),
                self.num_bits
            )));
        }
        if count == 0 {
            return Ok(());
        }
        *self.counts.entry(bits).or_insert(0) += count;
        self.total_draws += count;
        Ok(())
    }

    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    pub fn total_draws(&self) -> u64 {
        self.total_draws
    }

    /// Number of distinct assignments observed.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn count(&self, bits: &Bitstring) -> u64 {
        self.counts.get(bits).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bitstring, u64)> {
        self.counts.iter().map(|(b, &c)| (b, c))
    }

    /// Most frequent assignment; ties resolve to the smallest bitstring.
    pub fn mode(&self) -> Option<&Bitstring> {
        self.counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(bits, _)| bits)
    }
}

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// Kind of execution substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Simulator,
    Hardware,
    Mock,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simulator => write!(f, "simulator"),
            Self::Hardware => write!(f, "hardware"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = DiagnosisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulator" | "sim" | "statevector" => Ok(Self::Simulator),
            "hardware" | "ibm_quantum" | "qpu" => Ok(Self::Hardware),
            "mock" => Ok(Self::Mock),
            other => Err(DiagnosisError::invalid_input(format!(
                "unknown backend type '{other}' (expected simulator or hardware)"
            ))),
        }
    }
}

/// Trait every execution substrate implements.
///
/// Parameter vectors hold `2·depth` values laid out per layer as
/// `[cost_0, mixer_0, cost_1, mixer_1, ...]`.
pub trait Evaluator: Send + Sync {
    /// Backend identifier reported in result metadata.
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind;

    /// Expected energy of `hamiltonian` under the distribution induced by
    /// `parameters`.
    fn estimate_energy(&self, parameters: &[f64], hamiltonian: &SpinHamiltonian) -> Result<f64>;

    /// Draw `draw_count` bit assignments from that distribution.
    fn sample(
        &self,
        parameters: &[f64],
        hamiltonian: &SpinHamiltonian,
        draw_count: u64,
    ) -> Result<SampleDistribution>;
}

// ---------------------------------------------------------------------------
// Mock evaluator
// ---------------------------------------------------------------------------

/// Deterministic evaluator: fixed energy, fixed distribution.
pub struct FixedEvaluator {
    name: String,
    energy: f64,
    distribution: SampleDistribution,
    failure: Option<String>,
    latency: Option<Duration>,
    estimate_calls: AtomicUsize,
    sample_calls: AtomicUsize,
}

impl FixedEvaluator {
    pub fn new(energy: f64, distribution: SampleDistribution) -> Self {
        Self {
            name: "fixed".to_string(),
            energy,
            distribution,
            failure: None,
            latency: None,
            estimate_calls: AtomicUsize::new(0),
            sample_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Every call fails with `BackendUnavailable(reason)`.
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    /// Sleep this long inside every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn estimate_calls(&self) -> usize {
        self.estimate_calls.load(Ordering::SeqCst)
    }

    pub fn sample_calls(&self) -> usize {
        self.sample_calls.load(Ordering::SeqCst)
    }

    fn simulate_call(&self) -> Result<()> {
        if let Some(d) = self.latency {
            std::thread::sleep(d);
        }
        match &self.failure {
            Some(reason) => Err(DiagnosisError::backend_unavailable(&self.name, reason.clone())),
            None => Ok(()),
        }
    }
}

impl Evaluator for FixedEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Mock
    }

    fn estimate_energy(&self, _parameters: &[f64], _hamiltonian: &SpinHamiltonian) -> Result<f64> {
        self.estimate_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_call()?;
        Ok(self.energy)
    }

    fn sample(
        &self,
        _parameters: &[f64],
        _hamiltonian: &SpinHamiltonian,
        _draw_count: u64,
    ) -> Result<SampleDistribution> {
        self.sample_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_call()?;
        Ok(self.distribution.clone())
    }
}

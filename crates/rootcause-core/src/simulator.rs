//! Exact statevector evaluator.
//!
//! Holds all `2^n` amplitudes of the variational state and applies the
//! alternating layers directly:
//!
//! ```text
//! |+>^n --[phase(γ_1)][mix(β_1)]-- ... --[phase(γ_p)][mix(β_p)]-- measure
//! ```
//!
//! - **phase**: every basis amplitude `a_x` is multiplied by `exp(-i·γ·H(x))`
//!   where `H(x)` is the diagonal spin energy of basis state `x`.
//! - **mix**: `Rx(2β)` on every qubit.
//!
//! The expected energy is `Σ_x |a_x|^2 · H(x)`, computed exactly rather than
//! from samples. Sampling draws from `|a_x|^2` with a seeded RNG.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{DiagnosisError, Result};
use crate::evaluator::{BackendKind, Bitstring, Evaluator, SampleDistribution};
use crate::ising::SpinHamiltonian;

/// Default qubit ceiling. A 20-qubit state is 16 MiB of amplitudes.
pub const DEFAULT_MAX_QUBITS: usize = 20;

/// Hard ceiling on any configured qubit limit: 26 qubits is 1 GiB of
/// amplitudes.
pub const MAX_SUPPORTED_QUBITS: usize = 26;

/// Default layer ceiling.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Minimal complex amplitude.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Amplitude {
    re: f64,
    im: f64,
}

impl Amplitude {
    const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    fn norm_sqr(self) -> f64 {
        self.re * self.re + self.im * self.im
    }

    fn mul(self, other: Self) -> Self {
        Self::new(
            self.re * other.re - self.im * other.im,
            self.re * other.im + self.im * other.re,
        )
    }
}

/// Classical statevector simulator implementing [`Evaluator`].
#[derive(Debug, Clone)]
pub struct StatevectorEvaluator {
    name: String,
    max_qubits: usize,
    max_depth: usize,
    seed: Option<u64>,
}

impl Default for StatevectorEvaluator {
    fn default() -> Self {
        Self {
            name: "statevector_simulator".to_string(),
            max_qubits: DEFAULT_MAX_QUBITS,
            max_depth: DEFAULT_MAX_DEPTH,
            seed: None,
        }
    }
}

impl StatevectorEvaluator {
    /// Fails when `max_qubits` exceeds [`MAX_SUPPORTED_QUBITS`].
    pub fn new(max_qubits: usize, max_depth: usize) -> Result<Self> {
        check_qubit_ceiling(max_qubits)?;
        Ok(Self {
            max_qubits,
            max_depth,
            ..Self::default()
        })
    }

    /// Fix the sampling RNG seed for reproducible histograms.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn max_qubits(&self) -> usize {
        self.max_qubits
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn check_limits(&self, parameters: &[f64], hamiltonian: &SpinHamiltonian) -> Result<()> {
        if parameters.len() % 2 != 0 {
            return Err(DiagnosisError::invalid_input(format!(
                "parameter vector has odd length {}; expected two angles per layer",
                parameters.len()
            )));
        }
        if let Some(bad) = parameters.iter().find(|p| !p.is_finite()) {
            return Err(DiagnosisError::invalid_input(format!(
                "parameter vector contains non-finite angle {bad}"
            )));
        }
        let qubits = hamiltonian.num_spins();
        let depth = parameters.len() / 2;
        let max_qubits = self.max_qubits.min(MAX_SUPPORTED_QUBITS);
        if qubits > max_qubits || depth > self.max_depth {
            return Err(DiagnosisError::InvalidCircuit {
                requested_qubits: qubits,
                max_qubits,
                requested_depth: depth,
                max_depth: self.max_depth,
            });
        }
        Ok(())
    }

    /// Prepare the final state and return `(probabilities, diagonal)`.
    fn evolve(
        &self,
        parameters: &[f64],
        hamiltonian: &SpinHamiltonian,
    ) -> Result<(Vec<f64>, Vec<f64>)> {
        self.check_limits(parameters, hamiltonian)?;
        let n = hamiltonian.num_spins();
        let dim = 1usize << n;
        let diagonal = hamiltonian.diagonal()?;

        let uniform = 1.0 / (dim as f64).sqrt();
        let mut state = vec![Amplitude::new(uniform, 0.0); dim];

        for layer in parameters.chunks_exact(2) {
            let (gamma, beta) = (layer[0], layer[1]);

            for (amp, &energy) in state.iter_mut().zip(&diagonal) {
                let theta = gamma * energy;
                *amp = amp.mul(Amplitude::new(theta.cos(), -theta.sin()));
            }

            let (c, s) = (beta.cos(), beta.sin());
            for q in 0..n {
                let stride = 1usize << q;
                for x in 0..dim {
                    if x & stride != 0 {
                        continue;
                    }
                    let a0 = state[x];
                    let a1 = state[x | stride];
                    // [[c, -is], [-is, c]]
                    state[x] = Amplitude::new(c * a0.re + s * a1.im, c * a0.im - s * a1.re);
                    state[x | stride] =
                        Amplitude::new(s * a0.im + c * a1.re, c * a1.im - s * a0.re);
                }
            }
        }

        let probabilities = state.iter().map(|a| a.norm_sqr()).collect();
        Ok((probabilities, diagonal))
    }
}

/// Reject qubit limits the dense statevector cannot honor.
pub fn check_qubit_ceiling(max_qubits: usize) -> Result<()> {
    if max_qubits > MAX_SUPPORTED_QUBITS {
        return Err(DiagnosisError::invalid_input(format!(
            "max_qubits {max_qubits} exceeds the supported ceiling of {MAX_SUPPORTED_QUBITS}"
        )));
    }
    Ok(())
}

impl Evaluator for StatevectorEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Simulator
    }

    fn estimate_energy(&self, parameters: &[f64], hamiltonian: &SpinHamiltonian) -> Result<f64> {
        let (probabilities, diagonal) = self.evolve(parameters, hamiltonian)?;
        Ok(probabilities.iter().zip(&diagonal).map(|(p, e)| p * e).sum())
    }

    fn sample(
        &self,
        parameters: &[f64],
        hamiltonian: &SpinHamiltonian,
        draw_count: u64,
    ) -> Result<SampleDistribution> {
        let (probabilities, _) = self.evolve(parameters, hamiltonian)?;
        let n = hamiltonian.num_spins();

        let mut cumulative = Vec::with_capacity(probabilities.len());
        let mut acc = 0.0;
        for p in &probabilities {
            acc += p;
            cumulative.push(acc);
        }

        let mut rng = match self.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };

        let mut hits = vec![0u64; probabilities.len()];
        for _ in 0..draw_count {
            let r = rng.random::<f64>() * acc;
            let x = cumulative
                .partition_point(|&c| c <= r)
                .min(probabilities.len() - 1);
            hits[x] += 1;
        }

        let mut dist = SampleDistribution::new(n);
        for (x, &count) in hits.iter().enumerate() {
            dist.record(Bitstring::from_basis(x, n), count)?;
        }
        log::debug!(
            "{}: {} draws over {} distinct assignments",
            self.name,
            dist.total_draws(),
            dist.len()
        );
        Ok(dist)
    }
}

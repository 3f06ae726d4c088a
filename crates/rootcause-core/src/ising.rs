//! Binary ↔ spin transform.
//!
//! Every boolean `b_i` is replaced by `(1 + s_i) / 2` with `s_i ∈ {-1, +1}`:
//!
//! ```text
//! a·b_i        = a/2 + (a/2)·s_i
//! q·b_i·b_j    = q/4 + (q/4)·s_i + (q/4)·s_j + (q/4)·s_i·s_j
//! ```
//!
//! The inverse uses `s_i = 2·b_i − 1`. Both directions are algebraic
//! identities, so the spin ground state maps back onto the boolean one and
//! [`to_binary`]`(`[`to_spin`]`(q))` reproduces `q` up to rounding.

use std::collections::BTreeMap;

use crate::error::{DiagnosisError, Result};
use crate::qubo::{CoefficientMap, VariableIndex};
use crate::simulator::MAX_SUPPORTED_QUBITS;

/// Ising form: `H(s) = offset + Σ_i h_i s_i + Σ_{i<j} J_ij s_i s_j`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpinHamiltonian {
    linear: Vec<f64>,
    couplings: BTreeMap<(usize, usize), f64>,
    offset: f64,
}

impl SpinHamiltonian {
    /// Zero Hamiltonian over `num_spins` spins.
    pub fn new(num_spins: usize) -> Self {
        Self {
            linear: vec![0.0; num_spins],
            couplings: BTreeMap::new(),
            offset: 0.0,
        }
    }

    pub fn num_spins(&self) -> usize {
        self.linear.len()
    }

    /// Linear coefficient `h_i`.
    pub fn h(&self, i: usize) -> f64 {
        self.linear.get(i).copied().unwrap_or(0.0)
    }

    /// Coupling `J_ij` for `i != j` (order-insensitive, 0.0 when absent).
    pub fn j(&self, i: usize, j: usize) -> f64 {
        let key = if i < j { (i, j) } else { (j, i) };
        self.couplings.get(&key).copied().unwrap_or(0.0)
    }

    pub fn linear_terms(&self) -> &[f64] {
        &self.linear
    }

    /// Couplings keyed `(i, j)` with `i < j`.
    pub fn couplings(&self) -> impl Iterator<Item = ((usize, usize), f64)> + '_ {
        self.couplings.iter().map(|(&k, &v)| (k, v))
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn add_linear(&mut self, i: usize, value: f64) {
        self.linear[i] += value;
    }

    /// Accumulate onto `J_ij`. Self-couplings fold into the offset since
    /// `s_i^2 = 1`.
    pub fn add_coupling(&mut self, i: usize, j: usize, value: f64) {
        if i == j {
            self.offset += value;
            return;
        }
        let key = if i < j { (i, j) } else { (j, i) };
        *self.couplings.entry(key).or_insert(0.0) += value;
    }

    pub fn add_offset(&mut self, value: f64) {
        self.offset += value;
    }

    /// Energy of a spin configuration (`true` = +1, `false` = -1).
    pub fn energy_of_spins(&self, up: &[bool]) -> f64 {
        let s = |i: usize| if up[i] { 1.0 } else { -1.0 };
        let mut e = self.offset;
        for (i, &h) in self.linear.iter().enumerate() {
            e += h * s(i);
        }
        for (&(i, j), &c) in &self.couplings {
            e += c * s(i) * s(j);
        }
        e
    }

    /// Energy of the basis state whose bit `k` is spin `k` (1 = up).
    ///
    /// Boolean `b = 1` corresponds to spin `+1`, so this equals the QUBO energy
    /// of the same bit pattern.
    /// Spins beyond the width of `usize` read as down.
    pub fn energy_of_basis(&self, basis: usize) -> f64 {
        let bit = |i: usize| u32::try_from(i).ok().and_then(|k| basis.checked_shr(k));
        let s = |i: usize| if bit(i).is_some_and(|b| b & 1 == 1) { 1.0 } else { -1.0 };
        let mut e = self.offset;
        for (i, &h) in self.linear.iter().enumerate() {
            e += h * s(i);
        }
        for (&(i, j), &c) in &self.couplings {
            e += c * s(i) * s(j);
        }
        e
    }

    /// Full diagonal `H(x)` for every basis state `x ∈ [0, 2^n)`.
    ///
    /// Refused above [`MAX_SUPPORTED_QUBITS`] spins.
    pub fn diagonal(&self) -> Result<Vec<f64>> {
        let n = self.num_spins();
        if n > MAX_SUPPORTED_QUBITS {
            return Err(DiagnosisError::invalid_input(format!(
                "dense diagonal over {n} spins exceeds the {MAX_SUPPORTED_QUBITS}-spin ceiling"
            )));
        }
        Ok((0..1usize << n).map(|x| self.energy_of_basis(x)).collect())
    }
}

/// Encode a QUBO as a spin Hamiltonian over the same index space.
pub fn to_spin(q: &CoefficientMap, index: &VariableIndex) -> Result<SpinHamiltonian> {
    q.check_index(index)?;
    let mut h = SpinHamiltonian::new(index.len());
    h.add_offset(q.offset());

    for ((i, j), c) in q.terms() {
        if i == j {
            h.add_offset(c / 2.0);
            h.add_linear(i, c / 2.0);
        } else {
            let quarter = c / 4.0;
            h.add_offset(quarter);
            h.add_linear(i, quarter);
            h.add_linear(j, quarter);
            h.add_coupling(i, j, quarter);
        }
    }

    log::debug!(
        "ising encoding: {} spins, {} couplings, offset {:.4}",
        h.num_spins(),
        h.couplings.len(),
        h.offset
    );
    Ok(h)
}

/// Decode a spin Hamiltonian back into QUBO coefficients. Used for validation.
pub fn to_binary(h: &SpinHamiltonian, index: &VariableIndex) -> Result<CoefficientMap> {
    if h.num_spins() != index.len() {
        return Err(DiagnosisError::invalid_index(format!(
            "hamiltonian has {} spins, index has {} variables",
            h.num_spins(),
            index.len()
        )));
    }
    if let Some(((i, j), _)) = h.couplings().find(|&((_, j), _)| j >= index.len()) {
        return Err(DiagnosisError::invalid_index(format!(
            "coupling ({i}, {j}) references a spin outside the index"
        )));
    }

    let mut q = CoefficientMap::new(index.len());
    q.add_offset(h.offset());

    // h·s = 2h·b − h
    for (i, &hi) in h.linear.iter().enumerate() {
        if hi != 0.0 {
            q.add_linear(i, 2.0 * hi);
            q.add_offset(-hi);
        }
    }
    // J·s_i·s_j = 4J·b_i·b_j − 2J·b_i − 2J·b_j + J
    for ((i, j), c) in h.couplings() {
        q.add(i, j, 4.0 * c);
        q.add_linear(i, -2.0 * c);
        q.add_linear(j, -2.0 * c);
        q.add_offset(c);
    }
    Ok(q)
}

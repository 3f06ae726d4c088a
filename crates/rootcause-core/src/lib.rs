//! # rootcause-core
//!
//! **Which failure explains these sensors?**
//!
//! `rootcause-core` turns an anomaly window (a set of abnormal sensors with
//! severities) and a library of known failure patterns into a ranked list of
//! root-cause hypotheses. The decision problem is written as a binary
//! quadratic energy function, re-expressed as a spin Hamiltonian, searched
//! with a variational optimizer over an injected evaluator, and decoded back
//! into scored hypotheses.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rootcause_core::{
//!     CancelFlag, DiagnosisRequest, FailurePattern, SensorObservation, ServiceConfig, diagnose,
//! };
//!
//! let request = DiagnosisRequest::new(
//!     "ANOM_2024_001",
//!     vec![
//!         SensorObservation::new("PRESSURE_001", 3.0).unwrap(),
//!         SensorObservation::new("FLOW_001", 1.8).unwrap(),
//!     ],
//!     vec![
//!         FailurePattern::new("PUMP_CAVITATION", "Pump cavitation", ["PRESSURE_001", "FLOW_001"])
//!             .unwrap(),
//!     ],
//! );
//!
//! let config = ServiceConfig::default();
//! let evaluator = config.simulator().unwrap();
//! let result = diagnose(&request, &config, evaluator, &CancelFlag::new()).unwrap();
//!
//! if let Some(top) = result.top() {
//!     println!("{:?} ({:.1}%)", top.selected_patterns(), top.confidence_score());
//! }
//! ```
//!
//! ## Architecture
//!
//! Sensors + Patterns → QUBO → Ising → Variational loop → Samples → Solutions → Quality
//!
//! - **QUBO** ([`build_energy_model`]):
//!   `α·Σ w_i(1 − z_i) + β·Σ y_j + γ·Σ (z_i − Σ_j A_ij y_j)²` over
//!   sensor-truth variables `z` and pattern-active variables `y`.
//! - **Ising** ([`to_spin`]): exact substitution `b = (1 + s)/2`.
//! - **Variational loop** ([`VariationalOptimizer`]): a derivative-free search
//!   over `2·depth` angles, each point scored by an [`Evaluator`].
//! - **Decoding** ([`decode`]): exact energies recomputed from the QUBO,
//!   ranked by energy, frequency, then pattern ids.
//!
//! Every evaluator implements the [`Evaluator`] trait. The bundled
//! [`StatevectorEvaluator`] simulates the variational state exactly; the
//! [`FixedEvaluator`] serves tests.

pub mod breaker;
pub mod config;
pub mod decode;
pub mod diagnosis;
pub mod error;
pub mod evaluator;
pub mod features;
pub mod ingest;
pub mod ising;
pub mod observation;
pub mod quality;
pub mod qubo;
pub mod search;
pub mod simulator;
pub mod variational;

pub use breaker::{BreakerState, CircuitBreaker};
pub use config::{BackendSettings, QaoaSettings, ServiceConfig};
pub use decode::{Solution, confidence, decode};
pub use diagnosis::{
    BackendMetadata, DiagnosisRequest, DiagnosisResult, diagnose, diagnose_configured,
    diagnose_with_fallback,
};
pub use error::{DiagnosisError, Result};
pub use evaluator::{BackendKind, Bitstring, Evaluator, FixedEvaluator, SampleDistribution};
pub use features::{SensorReading, aggregate_window, compute_z_scores, normalize_severities};
pub use ingest::{
    load_patterns_csv, load_readings_csv, load_sensors_csv, parse_patterns_csv,
    parse_readings_csv, parse_sensors_csv, validate_pattern_library,
};
pub use ising::{SpinHamiltonian, to_binary, to_spin};
pub use observation::{DEFAULT_PATTERN_WEIGHT, FailurePattern, SensorObservation};
pub use quality::{QualityMetrics, analyze};
pub use qubo::{
    CoefficientMap, EnergyModel, NamedCoefficient, QuboWeights, Variable, VariableIndex,
    VariableKind, build_energy_model,
};
pub use search::{NelderMead, OptimizerKind, ParameterSearch, Spsa};
pub use simulator::{MAX_SUPPORTED_QUBITS, StatevectorEvaluator};
pub use variational::{
    CancelFlag, OptimizationMetadata, OptimizationOutcome, OptimizerConfig, Termination,
    VariationalOptimizer,
};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

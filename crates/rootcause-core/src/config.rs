//! Service configuration.
//!
//! The pipeline itself only ever receives explicit structs. Reading the
//! process environment happens here, and only when a binary asks for it via
//! [`ServiceConfig::from_env`].
//!
//! | Variable | Default |
//! |----------|---------|
//! | `ROOTCAUSE_BACKEND_TYPE` | `simulator` |
//! | `ROOTCAUSE_BACKEND_NAME` | unset |
//! | `ROOTCAUSE_MAX_QUBITS` | `20` |
//! | `ROOTCAUSE_MAX_DEPTH` | `16` |
//! | `ROOTCAUSE_SEED` | unset |
//! | `ROOTCAUSE_QAOA_DEPTH` | `2` |
//! | `ROOTCAUSE_QAOA_OPTIMIZER` | `nelder_mead` |
//! | `ROOTCAUSE_QAOA_MAX_ITER` | `100` |
//! | `ROOTCAUSE_QAOA_SHOTS` | `1024` |
//! | `ROOTCAUSE_QAOA_TOLERANCE` | `1e-6` |
//! | `ROOTCAUSE_QUBO_ALPHA` / `_BETA` / `_GAMMA` | `1.0` |
//! | `ROOTCAUSE_LOG_LEVEL` | `info` |
//! | `ROOTCAUSE_TIMEOUT_SECONDS` | `300` (0 disables) |

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DiagnosisError, Result};
use crate::evaluator::{BackendKind, Evaluator};
pub use crate::qubo::QuboWeights;
use crate::search::OptimizerKind;
use crate::simulator::{
    DEFAULT_MAX_DEPTH, DEFAULT_MAX_QUBITS, StatevectorEvaluator, check_qubit_ceiling,
};
use crate::variational::OptimizerConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSettings {
    pub backend_type: BackendKind,
    pub backend_name: Option<String>,
    pub max_qubits: usize,
    pub max_depth: usize,
    /// Sampling and initialization seed.
    pub seed: Option<u64>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            backend_type: BackendKind::Simulator,
            backend_name: None,
            max_qubits: DEFAULT_MAX_QUBITS,
            max_depth: DEFAULT_MAX_DEPTH,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaoaSettings {
    pub depth: usize,
    pub optimizer: OptimizerKind,
    pub max_iterations: usize,
    pub shots: u64,
    pub tolerance: f64,
}

impl Default for QaoaSettings {
    fn default() -> Self {
        Self {
            depth: 2,
            optimizer: OptimizerKind::NelderMead,
            max_iterations: 100,
            shots: 1024,
            tolerance: 1e-6,
        }
    }
}

/// Everything a binary needs to run diagnoses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub backend: BackendSettings,
    pub qaoa: QaoaSettings,
    pub qubo: QuboWeights,
    pub log_level: String,
    /// Per evaluator call; 0 disables the bound.
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            backend: BackendSettings::default(),
            qaoa: QaoaSettings::default(),
            qubo: QuboWeights::default(),
            log_level: "info".to_string(),
            timeout_secs: 300,
        }
    }
}

impl ServiceConfig {
    /// Load from `ROOTCAUSE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup. Missing or blank keys keep
    /// their defaults; unparseable values are an error naming the key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        if let Some(v) = get("ROOTCAUSE_BACKEND_TYPE") {
            cfg.backend.backend_type = v.parse()?;
        }
        cfg.backend.backend_name = get("ROOTCAUSE_BACKEND_NAME");
        parse_into(&get, "ROOTCAUSE_MAX_QUBITS", &mut cfg.backend.max_qubits)?;
        parse_into(&get, "ROOTCAUSE_MAX_DEPTH", &mut cfg.backend.max_depth)?;
        if let Some(v) = get("ROOTCAUSE_SEED") {
            cfg.backend.seed = Some(parse_value("ROOTCAUSE_SEED", &v)?);
        }

        parse_into(&get, "ROOTCAUSE_QAOA_DEPTH", &mut cfg.qaoa.depth)?;
        if let Some(v) = get("ROOTCAUSE_QAOA_OPTIMIZER") {
            cfg.qaoa.optimizer = v.parse()?;
        }
        parse_into(&get, "ROOTCAUSE_QAOA_MAX_ITER", &mut cfg.qaoa.max_iterations)?;
        parse_into(&get, "ROOTCAUSE_QAOA_SHOTS", &mut cfg.qaoa.shots)?;
        parse_into(&get, "ROOTCAUSE_QAOA_TOLERANCE", &mut cfg.qaoa.tolerance)?;

        parse_into(&get, "ROOTCAUSE_QUBO_ALPHA", &mut cfg.qubo.alpha)?;
        parse_into(&get, "ROOTCAUSE_QUBO_BETA", &mut cfg.qubo.beta)?;
        parse_into(&get, "ROOTCAUSE_QUBO_GAMMA", &mut cfg.qubo.gamma)?;

        if let Some(v) = get("ROOTCAUSE_LOG_LEVEL") {
            cfg.log_level = v.trim().to_ascii_lowercase();
        }
        parse_into(&get, "ROOTCAUSE_TIMEOUT_SECONDS", &mut cfg.timeout_secs)?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        check_qubit_ceiling(self.backend.max_qubits)?;
        self.qubo.validate()?;
        self.optimizer_config().validate()
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn optimizer_config(&self) -> OptimizerConfig {
        OptimizerConfig {
            depth: self.qaoa.depth,
            max_iterations: self.qaoa.max_iterations,
            optimizer: self.qaoa.optimizer,
            draw_count: self.qaoa.shots,
            tolerance: self.qaoa.tolerance,
            seed: self.backend.seed,
            timeout: self.timeout(),
        }
    }

    /// Local simulator with the configured limits.
    pub fn simulator(&self) -> Result<Arc<dyn Evaluator>> {
        let sim = StatevectorEvaluator::new(self.backend.max_qubits, self.backend.max_depth)?
            .with_seed(self.backend.seed);
        Ok(match self.backend.backend_type {
            BackendKind::Simulator => match &self.backend.backend_name {
                Some(name) => Arc::new(sim.with_name(name.clone())),
                None => Arc::new(sim),
            },
            _ => Arc::new(sim),
        })
    }

    /// Evaluator for the configured backend type.
    ///
    /// No hardware substrate is linked into this build, so `hardware`
    /// reports [`DiagnosisError::BackendUnavailable`].
    pub fn build_evaluator(&self) -> Result<Arc<dyn Evaluator>> {
        match self.backend.backend_type {
            BackendKind::Simulator => self.simulator(),
            BackendKind::Hardware => Err(DiagnosisError::backend_unavailable(
                self.backend
                    .backend_name
                    .clone()
                    .unwrap_or_else(|| "hardware".to_string()),
                "no hardware backend is linked into this build",
            )),
            BackendKind::Mock => Err(DiagnosisError::invalid_input(
                "the mock backend is only available to tests",
            )),
        }
    }

    /// [`build_evaluator`](Self::build_evaluator), degrading to the local
    /// simulator when the configured backend is unavailable.
    pub fn resolve_evaluator(&self) -> Result<Arc<dyn Evaluator>> {
        match self.build_evaluator() {
            Ok(e) => Ok(e),
            Err(e) if e.is_backend_failure() => {
                log::warn!("{e}; falling back to the local simulator");
                self.simulator()
            }
            Err(e) => Err(e),
        }
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| DiagnosisError::invalid_input(format!("{key}: cannot parse '{raw}'")))
}

fn parse_into<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) -> Result<()> {
    if let Some(v) = get(key) {
        *slot = parse_value(key, &v)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = ServiceConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg, ServiceConfig::default());
        assert_eq!(cfg.qaoa.depth, 2);
        assert_eq!(cfg.qaoa.shots, 1024);
        assert_eq!(cfg.backend.max_qubits, 20);
        assert_eq!(cfg.timeout(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_overrides() {
        let cfg = ServiceConfig::from_lookup(lookup(&[
            ("ROOTCAUSE_QAOA_DEPTH", "3"),
            ("ROOTCAUSE_QAOA_OPTIMIZER", "SPSA"),
            ("ROOTCAUSE_QUBO_BETA", "0.25"),
            ("ROOTCAUSE_SEED", "17"),
            ("ROOTCAUSE_TIMEOUT_SECONDS", "0"),
            ("ROOTCAUSE_LOG_LEVEL", "DEBUG"),
            ("ROOTCAUSE_BACKEND_NAME", "  "),
        ]))
        .unwrap();
        assert_eq!(cfg.qaoa.depth, 3);
        assert_eq!(cfg.qaoa.optimizer, OptimizerKind::Spsa);
        assert!((cfg.qubo.beta - 0.25).abs() < f64::EPSILON);
        assert_eq!(cfg.backend.seed, Some(17));
        assert_eq!(cfg.timeout(), None);
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.backend.backend_name, None);

        let opt = cfg.optimizer_config();
        assert_eq!(opt.depth, 3);
        assert_eq!(opt.seed, Some(17));
        assert_eq!(opt.timeout, None);
    }

    #[test]
    fn test_bad_value_names_key() {
        let err =
            ServiceConfig::from_lookup(lookup(&[("ROOTCAUSE_QAOA_SHOTS", "many")])).unwrap_err();
        assert!(err.to_string().contains("ROOTCAUSE_QAOA_SHOTS"));

        let err =
            ServiceConfig::from_lookup(lookup(&[("ROOTCAUSE_QUBO_ALPHA", "inf")])).unwrap_err();
        assert!(err.is_client_error());

        assert!(ServiceConfig::from_lookup(lookup(&[("ROOTCAUSE_QAOA_DEPTH", "0")])).is_err());
        assert!(
            ServiceConfig::from_lookup(lookup(&[("ROOTCAUSE_BACKEND_TYPE", "toaster")])).is_err()
        );
    }

    #[test]
    fn test_max_qubits_ceiling() {
        let err =
            ServiceConfig::from_lookup(lookup(&[("ROOTCAUSE_MAX_QUBITS", "64")])).unwrap_err();
        assert!(matches!(err, DiagnosisError::InvalidInput { .. }));
        assert!(err.to_string().contains("max_qubits"));

        let cfg = ServiceConfig::from_lookup(lookup(&[("ROOTCAUSE_MAX_QUBITS", "26")])).unwrap();
        assert_eq!(cfg.backend.max_qubits, 26);

        // A hand-built config bypassing validation still cannot build a simulator.
        let mut cfg = ServiceConfig::default();
        cfg.backend.max_qubits = 64;
        assert!(cfg.validate().is_err());
        assert!(cfg.simulator().is_err());
    }

    #[test]
    fn test_hardware_degrades_to_simulator() {
        let cfg = ServiceConfig::from_lookup(lookup(&[
            ("ROOTCAUSE_BACKEND_TYPE", "hardware"),
            ("ROOTCAUSE_BACKEND_NAME", "ibm_brisbane"),
        ]))
        .unwrap();
        let err = cfg.build_evaluator().err().unwrap();
        assert!(err.is_backend_failure());
        assert!(err.to_string().contains("ibm_brisbane"));

        let ev = cfg.resolve_evaluator().unwrap();
        assert_eq!(ev.kind(), BackendKind::Simulator);
    }

    #[test]
    fn test_named_simulator() {
        let cfg =
            ServiceConfig::from_lookup(lookup(&[("ROOTCAUSE_BACKEND_NAME", "aer_local")])).unwrap();
        assert_eq!(cfg.build_evaluator().unwrap().name(), "aer_local");
    }

    #[test]
    fn test_json_round_trip() {
        let cfg = ServiceConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServiceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}

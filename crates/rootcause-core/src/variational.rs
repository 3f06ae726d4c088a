//! Variational optimization loop.
//!
//! The optimizer owns the iteration: it asks the configured
//! [`ParameterSearch`] for a parameter vector, has the injected
//! [`Evaluator`] estimate the energy there, and tells the search the result.
//! The loop ends on convergence, on the iteration budget, or on
//! cancellation. One final sampling call at the best parameters seen
//! produces the returned [`SampleDistribution`].
//!
//! The optimizer never retries. Fallback between evaluators is an
//! orchestration concern (see [`crate::diagnosis`] and [`crate::breaker`]).

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{DiagnosisError, Result};
use crate::evaluator::{Evaluator, SampleDistribution};
use crate::ising::SpinHamiltonian;
use crate::search::OptimizerKind;

/// Largest starting angle used by the deterministic ramp.
const INITIAL_ANGLE: f64 = 0.5;

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative cancellation signal, checked between iterations.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Configuration and results
// ---------------------------------------------------------------------------

/// Settings for one optimizer run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Number of layers; the parameter vector has `2·depth` entries.
    pub depth: usize,
    /// Maximum number of energy evaluations.
    pub max_iterations: usize,
    pub optimizer: OptimizerKind,
    /// Draws requested from the final sampling call.
    pub draw_count: u64,
    /// Convergence threshold handed to the search.
    pub tolerance: f64,
    /// Seeds both the initial parameters and any stochastic search.
    pub seed: Option<u64>,
    /// Bound on every individual evaluator call.
    #[serde(default, with = "optional_secs")]
    pub timeout: Option<Duration>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            depth: 2,
            max_iterations: 100,
            optimizer: OptimizerKind::NelderMead,
            draw_count: 1024,
            tolerance: 1e-6,
            seed: None,
            timeout: None,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.depth == 0 {
            return Err(DiagnosisError::invalid_input("depth must be at least 1"));
        }
        if self.max_iterations == 0 {
            return Err(DiagnosisError::invalid_input("max_iterations must be at least 1"));
        }
        if self.draw_count == 0 {
            return Err(DiagnosisError::invalid_input("draw count must be at least 1"));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(DiagnosisError::invalid_input(format!(
                "tolerance must be finite and >= 0, got {}",
                self.tolerance
            )));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(DiagnosisError::invalid_input("timeout must be positive"));
        }
        Ok(())
    }

    /// Starting parameters.
    ///
    /// Without a seed: a linear ramp, cost angles rising and mixer angles
    /// falling across layers. With a seed: uniform draws in `[0, π/2)`.
    pub fn initial_parameters(&self) -> Vec<f64> {
        let p = self.depth as f64;
        match self.seed {
            None => (0..self.depth)
                .flat_map(|l| {
                    let l = l as f64;
                    [INITIAL_ANGLE * (l + 1.0) / p, INITIAL_ANGLE * (1.0 - l / p)]
                })
                .collect(),
            Some(seed) => {
                let mut rng = StdRng::seed_from_u64(seed);
                (0..2 * self.depth)
                    .map(|_| rng.random::<f64>() * std::f64::consts::FRAC_PI_2)
                    .collect()
            }
        }
    }
}

mod optional_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        match secs {
            Some(s) if s.is_finite() && s >= 0.0 => Ok(Some(Duration::from_secs_f64(s))),
            Some(s) => Err(serde::de::Error::custom(format!("invalid timeout {s}"))),
            None => Ok(None),
        }
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Converged,
    IterationBudget,
    Cancelled,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::IterationBudget => write!(f, "iteration budget exhausted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Run bookkeeping reported alongside the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationMetadata {
    pub optimizer: OptimizerKind,
    pub evaluator: String,
    /// Energy evaluations performed.
    pub iterations: usize,
    pub termination: Termination,
    /// Every energy estimate, in evaluation order.
    pub energy_history: Vec<f64>,
    pub elapsed_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    /// Best parameter vector seen.
    pub parameters: Vec<f64>,
    /// Energy estimate at `parameters`.
    pub minimum_energy: f64,
    pub samples: SampleDistribution,
    pub metadata: OptimizationMetadata,
}

// ---------------------------------------------------------------------------
// Optimizer
// ---------------------------------------------------------------------------

/// Drives a [`ParameterSearch`](crate::search::ParameterSearch) against an
/// [`Evaluator`].
#[derive(Debug, Clone)]
pub struct VariationalOptimizer {
    config: OptimizerConfig,
}

impl VariationalOptimizer {
    pub fn new(config: OptimizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn optimize(
        &self,
        hamiltonian: &SpinHamiltonian,
        evaluator: Arc<dyn Evaluator>,
        cancel: &CancelFlag,
    ) -> Result<OptimizationOutcome> {
        let cfg = &self.config;
        let started = Instant::now();
        let hamiltonian = Arc::new(hamiltonian.clone());

        let calls = CallRunner::start(cfg.timeout, evaluator.name())?;
        let initial = cfg.initial_parameters();
        let mut search = cfg.optimizer.build(&initial, cfg.tolerance, cfg.seed);
        let mut best_parameters = initial;
        let mut best_energy = f64::INFINITY;
        let mut history = Vec::with_capacity(cfg.max_iterations);
        let mut termination = Termination::IterationBudget;

        log::info!(
            "optimizing {} spins with {} (depth {}, budget {}) on '{}'",
            hamiltonian.num_spins(),
            cfg.optimizer,
            cfg.depth,
            cfg.max_iterations,
            evaluator.name()
        );

        for iteration in 0..cfg.max_iterations {
            if iteration > 0 && cancel.is_cancelled() {
                termination = Termination::Cancelled;
                break;
            }

            let parameters = search.ask();
            let energy = {
                let (ev, h) = (Arc::clone(&evaluator), Arc::clone(&hamiltonian));
                let params = parameters.clone();
                calls.run("estimate_energy", evaluator.name(), move || {
                    ev.estimate_energy(&params, &h)
                })?
            };
            if !energy.is_finite() {
                return Err(DiagnosisError::backend_unavailable(
                    evaluator.name(),
                    format!("returned non-finite energy {energy}"),
                ));
            }

            log::trace!("iteration {iteration}: energy {energy:.6}");
            history.push(energy);
            search.tell(energy);
            if energy < best_energy {
                best_energy = energy;
                best_parameters = parameters;
            }

            if search.converged() {
                termination = Termination::Converged;
                break;
            }
        }

        log::info!(
            "optimizer stopped after {} evaluations ({termination}), best energy {best_energy:.6}",
            history.len()
        );

        let samples = {
            let (ev, h, params, draws) = (
                Arc::clone(&evaluator),
                Arc::clone(&hamiltonian),
                best_parameters.clone(),
                cfg.draw_count,
            );
            calls.run("sample", evaluator.name(), move || ev.sample(&params, &h, draws))?
        };

        Ok(OptimizationOutcome {
            parameters: best_parameters,
            minimum_energy: best_energy,
            samples,
            metadata: OptimizationMetadata {
                optimizer: cfg.optimizer,
                evaluator: evaluator.name().to_string(),
                iterations: history.len(),
                termination,
                energy_history: history,
                elapsed_seconds: started.elapsed().as_secs_f64(),
            },
        })
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Evaluator calls of one optimizer run.
///
/// Without a timeout every call runs inline. With one, a single helper
/// thread serves the run's calls in order and each reply is awaited for at
/// most the timeout. After a timeout the helper is abandoned: it finishes the
/// stale call in the background and exits once the run drops its queue. A
/// helper that dies without replying (panic) is reported as the backend being
/// unavailable.
struct CallRunner {
    worker: Option<(mpsc::Sender<Job>, Duration)>,
}

impl CallRunner {
    fn start(timeout: Option<Duration>, backend: &str) -> Result<Self> {
        let Some(limit) = timeout else {
            return Ok(Self { worker: None });
        };
        let (jobs, queue) = mpsc::channel::<Job>();
        thread::Builder::new()
            .name("rootcause-evaluator".to_string())
            .spawn(move || {
                for job in queue {
                    job();
                }
            })
            .map_err(|e| {
                DiagnosisError::backend_unavailable(backend, format!("cannot spawn worker: {e}"))
            })?;
        Ok(Self {
            worker: Some((jobs, limit)),
        })
    }

    fn run<T, F>(&self, operation: &str, backend: &str, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let Some((jobs, limit)) = &self.worker else {
            return call();
        };

        let (tx, rx) = mpsc::channel();
        let job: Job = Box::new(move || {
            let _ = tx.send(call());
        });
        if jobs.send(job).is_err() {
            return Err(DiagnosisError::backend_unavailable(
                backend,
                format!("{operation} worker has exited"),
            ));
        }

        match rx.recv_timeout(*limit) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                log::warn!("{backend}: {operation} exceeded {:.3}s", limit.as_secs_f64());
                Err(DiagnosisError::Timeout {
                    operation: operation.to_string(),
                    timeout: *limit,
                })
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(DiagnosisError::backend_unavailable(
                backend,
                format!("{operation} worker exited without a result"),
            )),
        }
    }
}

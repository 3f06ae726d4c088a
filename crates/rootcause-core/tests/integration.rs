//! Integration tests for rootcause-core.
//!
//! These tests exercise the stages together:
//! energy model → spin encoding → variational loop → decoding → quality.

use std::cmp::Ordering;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rootcause_core::{
    BackendKind, Bitstring, CancelFlag, CircuitBreaker, CoefficientMap, DiagnosisRequest,
    FailurePattern, FixedEvaluator, OptimizerConfig, QuboWeights, SampleDistribution,
    SensorObservation, ServiceConfig, Termination, VariableIndex, VariationalOptimizer, analyze,
    build_energy_model, decode, diagnose, diagnose_with_fallback, load_patterns_csv,
    load_sensors_csv, to_binary, to_spin, validate_pattern_library,
};

fn bits_of(x: usize, n: usize) -> Vec<bool> {
    (0..n).map(|k| (x >> k) & 1 == 1).collect()
}

/// Every basis state once, so decoding sees the whole space.
fn full_distribution(n: usize) -> SampleDistribution {
    SampleDistribution::from_counts(n, (0..1usize << n).map(|x| (Bitstring::from_basis(x, n), 1)))
        .unwrap()
}

fn random_instance(
    rng: &mut StdRng,
    n_sensors: usize,
    n_patterns: usize,
) -> (Vec<SensorObservation>, Vec<FailurePattern>) {
    let sensors: Vec<SensorObservation> = (0..n_sensors)
        .map(|i| SensorObservation::new(format!("S{i}"), rng.random::<f64>() * 4.0).unwrap())
        .collect();
    let patterns = (0..n_patterns)
        .map(|j| {
            let mut covered: Vec<String> = (0..n_sensors)
                .filter(|_| rng.random_bool(0.5))
                .map(|i| format!("S{i}"))
                .collect();
            if covered.is_empty() {
                covered.push(format!("S{}", j % n_sensors));
            }
            if rng.random_bool(0.3) {
                covered.push("OUTSIDE_WINDOW".to_string());
            }
            FailurePattern::new(format!("P{j}"), "", covered)
                .unwrap()
                .with_weight(0.5 + rng.random::<f64>())
                .unwrap()
        })
        .collect();
    (sensors, patterns)
}

/// Energy straight from the definition, independent of the QUBO expansion.
fn formula_energy(
    sensors: &[SensorObservation],
    patterns: &[FailurePattern],
    w: QuboWeights,
    bits: &[bool],
) -> f64 {
    let n = sensors.len();
    let mut e = 0.0;
    for (i, s) in sensors.iter().enumerate() {
        let z = if bits[i] { 1.0 } else { 0.0 };
        e += w.alpha * s.severity() * (1.0 - z);
        let cover: f64 = patterns
            .iter()
            .enumerate()
            .filter(|(j, p)| bits[n + j] && p.covers(s.sensor_id()))
            .count() as f64;
        e += w.gamma * (z - cover).powi(2);
    }
    // Pattern weights never enter the energy.
    let selected = bits[n..].iter().filter(|&&y| y).count() as f64;
    e + w.beta * selected
}

fn pump_scenario() -> (Vec<SensorObservation>, Vec<FailurePattern>) {
    (
        vec![
            SensorObservation::new("TEMP_001", 2.5).unwrap(),
            SensorObservation::new("PRESSURE_001", 3.0).unwrap(),
            SensorObservation::new("FLOW_001", 1.8).unwrap(),
        ],
        vec![
            FailurePattern::new(
                "PUMP_CAVITATION",
                "Pump cavitation causing pressure fluctuations",
                ["PRESSURE_001", "FLOW_001"],
            )
            .unwrap(),
        ],
    )
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

#[test]
fn spin_minimizer_matches_boolean_minimizer() {
    let mut rng = StdRng::seed_from_u64(2024);
    for _ in 0..20 {
        let (sensors, patterns) = random_instance(&mut rng, 3, 3);
        let weights = QuboWeights::new(
            rng.random::<f64>() * 2.0,
            rng.random::<f64>(),
            0.5 + rng.random::<f64>(),
        );
        let m = build_energy_model(&sensors, &patterns, weights).unwrap();
        let h = to_spin(&m.coefficients, &m.index).unwrap();
        let n = m.index.len();

        let qubo: Vec<f64> = (0..1usize << n)
            .map(|x| m.coefficients.energy(&bits_of(x, n)).unwrap())
            .collect();
        let spin = h.diagonal().unwrap();
        for x in 0..qubo.len() {
            assert!(
                (qubo[x] - spin[x]).abs() < 1e-9,
                "state {x}: qubo {} vs spin {}",
                qubo[x],
                spin[x]
            );
        }

        let min_q = qubo.iter().copied().fold(f64::INFINITY, f64::min);
        let argmin_s = (0..spin.len())
            .min_by(|&a, &b| spin[a].total_cmp(&spin[b]))
            .unwrap();
        assert!((qubo[argmin_s] - min_q).abs() < 1e-9);
    }
}

#[test]
fn to_binary_inverts_to_spin_on_random_maps() {
    let mut rng = StdRng::seed_from_u64(7);
    let sensors: Vec<SensorObservation> = (0..4)
        .map(|i| SensorObservation::new(format!("S{i}"), 1.0).unwrap())
        .collect();
    let patterns: Vec<FailurePattern> = (0..3)
        .map(|j| FailurePattern::new(format!("P{j}"), "", ["S0"]).unwrap())
        .collect();
    let idx = VariableIndex::from_entities(&sensors, &patterns).unwrap();
    let n = idx.len();

    for _ in 0..50 {
        let mut q = CoefficientMap::new(n);
        q.add_offset(rng.random::<f64>() * 10.0 - 5.0);
        for _ in 0..12 {
            let i = rng.random_range(0..n);
            let j = rng.random_range(0..n);
            q.add(i, j, rng.random::<f64>() * 8.0 - 4.0);
        }
        let back = to_binary(&to_spin(&q, &idx).unwrap(), &idx).unwrap();
        assert!(back.approx_eq(&q, 1e-9));
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

#[test]
fn decoded_energies_match_formula_on_every_assignment() {
    let mut rng = StdRng::seed_from_u64(99);
    let (sensors, patterns) = random_instance(&mut rng, 3, 3);
    let weights = QuboWeights::new(1.3, 0.7, 2.1);
    let m = build_energy_model(&sensors, &patterns, weights).unwrap();
    assert_eq!(m.index.len(), 6);

    let sols =
        decode(&full_distribution(6), &m.index, &sensors, &patterns, &m.coefficients).unwrap();
    assert_eq!(sols.len(), 64);
    for s in &sols {
        let expected = formula_energy(&sensors, &patterns, weights, s.assignment().bits());
        assert!(
            (s.energy() - expected).abs() < 1e-9,
            "{}: decoded {} vs formula {}",
            s.assignment(),
            s.energy(),
            expected
        );
    }
}

#[test]
fn ranking_is_a_strict_total_order() {
    // Zero weights force every assignment to the same energy and frequency.
    let (sensors, patterns) = pump_scenario();
    let mut patterns = patterns;
    patterns.push(FailurePattern::new("SEAL_LEAK", "", ["PRESSURE_001"]).unwrap());
    let m = build_energy_model(&sensors, &patterns, QuboWeights::new(0.0, 0.0, 0.0)).unwrap();
    let sols =
        decode(&full_distribution(5), &m.index, &sensors, &patterns, &m.coefficients).unwrap();

    for pair in sols.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let mut ka = a.selected_patterns().to_vec();
        let mut kb = b.selected_patterns().to_vec();
        ka.sort();
        kb.sort();
        let ordered = match a.energy().total_cmp(&b.energy()) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => {
                a.count() > b.count()
                    || (a.count() == b.count() && ka < kb)
                    || (a.count() == b.count() && ka == kb && a.assignment() < b.assignment())
            }
        };
        assert!(ordered, "{} !< {}", a.assignment(), b.assignment());
    }
}

#[test]
fn empty_solution_list_analysis() {
    let ids = vec!["A".to_string(), "B".to_string()];
    let q = analyze(&[], &ids);
    assert_eq!(q.coverage_rate, 0.0);
    assert_eq!(q.average_pattern_count, 0.0);
    assert_eq!(q.residual_anomalies, ids);
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

#[test]
fn pump_cavitation_scenario() {
    let (sensors, patterns) = pump_scenario();
    let m = build_energy_model(&sensors, &patterns, QuboWeights::default()).unwrap();
    assert_eq!(m.index.len(), 4);

    // Brute-force ground state: pattern active, pressure and flow explained.
    let (ground, _) = (0..16usize)
        .map(|x| (x, m.coefficients.energy(&bits_of(x, 4)).unwrap()))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap();
    let g = bits_of(ground, 4);
    assert!(g[3], "PUMP_CAVITATION should be selected");
    assert!(g[1] && g[2], "PRESSURE_001 and FLOW_001 should be true");

    let sols =
        decode(&full_distribution(4), &m.index, &sensors, &patterns, &m.coefficients).unwrap();
    let top = &sols[0];
    assert_eq!(top.selected_patterns(), ["PUMP_CAVITATION"]);
    assert!(
        top.covered_sensors()
            .iter()
            .all(|s| s == "PRESSURE_001" || s == "FLOW_001")
    );
    let all: Vec<String> = sensors.iter().map(|s| s.sensor_id().to_string()).collect();
    let q = analyze(&sols, &all);
    assert_eq!(q.residual_anomalies, vec!["TEMP_001".to_string()]);
    assert!((q.coverage_rate - 200.0 / 3.0).abs() < 1e-9);
}

#[test]
fn raising_beta_never_selects_more_patterns() {
    let mut rng = StdRng::seed_from_u64(31);
    for _ in 0..10 {
        let (sensors, patterns) = random_instance(&mut rng, 3, 3);
        let mut last = usize::MAX;
        for beta in [0.0, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0] {
            let weights = QuboWeights::new(1.0, beta, 1.0);
            let m = build_energy_model(&sensors, &patterns, weights).unwrap();
            let sols = decode(&full_distribution(6), &m.index, &sensors, &patterns, &m.coefficients)
                .unwrap();
            let best = sols[0].energy();
            // Among exact minimizers, take the most parsimonious.
            let count = sols
                .iter()
                .take_while(|s| s.energy() - best < 1e-9)
                .map(|s| s.pattern_count())
                .min()
                .unwrap();
            assert!(count <= last, "beta {beta}: {count} patterns after {last}");
            last = count;
        }
    }
}

// ---------------------------------------------------------------------------
// Optimizer contract
// ---------------------------------------------------------------------------

#[test]
fn mock_evaluator_distribution_passes_through_unchanged() {
    let (sensors, patterns) = pump_scenario();
    let m = build_energy_model(&sensors, &patterns, QuboWeights::default()).unwrap();
    let h = to_spin(&m.coefficients, &m.index).unwrap();

    let dist = SampleDistribution::from_counts(
        4,
        [
            ("1111".parse::<Bitstring>().unwrap(), 600),
            ("0111".parse::<Bitstring>().unwrap(), 400),
            ("0000".parse::<Bitstring>().unwrap(), 24),
        ],
    )
    .unwrap();
    for max_iterations in [1, 4, 50] {
        let mock = Arc::new(FixedEvaluator::new(0.25, dist.clone()));
        let opt = VariationalOptimizer::new(OptimizerConfig {
            max_iterations,
            ..Default::default()
        })
        .unwrap();
        let out = opt.optimize(&h, mock.clone(), &CancelFlag::new()).unwrap();
        assert_eq!(out.samples, dist);
        assert!(out.metadata.iterations <= max_iterations);
        assert_eq!(mock.estimate_calls(), out.metadata.iterations);
        assert_ne!(out.metadata.termination, Termination::Cancelled);
    }
}

#[test]
fn open_breaker_routes_whole_attempts_to_fallback() {
    let (sensors, patterns) = pump_scenario();
    let request = DiagnosisRequest::new("ANOM_BREAKER", sensors, patterns);
    let mut cfg = ServiceConfig::default();
    cfg.backend.seed = Some(3);
    cfg.qaoa.max_iterations = 10;
    cfg.qaoa.shots = 100;

    let primary =
        Arc::new(FixedEvaluator::new(0.0, SampleDistribution::new(4)).failing("maintenance"));
    let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
    for _ in 0..5 {
        let result = diagnose_with_fallback(
            &request,
            &cfg,
            primary.clone(),
            cfg.simulator().unwrap(),
            &breaker,
            &CancelFlag::new(),
        )
        .unwrap();
        assert!(result.backend_metadata.fallback_used);
        assert_eq!(result.backend_metadata.backend_type, BackendKind::Simulator);
        assert_eq!(result.optimization.evaluator, "statevector_simulator");
        assert_eq!(result.optimization.energy_history.len(), result.optimization.iterations);
        let draws: u64 = result.solutions.iter().map(|s| s.count()).sum();
        assert_eq!(draws, 100);
    }
    // One failed estimate per attempt until three attempts trip the breaker.
    assert_eq!(primary.estimate_calls(), 3);
    assert!(breaker.is_open());
}

// ---------------------------------------------------------------------------
// Full pipeline
// ---------------------------------------------------------------------------

#[test]
fn csv_inputs_through_simulator_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let sensors_path = dir.path().join("sensors.csv");
    let patterns_path = dir.path().join("patterns.csv");
    writeln!(
        std::fs::File::create(&sensors_path).unwrap(),
        "sensor_id,severity\nTEMP_001,2.5\nPRESSURE_001,3.0\nFLOW_001,1.8"
    )
    .unwrap();
    writeln!(
        std::fs::File::create(&patterns_path).unwrap(),
        "pattern_id,description,affected_sensors,weight,topology_tags\n\
         PUMP_CAVITATION,Pump cavitation,PRESSURE_001;FLOW_001,1.0,pump_station\n\
         HX_FOULING,Heat exchanger fouling,TEMP_001,1.0,"
    )
    .unwrap();

    let sensors = load_sensors_csv(&sensors_path).unwrap();
    let patterns = load_patterns_csv(&patterns_path).unwrap();
    validate_pattern_library(&patterns).unwrap();

    let mut cfg = ServiceConfig::default();
    cfg.backend.seed = Some(11);
    cfg.qaoa.max_iterations = 40;
    cfg.qaoa.shots = 2048;
    let request = DiagnosisRequest::new("ANOM_CSV", sensors.clone(), patterns.clone());
    let result = diagnose(&request, &cfg, cfg.simulator().unwrap(), &CancelFlag::new()).unwrap();

    assert_eq!(result.anomaly_id, "ANOM_CSV");
    assert!(!result.solutions.is_empty());
    for pair in result.solutions.windows(2) {
        assert!(pair[0].energy() <= pair[1].energy());
    }
    let draws: u64 = result.solutions.iter().map(|s| s.count()).sum();
    assert_eq!(draws, 2048);

    // No decoded energy may undercut the true ground state.
    let m = build_energy_model(&sensors, &patterns, QuboWeights::default()).unwrap();
    let ground = (0..1usize << 5)
        .map(|x| m.coefficients.energy(&bits_of(x, 5)).unwrap())
        .fold(f64::INFINITY, f64::min);
    assert!(result.solutions[0].energy() >= ground - 1e-9);
    assert!(result.optimization.minimum_energy >= ground - 1e-9);
}

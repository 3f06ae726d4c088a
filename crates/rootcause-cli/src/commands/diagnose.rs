use rootcause_core::{
    CancelFlag, CircuitBreaker, DiagnosisRequest, DiagnosisResult, OptimizerKind, Result,
    ServiceConfig, diagnose_configured,
};

use super::{RequestSource, join_or_dash, or_exit};

pub struct DiagnoseCommandConfig<'a> {
    pub source: RequestSource<'a>,
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub gamma: Option<f64>,
    pub depth: Option<usize>,
    pub optimizer: Option<&'a str>,
    pub max_iterations: Option<usize>,
    pub shots: Option<u64>,
    pub seed: Option<u64>,
    pub timeout_sec: Option<u64>,
    pub backend: Option<&'a str>,
    pub top: usize,
    pub output_path: Option<&'a str>,
}

pub fn run(cfg: DiagnoseCommandConfig<'_>) {
    let mut config = super::load_config();
    or_exit(apply_overrides(&mut config, &cfg), "Invalid option");
    let mut request = or_exit(super::load_request(&cfg.source), "Failed to load request");
    override_weights(&mut request, &cfg);

    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.cancel()) {
        log::warn!("Ctrl+C handler not installed: {e}");
    }

    println!(
        "Diagnosing {} ({} sensors, {} patterns) on {}: depth {}, {} iterations max, {} shots\n",
        request.anomaly_id,
        request.abnormal_sensors.len(),
        request.patterns.len(),
        config.backend.backend_type,
        config.qaoa.depth,
        config.qaoa.max_iterations,
        config.qaoa.shots,
    );

    let breaker = CircuitBreaker::default();
    let result = or_exit(
        diagnose_configured(&request, &config, &breaker, &cancel),
        "Diagnosis failed",
    );
    print_result(&result, cfg.top.max(1));

    if let Some(path) = cfg.output_path {
        super::write_json(path, &result);
    }
}

/// Command-line flags layered over the environment configuration.
fn apply_overrides(config: &mut ServiceConfig, cfg: &DiagnoseCommandConfig<'_>) -> Result<()> {
    if let Some(d) = cfg.depth {
        config.qaoa.depth = d;
    }
    if let Some(name) = cfg.optimizer {
        config.qaoa.optimizer = name.parse::<OptimizerKind>()?;
    }
    if let Some(n) = cfg.max_iterations {
        config.qaoa.max_iterations = n;
    }
    if let Some(s) = cfg.shots {
        config.qaoa.shots = s;
    }
    if cfg.seed.is_some() {
        config.backend.seed = cfg.seed;
    }
    if let Some(t) = cfg.timeout_sec {
        config.timeout_secs = t;
    }
    if let Some(b) = cfg.backend {
        config.backend.backend_type = b.parse()?;
    }
    config.validate()
}

fn override_weights(request: &mut DiagnosisRequest, cfg: &DiagnoseCommandConfig<'_>) {
    request.alpha = cfg.alpha.or(request.alpha);
    request.beta = cfg.beta.or(request.beta);
    request.gamma = cfg.gamma.or(request.gamma);
}

fn print_result(result: &DiagnosisResult, top: usize) {
    if result.solutions.is_empty() {
        println!("No hypotheses decoded (the run produced no samples).");
    } else {
        println!(
            "{:>4}  {:<32} {:>10} {:>9} {:>11}  Covered",
            "Rank", "Patterns", "Energy", "Freq", "Confidence"
        );
        println!("{}", "-".repeat(90));
        for (rank, s) in result.solutions.iter().take(top).enumerate() {
            println!(
                "{:>4}  {:<32} {:>10.4} {:>8.1}% {:>10.1}%  {}",
                rank + 1,
                join_or_dash(s.selected_patterns()),
                s.energy(),
                s.sample_frequency() * 100.0,
                s.confidence_score(),
                join_or_dash(s.covered_sensors()),
            );
        }
        if result.solutions.len() > top {
            println!("  ... {} more", result.solutions.len() - top);
        }
    }

    let q = &result.quality_metrics;
    let m = &result.backend_metadata;
    let o = &result.optimization;
    println!();
    println!("Quality");
    println!("  Coverage:          {:.1}%", q.coverage_rate);
    println!("  Avg patterns:      {:.2}", q.average_pattern_count);
    println!("  Residual:          {}", join_or_dash(&q.residual_anomalies));
    println!();
    println!("Backend");
    println!("  Name:              {} ({})", m.backend_name, m.backend_type);
    if m.fallback_used {
        println!("  Fallback:          yes");
    }
    println!("  Execution id:      {}", m.execution_id);
    println!("  Time:              {:.3}s", m.execution_time_seconds);
    println!(
        "  Optimizer:         {} · {} iterations · {}",
        o.optimizer, o.iterations, o.termination
    );
}

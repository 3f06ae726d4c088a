//! Dump the energy model for a request without running the optimizer.

use rootcause_core::{
    Bitstring, DiagnosisRequest, EnergyModel, Result, SpinHamiltonian, VariableKind,
    build_energy_model, normalize_severities, to_spin,
};

use super::{RequestSource, join_or_dash, or_exit};

/// Exhaustive search is only attempted up to this many variables.
const MAX_BRUTE_FORCE_VARIABLES: usize = 16;

pub fn run(source: RequestSource<'_>, output_path: Option<&str>) {
    let config = super::load_config();
    let request = or_exit(super::load_request(&source), "Failed to load request");
    let weights = request.weights(config.qubo);
    let model = or_exit(
        build_energy_model(&request.abnormal_sensors, &request.patterns, weights),
        "Invalid request",
    );
    let hamiltonian = or_exit(to_spin(&model.coefficients, &model.index), "Encoding failed");

    println!(
        "Anomaly {}: alpha={} beta={} gamma={}\n",
        request.anomaly_id, weights.alpha, weights.beta, weights.gamma
    );

    println!("Sensors (severity, relative to the worst)");
    for ((id, severity), relative) in relative_severities(&request) {
        println!("  {id:<16} {severity:>8.3}  {relative:>5.2}");
    }

    println!("\nVariables ({})", model.index.len());
    for v in model.index.iter() {
        let kind = match v.kind {
            VariableKind::SensorTruth => "sensor",
            VariableKind::PatternActive => "pattern",
        };
        println!("  {:>3}  {:<8} {}", v.index, kind, v.name);
    }

    let named = or_exit(model.coefficients.named(&model.index), "Index mismatch");
    println!("\nQUBO ({} terms, offset {:.4})", named.len(), model.coefficients.offset());
    for c in &named {
        if c.first == c.second {
            println!("  {:>10.4}  {}", c.value, c.first);
        } else {
            println!("  {:>10.4}  {} · {}", c.value, c.first, c.second);
        }
    }

    println!("\nIsing (offset {:.4})", hamiltonian.offset());
    for v in model.index.iter() {
        let h = hamiltonian.h(v.index);
        if h != 0.0 {
            println!("  h {:>10.4}  {}", h, v.name);
        }
    }
    for ((i, j), value) in hamiltonian.couplings() {
        println!("  J {:>10.4}  {} · {}", value, name_of(&model, i), name_of(&model, j));
    }

    let ground = ground_state(&model, &hamiltonian);
    match &ground {
        Some((bits, energy)) => {
            let (sensors, patterns) = split_assignment(&model, bits);
            println!("\nGround state {bits} (energy {energy:.4})");
            println!("  Patterns: {}", join_or_dash(&patterns));
            println!("  Sensors:  {}", join_or_dash(&sensors));
        }
        None => println!(
            "\nGround state skipped: more than {MAX_BRUTE_FORCE_VARIABLES} variables"
        ),
    }

    if let Some(path) = output_path {
        let report = or_exit(report_json(&model, &hamiltonian, ground.as_ref()), "Index mismatch");
        super::write_json(path, &report);
    }
}

/// Each sensor's `(id, severity)` with its severity scaled by the largest one.
fn relative_severities(request: &DiagnosisRequest) -> Vec<((&str, f64), f64)> {
    request
        .abnormal_sensors
        .iter()
        .map(|s| (s.sensor_id(), s.severity()))
        .zip(normalize_severities(&request.abnormal_sensors))
        .collect()
}

fn name_of(model: &EnergyModel, index: usize) -> &str {
    model.index.get(index).map_or("?", |v| v.name.as_str())
}

/// Exhaustive minimum of the spin Hamiltonian, ties to the lowest basis index.
pub fn ground_state(
    model: &EnergyModel,
    hamiltonian: &SpinHamiltonian,
) -> Option<(Bitstring, f64)> {
    let n = model.index.len();
    if n > MAX_BRUTE_FORCE_VARIABLES {
        return None;
    }
    hamiltonian
        .diagonal()
        .ok()?
        .into_iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(basis, energy)| (Bitstring::from_basis(basis, n), energy))
}

/// Entities set to true in `bits`: (sensors, patterns).
fn split_assignment(model: &EnergyModel, bits: &Bitstring) -> (Vec<String>, Vec<String>) {
    let mut sensors = Vec::new();
    let mut patterns = Vec::new();
    for v in model.index.iter().filter(|v| bits.get(v.index)) {
        match v.kind {
            VariableKind::SensorTruth => sensors.push(v.entity_id.clone()),
            VariableKind::PatternActive => patterns.push(v.entity_id.clone()),
        }
    }
    (sensors, patterns)
}

fn report_json(
    model: &EnergyModel,
    hamiltonian: &SpinHamiltonian,
    ground: Option<&(Bitstring, f64)>,
) -> Result<serde_json::Value> {
    let linear: Vec<serde_json::Value> = model
        .index
        .iter()
        .map(|v| serde_json::json!({ "variable": v.name, "h": hamiltonian.h(v.index) }))
        .collect();
    let couplings: Vec<serde_json::Value> = hamiltonian
        .couplings()
        .map(|((i, j), value)| {
            serde_json::json!({
                "first": name_of(model, i),
                "second": name_of(model, j),
                "j": value,
            })
        })
        .collect();
    let ground = ground.map(|(bits, energy)| {
        let (sensors, patterns) = split_assignment(model, bits);
        serde_json::json!({
            "assignment": bits,
            "energy": energy,
            "selected_patterns": patterns,
            "true_sensors": sensors,
        })
    });

    Ok(serde_json::json!({
        "variables": model.index.iter().collect::<Vec<_>>(),
        "qubo": {
            "offset": model.coefficients.offset(),
            "terms": model.coefficients.named(&model.index)?,
        },
        "ising": {
            "offset": hamiltonian.offset(),
            "linear": linear,
            "couplings": couplings,
        },
        "ground_state": ground,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rootcause_core::{FailurePattern, QuboWeights, SensorObservation};

    fn pump_model() -> EnergyModel {
        let sensors = vec![
            SensorObservation::new("TEMP_001", 2.5).unwrap(),
            SensorObservation::new("PRESSURE_001", 3.0).unwrap(),
            SensorObservation::new("FLOW_001", 1.8).unwrap(),
        ];
        let patterns =
            vec![FailurePattern::new("PUMP_CAVITATION", "", ["PRESSURE_001", "FLOW_001"]).unwrap()];
        build_energy_model(&sensors, &patterns, QuboWeights::default()).unwrap()
    }

    #[test]
    fn test_ground_state_selects_pump() {
        let model = pump_model();
        let h = to_spin(&model.coefficients, &model.index).unwrap();
        let (bits, energy) = ground_state(&model, &h).unwrap();
        let (sensors, patterns) = split_assignment(&model, &bits);
        assert_eq!(patterns, vec!["PUMP_CAVITATION".to_string()]);
        assert!(sensors.contains(&"PRESSURE_001".to_string()));
        assert!(sensors.contains(&"FLOW_001".to_string()));
        assert!((model.coefficients.energy(bits.bits()).unwrap() - energy).abs() < 1e-9);
    }

    #[test]
    fn test_ground_state_skipped_for_large_models() {
        let sensors: Vec<SensorObservation> = (0..MAX_BRUTE_FORCE_VARIABLES)
            .map(|i| SensorObservation::new(format!("S{i}"), 1.0).unwrap())
            .collect();
        let patterns = vec![FailurePattern::new("P", "", ["S0"]).unwrap()];
        let model = build_energy_model(&sensors, &patterns, QuboWeights::default()).unwrap();
        let h = to_spin(&model.coefficients, &model.index).unwrap();
        assert!(ground_state(&model, &h).is_none());
    }

    #[test]
    fn test_relative_severities_scale_to_worst() {
        let sensors = vec![
            SensorObservation::new("TEMP_001", 1.5).unwrap(),
            SensorObservation::new("PRESSURE_001", 3.0).unwrap(),
        ];
        let patterns = vec![FailurePattern::new("P", "", ["TEMP_001"]).unwrap()];
        let request = DiagnosisRequest::new("A", sensors, patterns);
        let rows = relative_severities(&request);
        assert_eq!(rows[0].0, ("TEMP_001", 1.5));
        assert!((rows[0].1 - 0.5).abs() < 1e-12);
        assert!((rows[1].1 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_report_json_shape() {
        let model = pump_model();
        let h = to_spin(&model.coefficients, &model.index).unwrap();
        let ground = ground_state(&model, &h);
        let json = report_json(&model, &h, ground.as_ref()).unwrap();
        assert_eq!(json["variables"].as_array().unwrap().len(), 4);
        assert_eq!(json["variables"][3]["name"], "y_PUMP_CAVITATION");
        assert_eq!(json["ising"]["linear"].as_array().unwrap().len(), 4);
        assert_eq!(json["ground_state"]["selected_patterns"][0], "PUMP_CAVITATION");
        assert!(json["ground_state"]["assignment"].is_string());
    }
}

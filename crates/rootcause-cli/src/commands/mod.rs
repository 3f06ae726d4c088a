pub mod diagnose;
pub mod inspect;
pub mod server;

use std::fmt::Display;

use rootcause_core::{
    DiagnosisError, DiagnosisRequest, Result, ServiceConfig, aggregate_window, load_patterns_csv,
    load_readings_csv, load_sensors_csv, validate_pattern_library,
};

/// Where a diagnosis request comes from on the command line.
pub struct RequestSource<'a> {
    pub request_path: Option<&'a str>,
    pub sensors_path: Option<&'a str>,
    /// Raw readings aggregated into severities over the trailing `window`.
    pub readings_path: Option<&'a str>,
    pub window: usize,
    pub patterns_path: Option<&'a str>,
    pub anomaly_id: &'a str,
}

/// Print `context: error` and exit non-zero.
pub fn or_exit<T, E: Display>(result: std::result::Result<T, E>, context: &str) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{context}: {e}");
            std::process::exit(1);
        }
    }
}

/// Environment-derived configuration. `RUST_LOG` wins over the configured level.
pub fn load_config() -> ServiceConfig {
    let config = or_exit(ServiceConfig::from_env(), "Invalid configuration");
    init_logging(&config.log_level);
    config
}

fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    // A second init (tests, embedding) is harmless.
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Read a request from a JSON file, or from a patterns CSV plus either a
/// sensors CSV or a readings CSV.
pub fn load_request(src: &RequestSource<'_>) -> Result<DiagnosisRequest> {
    if let Some(path) = src.request_path {
        let text = std::fs::read_to_string(path).map_err(|source| DiagnosisError::Io {
            path: path.into(),
            source,
        })?;
        return parse_request(&text);
    }

    let Some(patterns_path) = src.patterns_path else {
        return Err(missing_inputs());
    };
    let sensors = match (src.sensors_path, src.readings_path) {
        (Some(path), None) => load_sensors_csv(path)?,
        (None, Some(path)) => {
            let sensors = aggregate_window(&load_readings_csv(path)?, src.window)?;
            log::info!("aggregated {} sensors from {path} (window {})", sensors.len(), src.window);
            sensors
        }
        _ => return Err(missing_inputs()),
    };
    let patterns = load_patterns_csv(patterns_path)?;
    validate_pattern_library(&patterns)?;
    Ok(DiagnosisRequest::new(src.anomaly_id, sensors, patterns))
}

fn missing_inputs() -> DiagnosisError {
    DiagnosisError::invalid_input(
        "either --request, or --patterns with one of --sensors and --readings, is required",
    )
}

fn parse_request(text: &str) -> Result<DiagnosisRequest> {
    serde_json::from_str(text)
        .map_err(|e| DiagnosisError::invalid_input(format!("request JSON: {e}")))
}

/// Serialize `value` as pretty JSON to `path`.
pub fn write_json<T: serde::Serialize>(path: &str, value: &T) {
    let json = or_exit(serde_json::to_string_pretty(value), "Failed to serialize output");
    match std::fs::write(path, json) {
        Ok(()) => println!("\nWrote {path}"),
        Err(e) => {
            eprintln!("Failed to write {path}: {e}");
            std::process::exit(1);
        }
    }
}

/// Comma-joined list, or `-` when empty.
pub fn join_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path.to_string_lossy().into_owned()
    }

    // -----------------------------------------------------------------------
    // load_request
    // -----------------------------------------------------------------------

    #[test]
    fn test_load_request_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "req.json",
            r#"{"anomaly_id": "A1", "abnormal_sensors": [{"sensor_id": "S", "severity": 1.0}],
                "patterns": [{"pattern_id": "P", "description": "", "affected_sensors": ["S"]}]}"#,
        );
        let req = load_request(&RequestSource {
            request_path: Some(&path),
            sensors_path: None,
            readings_path: None,
            window: 10,
            patterns_path: None,
            anomaly_id: "ignored",
        })
        .unwrap();
        assert_eq!(req.anomaly_id, "A1");
        assert_eq!(req.patterns.len(), 1);
    }

    #[test]
    fn test_load_request_csv_pair() {
        let dir = tempfile::tempdir().unwrap();
        let sensors = write(&dir, "s.csv", "sensor_id,severity\nS1,2.0\nS2,1.0\n");
        let patterns = write(
            &dir,
            "p.csv",
            "pattern_id,description,affected_sensors\nP1,first,S1;S2\n",
        );
        let req = load_request(&RequestSource {
            request_path: None,
            sensors_path: Some(&sensors),
            readings_path: None,
            window: 10,
            patterns_path: Some(&patterns),
            anomaly_id: "CSV_1",
        })
        .unwrap();
        assert_eq!(req.anomaly_id, "CSV_1");
        assert_eq!(req.sensor_ids(), vec!["S1".to_string(), "S2".to_string()]);
    }

    #[test]
    fn test_load_request_from_readings() {
        let dir = tempfile::tempdir().unwrap();
        let readings = write(
            &dir,
            "r.csv",
            "sensor_id,value\nS1,9.0\nS2,-1.0\nS1,2.0\nS1,-4.0\nS2,3.0\n",
        );
        let patterns = write(&dir, "p.csv", "pattern_id,affected_sensors\nP1,S1;S2\n");
        let req = load_request(&RequestSource {
            request_path: None,
            sensors_path: None,
            readings_path: Some(&readings),
            window: 2,
            patterns_path: Some(&patterns),
            anomaly_id: "WINDOW_1",
        })
        .unwrap();
        assert_eq!(req.sensor_ids(), vec!["S1".to_string(), "S2".to_string()]);
        // Trailing two readings, mean absolute value.
        assert!((req.abnormal_sensors[0].severity() - 3.0).abs() < 1e-12);
        assert!((req.abnormal_sensors[1].severity() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_load_request_rejects_zero_window() {
        let dir = tempfile::tempdir().unwrap();
        let readings = write(&dir, "r.csv", "sensor_id,value\nS1,1.0\n");
        let patterns = write(&dir, "p.csv", "pattern_id,affected_sensors\nP1,S1\n");
        let err = load_request(&RequestSource {
            request_path: None,
            sensors_path: None,
            readings_path: Some(&readings),
            window: 0,
            patterns_path: Some(&patterns),
            anomaly_id: "W",
        })
        .unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_load_request_needs_inputs() {
        let err = load_request(&RequestSource {
            request_path: None,
            sensors_path: Some("s.csv"),
            readings_path: None,
            window: 10,
            patterns_path: None,
            anomaly_id: "X",
        })
        .unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_bad_json_is_invalid_input() {
        assert!(parse_request("{").unwrap_err().is_client_error());
    }

    #[test]
    fn test_join_or_dash() {
        assert_eq!(join_or_dash(&[]), "-");
        assert_eq!(join_or_dash(&["a".into(), "b".into()]), "a, b");
    }
}

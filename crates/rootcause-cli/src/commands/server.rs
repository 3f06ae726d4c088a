pub fn run(host: &str, port: u16) {
    let config = super::load_config();

    let base = format!("http://{host}:{port}");
    println!("rootcause server v{}", rootcause_core::VERSION);
    println!("   {base}");
    println!(
        "   backend: {} ({} qubits max, depth {} max)",
        config.backend.backend_type, config.backend.max_qubits, config.backend.max_depth
    );
    println!(
        "   defaults: alpha={} beta={} gamma={}, qaoa depth {}, {} shots",
        config.qubo.alpha, config.qubo.beta, config.qubo.gamma, config.qaoa.depth, config.qaoa.shots
    );
    println!();
    println!("   Endpoints:");
    println!("     GET  /                         API index (try: curl {base})");
    println!("     GET  /health                   Service and backend health");
    println!("     POST /diagnose-plant-anomaly   Rank root-cause hypotheses");
    println!();
    println!("   Example:");
    println!("     curl -X POST {base}/diagnose-plant-anomaly \\");
    println!("          -H 'content-type: application/json' -d @request.json");
    println!();

    let rt = super::or_exit(tokio::runtime::Runtime::new(), "Failed to start runtime");
    super::or_exit(
        rt.block_on(rootcause_server::run_server(config, host, port)),
        "Server error",
    );
}

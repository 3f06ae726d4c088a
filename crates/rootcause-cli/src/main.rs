//! CLI for rootcause: rank failure-pattern hypotheses for abnormal plant sensors.

mod commands;

use clap::{Parser, Subcommand};

use commands::RequestSource;

#[derive(Parser)]
#[command(name = "rootcause")]
#[command(about = "rootcause: which known failure explains these abnormal sensors?")]
#[command(version = rootcause_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full diagnosis pipeline and print ranked hypotheses
    Diagnose {
        /// Request JSON (anomaly_id, abnormal_sensors, patterns, optional weights)
        #[arg(long, conflicts_with_all = ["sensors", "readings", "patterns"])]
        request: Option<String>,

        /// Sensors CSV (sensor_id,severity)
        #[arg(long, requires = "patterns")]
        sensors: Option<String>,

        /// Raw readings CSV (sensor_id,value[,mean,std]) aggregated into severities
        #[arg(long, requires = "patterns", conflicts_with = "sensors")]
        readings: Option<String>,

        /// Trailing readings per sensor used with --readings
        #[arg(long, default_value = "10")]
        window: usize,

        /// Patterns CSV (pattern_id,description,affected_sensors[,weight,topology_tags])
        #[arg(long)]
        patterns: Option<String>,

        /// Anomaly id used with --sensors/--readings
        #[arg(long, default_value = "ANOMALY")]
        anomaly_id: String,

        /// Unexplained-severity weight
        #[arg(long)]
        alpha: Option<f64>,

        /// Parsimony weight per selected pattern
        #[arg(long)]
        beta: Option<f64>,

        /// Coverage-consistency weight
        #[arg(long)]
        gamma: Option<f64>,

        /// Variational layers
        #[arg(long)]
        depth: Option<usize>,

        /// Parameter search: nelder_mead (alias cobyla) or spsa
        #[arg(long)]
        optimizer: Option<String>,

        /// Energy evaluations budget
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Final sample draws
        #[arg(long)]
        shots: Option<u64>,

        /// Seed for initial parameters and sampling
        #[arg(long)]
        seed: Option<u64>,

        /// Per-evaluation timeout in seconds (0 = unbounded)
        #[arg(long)]
        timeout_sec: Option<u64>,

        /// Backend type: simulator or hardware
        #[arg(long)]
        backend: Option<String>,

        /// Hypotheses to print
        #[arg(long, default_value = "10")]
        top: usize,

        /// Write the full result as JSON
        #[arg(long)]
        output: Option<String>,
    },

    /// Print the variable index, QUBO and Ising coefficients and the exact ground state
    Inspect {
        /// Request JSON
        #[arg(long, conflicts_with_all = ["sensors", "readings", "patterns"])]
        request: Option<String>,

        /// Sensors CSV
        #[arg(long, requires = "patterns")]
        sensors: Option<String>,

        /// Raw readings CSV
        #[arg(long, requires = "patterns", conflicts_with = "sensors")]
        readings: Option<String>,

        /// Trailing readings per sensor used with --readings
        #[arg(long, default_value = "10")]
        window: usize,

        /// Patterns CSV
        #[arg(long)]
        patterns: Option<String>,

        /// Anomaly id used with --sensors/--readings
        #[arg(long, default_value = "ANOMALY")]
        anomaly_id: String,

        /// Write the model as JSON
        #[arg(long)]
        output: Option<String>,
    },

    /// Start the HTTP diagnosis server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8000")]
        port: u16,

        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Diagnose {
            request,
            sensors,
            readings,
            window,
            patterns,
            anomaly_id,
            alpha,
            beta,
            gamma,
            depth,
            optimizer,
            max_iterations,
            shots,
            seed,
            timeout_sec,
            backend,
            top,
            output,
        } => commands::diagnose::run(commands::diagnose::DiagnoseCommandConfig {
            source: RequestSource {
                request_path: request.as_deref(),
                sensors_path: sensors.as_deref(),
                readings_path: readings.as_deref(),
                window,
                patterns_path: patterns.as_deref(),
                anomaly_id: &anomaly_id,
            },
            alpha,
            beta,
            gamma,
            depth,
            optimizer: optimizer.as_deref(),
            max_iterations,
            shots,
            seed,
            timeout_sec,
            backend: backend.as_deref(),
            top,
            output_path: output.as_deref(),
        }),
        Commands::Inspect {
            request,
            sensors,
            readings,
            window,
            patterns,
            anomaly_id,
            output,
        } => commands::inspect::run(
            RequestSource {
                request_path: request.as_deref(),
                sensors_path: sensors.as_deref(),
                readings_path: readings.as_deref(),
                window,
                patterns_path: patterns.as_deref(),
                anomaly_id: &anomaly_id,
            },
            output.as_deref(),
        ),
        Commands::Serve { port, host } => commands::server::run(&host, port),
    }
}

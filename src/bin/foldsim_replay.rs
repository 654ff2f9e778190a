//! foldsim replay
//!
//! Drives a worker with the instrumented solver at a simulated host cook
//! cadence and prints what the host would see after every cook.

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use foldsim::{
    pack_mesh, FoldSimResult, HostParameters, InstrumentedSolver, Interests, MeshBuffers, Simulator,
    WorkerConfig,
};

struct Args {
    fold_path: PathBuf,
    frame: u16,
    cooks: u32,
    period: Duration,
    percentage: f32,
    config: Option<PathBuf>,
    interests: Interests,
    verbose: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            fold_path: PathBuf::new(),
            frame: 0,
            cooks: 60,
            period: Duration::from_millis(16),
            percentage: 1.0,
            config: None,
            interests: Interests::default(),
            verbose: false,
        }
    }
}

fn usage() {
    println!("foldsim-replay - run a fold model at a simulated host cadence");
    println!();
    println!("USAGE:");
    println!("    foldsim-replay <FILE.fold> [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("        --frame <N>           Frame to simulate [default: 0]");
    println!("        --cooks <N>           Number of host cooks [default: 60]");
    println!("        --period-ms <MS>      Host cook period [default: 16]");
    println!("        --percentage <F>      Fold percentage in [-1, 1] [default: 1.0]");
    println!("        --config <PATH>       Worker config (JSON)");
    println!("        --velocity            Also extract velocity");
    println!("        --error               Also extract per-vertex error");
    println!("    -v, --verbose             Debug logging (RUST_LOG overrides)");
    println!("    -h, --help                Print help information");
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("error: {flag} requires a value");
            std::process::exit(2);
        }
    }
}

fn parsed<T: std::str::FromStr>(raw: &str, flag: &str) -> T {
    raw.parse().unwrap_or_else(|_| {
        eprintln!("error: invalid value for {flag}: {raw}");
        std::process::exit(2);
    })
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed_args = Args::default();
    let mut fold_path = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--frame" => {
                parsed_args.frame = parsed(value(&args, i, "--frame"), "--frame");
                i += 2;
            }
            "--cooks" => {
                parsed_args.cooks = parsed(value(&args, i, "--cooks"), "--cooks");
                i += 2;
            }
            "--period-ms" => {
                let ms: u64 = parsed(value(&args, i, "--period-ms"), "--period-ms");
                parsed_args.period = Duration::from_millis(ms);
                i += 2;
            }
            "--percentage" => {
                parsed_args.percentage = parsed(value(&args, i, "--percentage"), "--percentage");
                i += 2;
            }
            "--config" => {
                parsed_args.config = Some(PathBuf::from(value(&args, i, "--config")));
                i += 2;
            }
            "--velocity" => {
                parsed_args.interests.velocity = true;
                i += 1;
            }
            "--error" => {
                parsed_args.interests.error = true;
                i += 1;
            }
            "--verbose" | "-v" => {
                parsed_args.verbose = true;
                i += 1;
            }
            "--help" | "-h" => {
                usage();
                std::process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("error: unknown argument: {other}");
                eprintln!("run with --help for usage");
                std::process::exit(2);
            }
            other => {
                if fold_path.replace(PathBuf::from(other)).is_some() {
                    eprintln!("error: only one fold file may be given");
                    std::process::exit(2);
                }
                i += 1;
            }
        }
    }

    let Some(path) = fold_path else {
        eprintln!("error: missing fold file");
        eprintln!("run with --help for usage");
        std::process::exit(2);
    };
    parsed_args.fold_path = path;
    parsed_args
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let layer = fmt::layer().with_writer(std::io::stderr).with_target(false);
    tracing_subscriber::registry().with(filter).with(layer).init();
}

fn run(args: &Args) -> FoldSimResult<()> {
    let config = match &args.config {
        Some(path) => WorkerConfig::from_json_path(path)?,
        None => WorkerConfig::default(),
    };

    let fold_source = match std::fs::read_to_string(&args.fold_path) {
        Ok(text) => text,
        Err(err) => {
            error!(path = %args.fold_path.display(), error = %err, "cannot read fold file");
            String::new()
        }
    };

    let parameters = HostParameters {
        fold_source,
        frame_index: args.frame,
        fold_percentage: args.percentage,
        target_period: args.period,
        ..HostParameters::default()
    };

    let mut simulator = Simulator::start(InstrumentedSolver::default(), config)?;
    info!(id = %simulator.worker().id(), cooks = args.cooks, period_ms = args.period.as_millis(), "replay started");

    let started = Instant::now();
    for cook in 0..args.cooks {
        let cook_start = Instant::now();
        simulator.execute(&parameters, args.interests)?;

        {
            let output = simulator.query()?;
            let mut mesh = MeshBuffers::default();
            let packed = pack_mesh(&output, &mut mesh);
            println!(
                "cook {cook:>4}  output #{:<5} rev {:<3} steps {:<5} points {:<6} tris {:<6} max_err {} max_vel {}",
                output.output_number(),
                output.revision(),
                output.steps_since_last_output(),
                packed.points,
                packed.triangles,
                output.max_error().map_or_else(|| "-".to_string(), |v| format!("{v:.4}")),
                output.max_velocity().map_or_else(|| "-".to_string(), |v| format!("{v:.4}")),
            );
        }

        if cook == 0 || cook + 1 == args.cooks {
            println!("status: {}", simulator.status_text());
        }

        if let Some(rest) = args.period.checked_sub(cook_start.elapsed()) {
            thread::sleep(rest);
        }
    }

    let dropped = simulator.worker().dropped_status_events();
    info!(elapsed_ms = started.elapsed().as_millis(), dropped_status_events = dropped, "replay finished");
    simulator.shutdown()
}

fn main() -> ExitCode {
    let args = parse_args();
    init_logging(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "replay failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

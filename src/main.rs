use clap::{Parser, Subcommand, ValueEnum};
use specer::config::{CLIENT_ID_ENV, EXPERIMENT_ID_ENV, SPEC_PATH_ENV, SYNC_DIR_ENV};
use specer::coordination::SignalKind;
use specer::error::{EXIT_FAILURE, benchmark_exit_status, exit_code_for};
use specer::runner::{
    self, CoordinateArgs, RunArgs, SyncArgs, coordinate, default_client_id, default_sync_dir,
    run_benchmark, save_results,
};
use specer::suite::{Affinity, Preference, format_cpu_list};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Clone)]
#[command(name = "specer", version, about = "SPEC CPU 2017 runner with synchronized multi-client execution")]
struct Args {
    /// Show debug logs and runcpu output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode - only warnings and the final summary
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Directory shared by the clients of an experiment
    #[arg(long, global = true, env = SYNC_DIR_ENV)]
    sync_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum SignalArg {
    Start,
    Stop,
}

impl From<SignalArg> for SignalKind {
    fn from(arg: SignalArg) -> Self {
        match arg {
            SignalArg::Start => SignalKind::Start,
            SignalArg::Stop => SignalKind::Stop,
        }
    }
}

#[derive(Clone, Subcommand)]
enum Command {
    /// Run benchmarks through runcpu
    Run {
        /// Benchmarks or suites (gcc, 519.lbm_r, intrate, ...)
        #[arg(required = true)]
        benchmarks: Vec<String>,

        /// runcpu configuration file
        #[arg(short, long, default_value = "default.cfg")]
        config: String,

        /// SPEC CPU 2017 installation directory
        #[arg(long, env = SPEC_PATH_ENV)]
        spec_root: Option<PathBuf>,

        /// Tuning level (base, peak, all)
        #[arg(long)]
        tune: Option<String>,

        /// Input size (test, train, ref)
        #[arg(long)]
        size: Option<String>,

        /// Number of copies for rate benchmarks
        #[arg(long)]
        copies: Option<u32>,

        /// Number of threads for speed benchmarks
        #[arg(long)]
        threads: Option<u32>,

        /// Number of iterations
        #[arg(long)]
        iterations: Option<u32>,

        /// CPU cores to use: copies for rate runs, threads for speed runs
        #[arg(long)]
        cores: Option<u32>,

        /// Resolve simple names to speed benchmarks
        #[arg(long, conflicts_with = "rate")]
        speed: bool,

        /// Resolve simple names to rate benchmarks
        #[arg(long)]
        rate: bool,

        /// Run in reportable mode (requires a full suite)
        #[arg(long, conflicts_with = "noreportable")]
        reportable: bool,

        /// Run in non-reportable mode
        #[arg(long)]
        noreportable: bool,

        /// Rebuild binaries before running
        #[arg(long)]
        rebuild: bool,

        /// Keep going when a benchmark fails
        #[arg(long)]
        ignore_errors: bool,

        /// runcpu output formats (default: rsf,pdf; "all" for every format)
        #[arg(long)]
        output_formats: Option<String>,

        /// Bind CPUs and memory to a NUMA node
        #[arg(long)]
        numa_node: Option<u32>,

        /// Bind to CPU cores (e.g., 0-3,8-11)
        #[arg(long)]
        cpu_cores: Option<String>,

        /// Do not bind memory to the NUMA node given with --numa-node
        #[arg(long)]
        no_numa_memory: bool,

        /// Show the command without running it
        #[arg(long)]
        dry_run: bool,

        /// Save results to a JSON file (auto-named if no path is given)
        #[arg(long, value_name = "PATH", num_args = 0..=1)]
        json: Option<Option<PathBuf>>,

        /// Synchronize start and stop with the other clients of an experiment
        #[arg(long)]
        sync: bool,

        /// Experiment to join with --sync
        #[arg(long, env = EXPERIMENT_ID_ENV)]
        experiment: Option<String>,

        /// Client id within the experiment (default: host name)
        #[arg(long, env = CLIENT_ID_ENV)]
        client_id: Option<String>,

        /// How long to wait for the start signal (e.g., 30s, 5m, 1h)
        #[arg(long, default_value = "1h", value_parser = cli::parse_duration)]
        start_timeout: Duration,

        /// How long to wait for the stop signal after finishing
        #[arg(long, default_value = "1h", value_parser = cli::parse_duration)]
        stop_timeout: Duration,
    },

    /// Act as the controller of an experiment
    Coordinate {
        /// Experiment to control
        #[arg(short, long, env = EXPERIMENT_ID_ENV)]
        experiment: String,

        /// Number of clients that must register before start is issued
        #[arg(short = 'n', long)]
        expected_clients: usize,

        /// How long to wait for the clients to register
        #[arg(long, default_value = "1h", value_parser = cli::parse_duration)]
        start_timeout: Duration,

        /// How long the clients may run before stop is forced
        #[arg(long, default_value = "48h", value_parser = cli::parse_duration)]
        run_timeout: Duration,

        /// Keep the experiment's state after stop
        #[arg(long)]
        keep_state: bool,
    },

    /// Issue a start or stop signal by hand
    Signal {
        #[arg(value_enum)]
        kind: SignalArg,

        /// Experiment to signal
        #[arg(short, long, env = EXPERIMENT_ID_ENV)]
        experiment: String,
    },

    /// Show the clients and signals of an experiment
    Status {
        /// Experiment to inspect
        #[arg(short, long, env = EXPERIMENT_ID_ENV)]
        experiment: String,
    },

    /// Remove an experiment's shared state so its id can be reused
    Clear {
        /// Experiment to remove
        #[arg(short, long, env = EXPERIMENT_ID_ENV)]
        experiment: String,
    },

    /// Show NUMA nodes and their CPUs, for --numa-node and --cpu-cores
    Topology,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose, args.quiet);

    let code = match dispatch(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}

fn init_tracing(verbose: bool, quiet: bool) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let default = if quiet {
        "specer=warn"
    } else if verbose {
        "specer=debug"
    } else {
        "specer=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Run the selected command, returning the process exit status
async fn dispatch(args: Args) -> anyhow::Result<i32> {
    let sync_dir = args.sync_dir.clone().unwrap_or_else(default_sync_dir);

    match args.command {
        Command::Run {
            benchmarks,
            config,
            spec_root,
            tune,
            size,
            copies,
            threads,
            iterations,
            cores,
            speed,
            rate,
            reportable,
            noreportable,
            rebuild,
            ignore_errors,
            output_formats,
            numa_node,
            cpu_cores,
            no_numa_memory,
            dry_run,
            json,
            sync,
            experiment,
            client_id,
            start_timeout,
            stop_timeout,
        } => {
            let sync = if sync {
                let experiment_id = experiment.ok_or_else(|| {
                    anyhow::anyhow!(
                        "--sync requires an experiment: set {} or pass --experiment",
                        EXPERIMENT_ID_ENV
                    )
                })?;
                Some(SyncArgs {
                    experiment_id,
                    client_id: client_id.unwrap_or_else(default_client_id),
                    sync_dir,
                    start_timeout,
                    stop_timeout,
                })
            } else {
                None
            };

            let preference = match (speed, rate) {
                (true, _) => Some(Preference::Speed),
                (_, true) => Some(Preference::Rate),
                _ => None,
            };

            let run_args = RunArgs {
                benchmarks,
                preference,
                config,
                spec_root,
                tune,
                size,
                copies,
                threads,
                iterations,
                cores,
                reportable,
                noreportable,
                output_formats,
                rebuild,
                ignore_errors,
                affinity: Affinity {
                    numa_node,
                    cpu_cores,
                    bind_memory: !no_numa_memory,
                },
                dry_run,
                sync,
                quiet: args.quiet,
                show_output: args.verbose,
            };
            run(run_args, json).await
        }
        Command::Coordinate {
            experiment,
            expected_clients,
            start_timeout,
            run_timeout,
            keep_state,
        } => {
            let report = coordinate(CoordinateArgs {
                experiment_id: experiment,
                expected_clients,
                sync_dir,
                start_timeout,
                run_timeout,
                keep_state,
                quiet: args.quiet,
            })
            .await?;

            println!();
            println!("Experiment Summary");
            println!("==================");
            println!("Experiment: {}", report.experiment_id);
            println!("Clients started: {}", report.started_clients.len());
            println!("Clients withdrawn: {}", report.withdrawn_clients);
            println!(
                "Waited for registration: {:.2}s",
                report.wait_for_registration.as_secs_f64()
            );
            println!("Run duration: {:.2}s", report.run_duration.as_secs_f64());
            if report.stopped_early() {
                println!();
                println!("Stop was forced by the run timeout. Unfinished clients:");
                for client in &report.unfinished_clients {
                    println!("  {}", client);
                }
                return Ok(EXIT_FAILURE);
            }
            Ok(0)
        }
        Command::Signal { kind, experiment } => {
            let kind = SignalKind::from(kind);
            if runner::signal(kind, &experiment, sync_dir).await? {
                println!("Issued {} signal for '{}'", kind, experiment);
            } else {
                println!("{} signal for '{}' was already issued", kind, experiment);
            }
            Ok(0)
        }
        Command::Status { experiment } => {
            let snapshot = runner::status(&experiment, sync_dir).await?;
            if !snapshot.exists() {
                println!("Experiment '{}' has no registered clients", experiment);
                return Ok(0);
            }

            println!("Experiment: {}", snapshot.experiment_id);
            if let Some(created_at) = &snapshot.created_at {
                println!("Created: {}", created_at);
            }
            if let Some(controller) = &snapshot.controller {
                println!(
                    "Controller: {} since {} (expecting {} clients)",
                    controller.controller, controller.claimed_at, controller.expected_clients
                );
            }
            for signal in [&snapshot.start, &snapshot.stop].into_iter().flatten() {
                println!(
                    "Signal {}: issued {} by {}",
                    signal.kind, signal.issued_at, signal.issued_by
                );
            }
            println!("Clients ({}):", snapshot.clients.len());
            for client in &snapshot.clients {
                println!(
                    "  {:<24} {:<18} {}",
                    client.client_id,
                    client.state,
                    client.host.as_deref().unwrap_or("-")
                );
            }
            if !snapshot.withdrawn.is_empty() {
                println!("Withdrawn ({}):", snapshot.withdrawn.len());
                for withdrawal in &snapshot.withdrawn {
                    println!(
                        "  {:<24} last state {}",
                        withdrawal.client_id, withdrawal.last_state
                    );
                }
            }
            Ok(0)
        }
        Command::Clear { experiment } => {
            runner::clear(&experiment, sync_dir).await?;
            println!("Cleared experiment '{}'", experiment);
            Ok(0)
        }
        Command::Topology => {
            let Some(topology) = specer::suite::topology::detect().await else {
                eprintln!("NUMA topology not available: numactl is missing or reports no nodes");
                return Ok(EXIT_FAILURE);
            };

            println!("NUMA nodes: {}", topology.nodes.len());
            println!("Total CPUs: {}", topology.total_cpus());
            for node in &topology.nodes {
                let cpus = topology.cpus_of(*node);
                println!(
                    "  node {:<4} {:>4} CPUs  {}",
                    node,
                    cpus.len(),
                    format_cpu_list(cpus)
                );
            }
            if let Some(first) = topology.nodes.first() {
                println!();
                println!("Examples:");
                println!("  specer run gcc --numa-node {}", first);
                println!(
                    "  specer run gcc --cpu-cores {}",
                    format_cpu_list(topology.cpus_of(*first))
                );
            }
            Ok(0)
        }
    }
}

async fn run(args: RunArgs, json: Option<Option<PathBuf>>) -> anyhow::Result<i32> {
    let quiet = args.quiet;
    let dry_run = args.dry_run;
    let outcome = run_benchmark(args.clone()).await?;

    if dry_run {
        println!("Would execute: {}", outcome.command.join(" "));
        return Ok(0);
    }

    if !quiet || !outcome.succeeded() {
        println!();
        println!("Run Summary");
        println!("===========");
        println!("Command: {}", outcome.command.join(" "));
        if !outcome.benchmarks_seen.is_empty() {
            println!("Benchmarks: {}", outcome.benchmarks_seen.join(", "));
        }
        if let Some(wait) = outcome.timings.start_wait() {
            println!("Waited for start: {:.2}s", wait.as_secs_f64());
        }
        if let Some(benchmark) = outcome.timings.benchmark() {
            println!("Benchmark time: {:.2}s", benchmark.as_secs_f64());
        }
        if let Some(wait) = outcome.timings.stop_wait() {
            println!("Waited for stop: {:.2}s", wait.as_secs_f64());
        }
        println!("Total: {:.2}s", outcome.duration.as_secs_f64());

        let results = &outcome.results;
        for (name, score) in results.scores.iter().chain(&results.metrics) {
            println!("{}: {}", name, score);
        }
        for (name, result) in &results.benchmark_results {
            match (result.ratio, result.time) {
                (Some(ratio), Some(time)) => println!("  {}: ratio={}, time={}s", name, ratio, time),
                (Some(ratio), None) => println!("  {}: ratio={}", name, ratio),
                _ => {}
            }
        }
        if let Some(log_file) = &results.log_file {
            println!("Log: {}", log_file);
        }
    }

    if let Some(path) = json {
        let written = save_results(&args, &outcome, path).await?;
        println!("Results saved to: {}", written.display());
    }

    let code = outcome.exit_code.unwrap_or(0);
    let status = benchmark_exit_status(code);
    if status != code {
        eprintln!("runcpu exited with status {}, reported as {}", code, status);
    }
    Ok(status)
}

/// CLI utility functions for parsing command-line arguments
mod cli {
    use std::time::Duration;

    /// Parse human-readable durations like "30s", "5m", "1h", "250ms" or bare seconds
    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim().to_lowercase();
        if s.is_empty() {
            return Err("duration is empty".to_string());
        }

        let (number_part, unit_part) = match s.find(|c: char| !c.is_ascii_digit()) {
            Some(pos) => s.split_at(pos),
            None => (s.as_str(), "s"),
        };

        let number: u64 = number_part
            .parse()
            .map_err(|e| format!("invalid duration number '{}': {}", number_part, e))?;

        let seconds_per_unit = match unit_part.trim() {
            "ms" => return Ok(Duration::from_millis(number)),
            "s" => 1,
            "m" => 60,
            "h" => 3600,
            unit => {
                return Err(format!(
                    "invalid duration unit '{}'. Valid units: ms, s, m, h",
                    unit
                ));
            }
        };
        number
            .checked_mul(seconds_per_unit)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{}' is too large", s))
    }

}

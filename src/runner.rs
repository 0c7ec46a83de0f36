//! High-level runner API for specer.
//!
//! This module wires benchmark invocation and experiment coordination together
//! behind a small set of entry points used by the CLI:
//! - `run_benchmark` runs runcpu, optionally bracketed by the sync protocol
//! - `coordinate` acts as the controller of an experiment
//! - `signal`, `status` and `clear` inspect or drive an experiment by hand
//! - `save_results` writes a run's scores to a JSON report

use anyhow::{Context, Result, bail};
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{
    DEFAULT_DRAIN_TIMEOUT, DEFAULT_RUN_TIMEOUT, DEFAULT_START_TIMEOUT, DEFAULT_STOP_TIMEOUT,
    DEFAULT_SYNC_DIR_NAME,
};
use crate::coordination::{
    ClientHandle, Controller, ControllerConfigBuilder, ControllerReport, ExperimentCoordinator,
    ExperimentSnapshot, LocalSignalBoard, SignalKind,
};
use crate::error::EXIT_FAILURE;
use crate::suite::{
    self, Affinity, AffinityTool, OutputScanner, Preference, RunKind, RunResults,
    RuncpuOptionsBuilder,
};
use crate::telemetry::{ControllerEvent, Phase, PhaseTimings};

/// Peer synchronization settings of a benchmark run
#[derive(Debug, Clone)]
pub struct SyncArgs {
    pub experiment_id: String,
    pub client_id: String,
    pub sync_dir: PathBuf,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
}

impl SyncArgs {
    pub fn new(experiment_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            client_id: client_id.into(),
            sync_dir: default_sync_dir(),
            start_timeout: DEFAULT_START_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

/// Arguments for running SPEC CPU benchmarks
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    // Benchmark selection
    pub benchmarks: Vec<String>,
    /// Forces simple names to speed or rate, detected from the names otherwise
    pub preference: Option<Preference>,

    // runcpu configuration
    pub config: String,
    pub spec_root: Option<PathBuf>,
    pub tune: Option<String>,
    pub size: Option<String>,
    pub copies: Option<u32>,
    pub threads: Option<u32>,
    pub iterations: Option<u32>,
    /// Copies for rate runs, threads for speed runs
    pub cores: Option<u32>,
    pub reportable: bool,
    pub noreportable: bool,
    pub output_formats: Option<String>,
    pub rebuild: bool,
    pub ignore_errors: bool,

    // Placement
    pub affinity: Affinity,

    // Options
    pub dry_run: bool,
    pub sync: Option<SyncArgs>,
    pub quiet: bool,
    /// Echo runcpu output instead of only showing a spinner
    pub show_output: bool,
}

/// Result of a benchmark run
#[derive(Debug)]
pub struct RunOutcome {
    /// Full argv, including any affinity wrapper
    pub command: Vec<String>,
    /// Benchmark and suite names passed to runcpu
    pub benchmarks: Vec<String>,
    /// Exit status of runcpu, `None` for dry runs
    pub exit_code: Option<i32>,
    /// Benchmarks seen in runcpu output, in order of appearance
    pub benchmarks_seen: Vec<String>,
    /// Scores and result files runcpu reported
    pub results: RunResults,
    pub timings: PhaseTimings,
    pub duration: Duration,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code.is_none_or(|code| code == 0)
    }
}

/// Arguments for controlling an experiment
#[derive(Debug, Clone)]
pub struct CoordinateArgs {
    pub experiment_id: String,
    pub expected_clients: usize,
    pub sync_dir: PathBuf,
    pub start_timeout: Duration,
    pub run_timeout: Duration,
    /// Leave the experiment's state on the board after stop
    pub keep_state: bool,
    pub quiet: bool,
}

impl CoordinateArgs {
    pub fn new(experiment_id: impl Into<String>, expected_clients: usize) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            expected_clients,
            sync_dir: default_sync_dir(),
            start_timeout: DEFAULT_START_TIMEOUT,
            run_timeout: DEFAULT_RUN_TIMEOUT,
            keep_state: false,
            quiet: true,
        }
    }
}

/// Board directory used when none is configured
pub fn default_sync_dir() -> PathBuf {
    env::temp_dir().join(DEFAULT_SYNC_DIR_NAME)
}

/// Client id used when none is configured: the host name
pub fn default_client_id() -> String {
    hostname().unwrap_or_else(|| "localhost".to_string())
}

fn hostname() -> Option<String> {
    env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/proc/sys/kernel/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Build the full argv of a run from its arguments
///
/// Resolves simple benchmark names, applies `cores` and wraps the command with
/// the affinity tool when CPU or NUMA placement is requested.
pub fn plan_command(args: &RunArgs) -> Result<Vec<String>> {
    if args.benchmarks.is_empty() {
        bail!("No benchmarks given");
    }

    if args.reportable
        && !args
            .benchmarks
            .iter()
            .any(|b| suite::names::REPORTABLE_SUITES.contains(&b.to_lowercase().as_str()))
    {
        bail!(
            "--reportable requires a full benchmark suite ({}); use --noreportable for individual benchmarks",
            suite::names::REPORTABLE_SUITES.join(", ")
        );
    }

    let benchmarks = resolved_benchmarks(args);
    debug!("Resolved benchmarks: {}", benchmarks.join(" "));

    let mut copies = args.copies;
    let mut threads = args.threads;
    if let Some(cores) = args.cores {
        let kind = suite::classify(&benchmarks);
        if kind == RunKind::Mixed {
            warn!("Mixed rate and speed benchmarks: --cores={} used as both copies and threads", cores);
        }
        let split = suite::split_cores(cores, kind);
        copies = split.copies.or(copies);
        threads = split.threads.or(threads);
    }

    let mut builder = RuncpuOptionsBuilder::default();
    builder
        .benchmarks(benchmarks)
        .config(args.config.clone())
        .reportable(args.reportable)
        .noreportable(args.noreportable)
        .rebuild(args.rebuild)
        .ignore_errors(args.ignore_errors);
    if let Some(tune) = &args.tune {
        builder.tune(tune.clone());
    }
    if let Some(size) = &args.size {
        builder.size(size.clone());
    }
    if let Some(copies) = copies {
        builder.copies(copies);
    }
    if let Some(threads) = threads {
        builder.threads(threads);
    }
    if let Some(iterations) = args.iterations {
        builder.iterations(iterations);
    }
    if let Some(formats) = &args.output_formats {
        builder.output_formats(formats.clone());
    }
    let options = builder.build().context("Invalid runcpu options")?;

    let cmd = suite::build_runcpu_command(args.spec_root.as_deref(), &options)?;
    if args.affinity.is_empty() {
        return Ok(cmd);
    }
    suite::wrap_with_affinity(cmd, &args.affinity, AffinityTool::detect())
}

/// Benchmark names of a run as runcpu will receive them
pub fn resolved_benchmarks(args: &RunArgs) -> Vec<String> {
    let preference = args
        .preference
        .or_else(|| suite::detect_preference(&args.benchmarks))
        .unwrap_or_default();
    suite::resolve_benchmarks(&args.benchmarks, preference)
}

/// Fail early when the requested NUMA node does not exist on this host
async fn check_numa_placement(affinity: &Affinity) -> Result<()> {
    let Some(node) = affinity.numa_node else {
        return Ok(());
    };
    let topology = suite::topology::detect().await;
    let cpus = suite::check_numa_node(node, topology.as_ref())?;
    info!(
        "NUMA node {} validated (CPUs: {})",
        node,
        suite::format_cpu_list(cpus)
    );
    Ok(())
}

/// A registration held for the duration of one run
///
/// Every exit path must call `leave`, so peers and the controller see this
/// client go away instead of waiting for it.
struct SyncSession {
    coordinator: ExperimentCoordinator,
    handle: ClientHandle,
}

impl SyncSession {
    async fn join(sync: &SyncArgs) -> Result<Self> {
        let board = LocalSignalBoard::open(&sync.sync_dir).await?;
        let coordinator = ExperimentCoordinator::new(Arc::new(board))
            .with_issuer(sync.client_id.clone())
            .with_host(hostname());
        let handle = coordinator
            .register(&sync.experiment_id, &sync.client_id)
            .await?;
        Ok(Self {
            coordinator,
            handle,
        })
    }

    async fn leave(&self) {
        if let Err(e) = self.coordinator.deregister(&self.handle).await {
            warn!(
                "Failed to deregister '{}' from '{}': {}",
                self.handle.client_id, self.handle.experiment_id, e
            );
        }
    }

    /// Run a protocol step, releasing the registration if it fails
    async fn step<T>(&self, result: crate::error::Result<T>) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                self.leave().await;
                Err(e.into())
            }
        }
    }
}

/// Run SPEC CPU benchmarks with the specified arguments
///
/// With sync enabled the run is bracketed by the experiment protocol:
/// register, wait for start, run, wait for stop, deregister. Any failure of
/// the protocol is fatal and releases the registration first.
pub async fn run_benchmark(args: RunArgs) -> Result<RunOutcome> {
    check_numa_placement(&args.affinity).await?;
    let command = plan_command(&args)?;
    debug!("Built command: {}", command.join(" "));

    if args.dry_run {
        return Ok(RunOutcome {
            command,
            benchmarks: resolved_benchmarks(&args),
            exit_code: None,
            benchmarks_seen: Vec::new(),
            results: RunResults::new(),
            timings: PhaseTimings::new(),
            duration: Duration::ZERO,
        });
    }

    let started = Instant::now();
    let mut timings = PhaseTimings::new();

    let session = match &args.sync {
        Some(sync) => {
            let session = SyncSession::join(sync).await?;
            timings.mark(Phase::Registered);
            info!(
                "Ready in experiment '{}' as '{}', waiting for start signal",
                sync.experiment_id, sync.client_id
            );
            session
                .step(
                    session
                        .coordinator
                        .await_start(&session.handle, sync.start_timeout)
                        .await,
                )
                .await?;
            info!("Received start signal");
            Some(session)
        }
        None => None,
    };
    timings.mark(Phase::Started);

    let execution = execute(&command, args.quiet, args.show_output).await;
    timings.mark(Phase::BenchmarkFinished);

    let mut execution = match (execution, &session) {
        (Ok(execution), _) => execution,
        (Err(e), Some(session)) => {
            session.leave().await;
            return Err(e);
        }
        (Err(e), None) => return Err(e),
    };
    if execution.exit_code != 0 {
        warn!("runcpu exited with status {}", execution.exit_code);
    }
    execution
        .results
        .load_details(args.spec_root.as_deref())
        .await;

    if let (Some(session), Some(sync)) = (&session, &args.sync) {
        info!("Benchmark finished, waiting for stop signal");
        session
            .step(
                session
                    .coordinator
                    .await_stop(&session.handle, sync.stop_timeout)
                    .await,
            )
            .await?;
        info!("Received stop signal");
        session
            .coordinator
            .deregister(&session.handle)
            .await
            .context("Failed to deregister after stop")?;
        timings.mark(Phase::Stopped);
    }

    Ok(RunOutcome {
        command,
        benchmarks: resolved_benchmarks(&args),
        exit_code: Some(execution.exit_code),
        benchmarks_seen: execution.benchmarks_seen,
        results: execution.results,
        timings,
        duration: started.elapsed(),
    })
}

struct Execution {
    exit_code: i32,
    benchmarks_seen: Vec<String>,
    results: RunResults,
}

/// Spawn the benchmark command and follow its output until it exits
async fn execute(command: &[String], quiet: bool, show_output: bool) -> Result<Execution> {
    let (program, rest) = command.split_first().context("Empty benchmark command")?;

    let mut child = Command::new(program)
        .args(rest)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to start '{}'", program))?;

    let stdout = child
        .stdout
        .take()
        .context("Benchmark output was not captured")?;

    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("[{elapsed_precise}] {spinner} {msg}") {
            spinner.set_style(style);
        }
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner.set_message("Starting runcpu");
        spinner
    };

    let mut scanner = OutputScanner::new();
    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read benchmark output")?
    {
        if let Some(benchmark) = scanner.observe(&line) {
            debug!("Now running {}", benchmark);
            spinner.set_message(format!("Running {}", benchmark));
        }
        if show_output {
            spinner.suspend(|| println!("{}", line));
        }
    }

    let status = child
        .wait()
        .await
        .context("Failed to wait for benchmark process")?;
    spinner.finish_and_clear();

    let (benchmarks_seen, results) = scanner.into_parts();
    Ok(Execution {
        exit_code: status.code().unwrap_or(EXIT_FAILURE),
        benchmarks_seen,
        results,
    })
}

/// Act as the controller of an experiment until stop is issued
pub async fn coordinate(args: CoordinateArgs) -> Result<ControllerReport> {
    let board = LocalSignalBoard::open(&args.sync_dir).await?;
    let coordinator = ExperimentCoordinator::new(Arc::new(board))
        .with_issuer(format!("controller@{}", default_client_id()));

    let config = ControllerConfigBuilder::default()
        .experiment_id(args.experiment_id.clone())
        .expected_clients(args.expected_clients)
        .start_timeout(args.start_timeout)
        .run_timeout(args.run_timeout)
        .teardown(!args.keep_state)
        .drain_timeout(DEFAULT_DRAIN_TIMEOUT)
        .build()
        .context("Invalid controller configuration")?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let progress = (!args.quiet).then(|| spawn_progress(events_rx));

    let controller = Controller::new(Arc::new(coordinator), config).with_events(events_tx);
    let report = controller.run().await;

    // Closing the channel ends the progress task
    drop(controller);
    if let Some(progress) = progress {
        if let Err(e) = progress.await {
            debug!("Progress display ended abnormally: {}", e);
        }
    }

    Ok(report?)
}

fn spawn_progress(
    mut events: mpsc::UnboundedReceiver<ControllerEvent>,
) -> tokio::task::JoinHandle<()> {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("[{elapsed_precise}] {spinner} {msg}") {
        bar.set_style(style);
    }
    bar.enable_steady_tick(Duration::from_millis(120));
    bar.set_message("Waiting for clients");

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ControllerEvent::Registered {
                    registered,
                    expected,
                } => bar.set_message(format!("Registered: {}/{}", registered, expected)),
                ControllerEvent::StartIssued { clients } => {
                    bar.println(format!("Start issued to {} client(s)", clients));
                    bar.set_message("Running");
                }
                ControllerEvent::Finished { finished, present } => {
                    bar.set_message(format!("Finished: {}/{}", finished, present))
                }
                ControllerEvent::StopIssued { unfinished } => {
                    bar.println(format!("Stop issued ({} unfinished)", unfinished));
                }
            }
        }
        bar.finish_and_clear();
    })
}

/// Issue a start or stop signal by hand
///
/// Returns false when the signal had already been issued.
pub async fn signal(kind: SignalKind, experiment_id: &str, sync_dir: PathBuf) -> Result<bool> {
    let board = LocalSignalBoard::open(sync_dir).await?;
    let coordinator = ExperimentCoordinator::new(Arc::new(board))
        .with_issuer(format!("manual@{}", default_client_id()));

    let issued = match kind {
        SignalKind::Start => coordinator.signal_start(experiment_id).await?,
        SignalKind::Stop => coordinator.signal_stop(experiment_id).await?,
    };
    Ok(issued)
}

/// Remove an experiment's shared state so its id can be used again
pub async fn clear(experiment_id: &str, sync_dir: PathBuf) -> Result<()> {
    let board = LocalSignalBoard::open(sync_dir).await?;
    let coordinator = ExperimentCoordinator::new(Arc::new(board));
    coordinator.teardown(experiment_id).await?;
    info!("Cleared experiment '{}'", experiment_id);
    Ok(())
}

/// Read the shared state of an experiment
pub async fn status(experiment_id: &str, sync_dir: PathBuf) -> Result<ExperimentSnapshot> {
    let board = LocalSignalBoard::open(sync_dir).await?;
    let coordinator = ExperimentCoordinator::new(Arc::new(board));
    Ok(coordinator.snapshot(experiment_id).await?)
}

/// Configuration file recorded in a results report
#[derive(Debug, Serialize)]
pub struct ConfigSnapshot {
    pub path: String,
    /// Empty when the file could not be read
    pub contents: String,
}

#[derive(Debug, Serialize)]
pub struct ReportMetadata {
    pub timestamp: String, // ISO 8601
    pub specer_version: &'static str,
    pub benchmarks: Vec<String>,
    pub config: ConfigSnapshot,
}

#[derive(Debug, Serialize)]
struct ReportResults<'a> {
    #[serde(flatten)]
    results: &'a RunResults,
    /// Seconds from start to the end of the run
    execution_time: f64,
}

#[derive(Debug, Serialize)]
struct ResultsReport<'a> {
    metadata: ReportMetadata,
    results: ReportResults<'a>,
}

/// File name used when no report path is given
pub fn default_results_path() -> PathBuf {
    PathBuf::from(format!(
        "specer_results_{}.json",
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}

/// Read the runcpu configuration, looked up as given or under `config/`
async fn snapshot_config(config: &str, spec_root: Option<&Path>) -> ConfigSnapshot {
    let mut candidates = vec![PathBuf::from(config)];
    if let Some(root) = spec_root {
        candidates.push(root.join("config").join(config));
    }

    for candidate in candidates {
        match tokio::fs::read_to_string(&candidate).await {
            Ok(contents) => {
                return ConfigSnapshot {
                    path: candidate.display().to_string(),
                    contents,
                };
            }
            Err(e) => debug!("Config not readable at {}: {}", candidate.display(), e),
        }
    }

    ConfigSnapshot {
        path: config.to_string(),
        contents: String::new(),
    }
}

/// Write a run's metadata and results as JSON, returning the file written
pub async fn save_results(
    args: &RunArgs,
    outcome: &RunOutcome,
    path: Option<PathBuf>,
) -> Result<PathBuf> {
    let path = path.unwrap_or_else(default_results_path);

    let report = ResultsReport {
        metadata: ReportMetadata {
            timestamp: Local::now().to_rfc3339(),
            specer_version: env!("CARGO_PKG_VERSION"),
            benchmarks: outcome.benchmarks.clone(),
            config: snapshot_config(&args.config, args.spec_root.as_deref()).await,
        },
        results: ReportResults {
            results: &outcome.results,
            execution_time: outcome.duration.as_secs_f64(),
        },
    };

    let json = serde_json::to_string_pretty(&report).context("Failed to serialize results")?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("Failed to write results to {}", path.display()))?;
    info!("Results saved to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(benchmarks: &[&str]) -> RunArgs {
        RunArgs {
            benchmarks: benchmarks.iter().map(|s| s.to_string()).collect(),
            config: "test.cfg".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_plan_resolves_names_and_cores() {
        let mut run = args(&["lbm", "519.lbm_r"]);
        run.cores = Some(16);
        let cmd = plan_command(&run).unwrap();

        assert!(cmd.ends_with(&["519.lbm_r".to_string(), "519.lbm_r".to_string()]));
        let copies = cmd.iter().position(|a| a == "--copies").unwrap();
        assert_eq!(cmd[copies + 1], "16");
        assert!(!cmd.iter().any(|a| a == "--threads"));
    }

    #[test]
    fn test_plan_explicit_preference_wins() {
        let mut run = args(&["gcc", "intspeed"]);
        run.preference = Some(Preference::Rate);
        let cmd = plan_command(&run).unwrap();
        assert!(cmd.contains(&"502.gcc_r".to_string()));
    }

    #[test]
    fn test_plan_cores_does_not_drop_explicit_threads() {
        let mut run = args(&["519.lbm_r"]);
        run.cores = Some(4);
        run.threads = Some(2);
        let cmd = plan_command(&run).unwrap();
        let threads = cmd.iter().position(|a| a == "--threads").unwrap();
        assert_eq!(cmd[threads + 1], "2");
    }

    #[test]
    fn test_plan_reportable_requires_suite() {
        let mut run = args(&["gcc"]);
        run.reportable = true;
        let err = plan_command(&run).unwrap_err();
        assert!(err.to_string().contains("--reportable requires"));

        let mut run = args(&["intrate"]);
        run.reportable = true;
        assert!(plan_command(&run).unwrap().contains(&"--reportable".to_string()));
    }

    #[test]
    fn test_plan_rejects_empty_benchmarks() {
        assert!(plan_command(&args(&[])).is_err());
    }

    #[tokio::test]
    async fn test_dry_run_does_not_execute() {
        let mut run = args(&["gcc"]);
        run.dry_run = true;
        run.spec_root = Some(PathBuf::from("/nonexistent/spec"));
        assert!(run_benchmark(run.clone()).await.is_err());

        run.spec_root = None;
        let outcome = run_benchmark(run).await.unwrap();
        assert_eq!(outcome.exit_code, None);
        assert!(outcome.succeeded());
        assert_eq!(outcome.command[0], "runcpu");
    }

    #[test]
    fn test_default_client_id_is_not_empty() {
        assert!(!default_client_id().is_empty());
    }

    #[tokio::test]
    async fn test_numa_node_checked_before_dry_run() {
        let mut run = args(&["gcc"]);
        run.dry_run = true;
        // No host has this many NUMA nodes, and hosts without numactl fail too
        run.affinity.numa_node = Some(4096);
        let err = run_benchmark(run).await.unwrap_err();
        assert!(err.to_string().contains("NUMA"));
    }

    #[tokio::test]
    async fn test_save_results_report() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = dir.path().join("test.cfg");
        std::fs::write(&config, "tune = base\n").unwrap();

        let mut run = args(&["lbm"]);
        run.config = config.display().to_string();

        let mut results = RunResults::new();
        results.observe("Est. SPECrate2017_fp_base = 12.5");
        let outcome = RunOutcome {
            command: vec!["runcpu".to_string()],
            benchmarks: vec!["619.lbm_s".to_string()],
            exit_code: Some(0),
            benchmarks_seen: vec!["619.lbm_s".to_string()],
            results,
            timings: PhaseTimings::new(),
            duration: Duration::from_millis(1500),
        };

        let target = dir.path().join("report.json");
        let written = save_results(&run, &outcome, Some(target.clone()))
            .await
            .unwrap();
        assert_eq!(written, target);

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(report["metadata"]["specer_version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(report["metadata"]["benchmarks"][0], "619.lbm_s");
        assert_eq!(report["metadata"]["config"]["contents"], "tune = base\n");
        assert_eq!(report["results"]["scores"]["SPECrate2017_fp_base"], 12.5);
        assert_eq!(report["results"]["execution_time"], 1.5);
    }

    #[test]
    fn test_default_results_path() {
        let name = default_results_path().display().to_string();
        assert!(name.starts_with("specer_results_"));
        assert!(name.ends_with(".json"));
    }
}

use std::sync::Arc;
use std::time::Duration;

use derive_builder::Builder;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

use super::backoff::{Backoff, Deadline};
use super::coordinator::{ExperimentCoordinator, ExperimentSnapshot};
use super::records::ClientState;
use crate::config::{DEFAULT_DRAIN_TIMEOUT, DEFAULT_RUN_TIMEOUT, DEFAULT_START_TIMEOUT};
use crate::error::{Result, SyncError};
use crate::telemetry::ControllerEvent;

/// Configuration of the controller role for one experiment
#[derive(Debug, Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct ControllerConfig {
    #[builder(setter(into))]
    pub experiment_id: String,
    /// Number of clients that must register before the run starts
    pub expected_clients: usize,
    /// How long to wait for the expected clients to register
    #[builder(default = "DEFAULT_START_TIMEOUT")]
    pub start_timeout: Duration,
    /// How long to wait for every client to finish once started
    #[builder(default = "DEFAULT_RUN_TIMEOUT")]
    pub run_timeout: Duration,
    /// Remove the experiment's shared state once stop has been issued, or
    /// once the run failed
    #[builder(default = "false")]
    pub teardown: bool,
    /// How long clients get to observe stop and leave before teardown
    #[builder(default = "DEFAULT_DRAIN_TIMEOUT")]
    pub drain_timeout: Duration,
}

impl ControllerConfigBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.expected_clients == Some(0) {
            return Err("expected_clients must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Outcome of a controlled run
#[derive(Debug, Clone)]
pub struct ControllerReport {
    pub experiment_id: String,
    /// Clients present when start was issued
    pub started_clients: Vec<String>,
    /// Clients that had not signaled stop readiness when stop was issued
    pub unfinished_clients: Vec<String>,
    pub withdrawn_clients: usize,
    pub wait_for_registration: Duration,
    pub run_duration: Duration,
}

impl ControllerReport {
    /// True when stop was forced by the run timeout
    pub fn stopped_early(&self) -> bool {
        !self.unfinished_clients.is_empty()
    }
}

/// Decides when to issue the start and stop signals of an experiment
///
/// Start is issued once the expected number of clients, minus those that
/// withdrew, is registered. Stop is issued once every present client is
/// waiting for it, or when the run timeout forces the run to end.
///
/// An experiment is controlled at most once; state left by an earlier
/// controller or signal makes `run` fail with `StaleExperiment`.
pub struct Controller {
    coordinator: Arc<ExperimentCoordinator>,
    config: ControllerConfig,
    events: Option<mpsc::UnboundedSender<ControllerEvent>>,
}

impl Controller {
    pub fn new(coordinator: Arc<ExperimentCoordinator>, config: ControllerConfig) -> Self {
        Self {
            coordinator,
            config,
            events: None,
        }
    }

    /// Send progress events to a listener
    pub fn with_events(mut self, events: mpsc::UnboundedSender<ControllerEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Run the experiment from registration to stop
    pub async fn run(&self) -> Result<ControllerReport> {
        let experiment_id = &self.config.experiment_id;
        info!(
            "Controlling experiment '{}': expecting {} client(s)",
            experiment_id, self.config.expected_clients
        );

        self.coordinator
            .claim_controller(experiment_id, self.config.expected_clients)
            .await?;

        match self.control().await {
            Ok(report) => Ok(report),
            Err(e) => {
                if self.config.teardown {
                    warn!(
                        "Controlling '{}' failed, removing its shared state: {}",
                        experiment_id, e
                    );
                    if let Err(teardown_err) = self.coordinator.teardown(experiment_id).await {
                        warn!(
                            "Failed to tear down experiment '{}': {}",
                            experiment_id, teardown_err
                        );
                    }
                }
                Err(e)
            }
        }
    }

    async fn control(&self) -> Result<ControllerReport> {
        let experiment_id = &self.config.experiment_id;

        // 1. Wait for registrations
        let registration_started = Instant::now();
        let snapshot = self.wait_for_registrations().await?;
        let wait_for_registration = registration_started.elapsed();

        let started_clients: Vec<String> = snapshot
            .clients
            .iter()
            .map(|c| c.client_id.clone())
            .collect();

        // 2. Start
        self.coordinator.signal_start(experiment_id).await?;
        self.emit(ControllerEvent::StartIssued {
            clients: started_clients.len(),
        });

        // 3. Wait for every client to finish, or give up at the run timeout
        let run_started = Instant::now();
        let snapshot = self.wait_for_finish().await?;
        let run_duration = run_started.elapsed();

        let unfinished_clients = snapshot.unfinished_clients();
        if !unfinished_clients.is_empty() {
            warn!(
                "Run timeout reached in '{}', stopping with unfinished clients: {}",
                experiment_id,
                unfinished_clients.join(", ")
            );
        }

        // 4. Stop
        self.coordinator.signal_stop(experiment_id).await?;
        self.emit(ControllerEvent::StopIssued {
            unfinished: unfinished_clients.len(),
        });

        if self.config.teardown {
            self.drain().await?;
            self.coordinator.teardown(experiment_id).await?;
        }

        Ok(ControllerReport {
            experiment_id: experiment_id.clone(),
            started_clients,
            unfinished_clients,
            withdrawn_clients: snapshot.withdrawn_count(),
            wait_for_registration,
            run_duration,
        })
    }

    /// Poll until enough clients are registered
    async fn wait_for_registrations(&self) -> Result<ExperimentSnapshot> {
        let experiment_id = &self.config.experiment_id;
        let deadline = Deadline::after(self.config.start_timeout);
        let mut backoff = Backoff::default();
        let mut last_registered = usize::MAX;

        loop {
            let snapshot = self.coordinator.snapshot(experiment_id).await?;
            let registered = snapshot.clients.len();
            let expected = self
                .config
                .expected_clients
                .saturating_sub(snapshot.withdrawn_count());

            if registered != last_registered {
                info!(
                    "Experiment '{}': {}/{} client(s) registered",
                    experiment_id, registered, expected
                );
                self.emit(ControllerEvent::Registered {
                    registered,
                    expected,
                });
                last_registered = registered;
                backoff.reset();
            }

            if expected == 0 {
                // Everyone withdrew; nothing left to start
                return Err(SyncError::TimedOut {
                    experiment_id: experiment_id.clone(),
                    waiting_for: "client registration".to_string(),
                    elapsed: deadline.elapsed(),
                });
            }
            if registered >= expected {
                return Ok(snapshot);
            }

            if deadline.expired() {
                return Err(SyncError::TimedOut {
                    experiment_id: experiment_id.clone(),
                    waiting_for: "client registration".to_string(),
                    elapsed: deadline.elapsed(),
                });
            }
            tokio::time::sleep(deadline.cap(backoff.next_delay())).await;
        }
    }

    /// Poll until every present client is waiting for stop, or the run timeout
    async fn wait_for_finish(&self) -> Result<ExperimentSnapshot> {
        let experiment_id = &self.config.experiment_id;
        let deadline = Deadline::after(self.config.run_timeout);
        let mut backoff = Backoff::default();
        let mut last_finished = usize::MAX;

        loop {
            let snapshot = self.coordinator.snapshot(experiment_id).await?;
            let finished = snapshot
                .clients
                .iter()
                .filter(|c| c.state.is_finished())
                .count();

            if finished != last_finished {
                self.emit(ControllerEvent::Finished {
                    finished,
                    present: snapshot.clients.len(),
                });
                last_finished = finished;
                backoff.reset();
            }

            if snapshot.all_finished() || deadline.expired() {
                return Ok(snapshot);
            }
            tokio::time::sleep(deadline.cap(backoff.next_delay())).await;
        }
    }

    /// Give clients time to observe stop before their state disappears
    async fn drain(&self) -> Result<()> {
        let experiment_id = &self.config.experiment_id;
        let deadline = Deadline::after(self.config.drain_timeout);
        let mut backoff = Backoff::default();

        loop {
            let snapshot = self.coordinator.snapshot(experiment_id).await?;
            let lingering = snapshot
                .clients
                .iter()
                .filter(|c| c.state != ClientState::Done)
                .count();
            if lingering == 0 {
                return Ok(());
            }

            if deadline.expired() {
                warn!(
                    "{} client(s) of '{}' did not acknowledge stop before teardown",
                    lingering, experiment_id
                );
                return Ok(());
            }
            tokio::time::sleep(deadline.cap(backoff.next_delay())).await;
        }
    }

    fn emit(&self, event: ControllerEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::backoff::Backoff;
use super::board::SignalBoard;
use super::records::{
    self, CLIENTS_PREFIX, CONTROLLER_KEY, ClientRecord, ClientState, ControllerRecord,
    EXPERIMENT_KEY, ExperimentRecord, SignalKind, SignalRecord, WITHDRAWN_PREFIX,
    WithdrawalRecord,
};
use crate::error::{Result, SyncError};

/// Proof of a live registration, returned by `register`
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub experiment_id: String,
    pub client_id: String,
    token: Uuid,
}

impl ClientHandle {
    pub fn token(&self) -> Uuid {
        self.token
    }
}

/// Point-in-time view of an experiment's shared state
#[derive(Debug, Clone, Default)]
pub struct ExperimentSnapshot {
    pub experiment_id: String,
    pub created_at: Option<String>,
    pub controller: Option<ControllerRecord>,
    pub clients: Vec<ClientRecord>,
    pub withdrawn: Vec<WithdrawalRecord>,
    pub start: Option<SignalRecord>,
    pub stop: Option<SignalRecord>,
}

impl ExperimentSnapshot {
    /// Whether any client ever created the experiment
    pub fn exists(&self) -> bool {
        self.created_at.is_some()
    }

    /// Number of withdrawn clients that have not registered again
    pub fn withdrawn_count(&self) -> usize {
        let present: HashSet<&str> = self.clients.iter().map(|c| c.client_id.as_str()).collect();
        self.withdrawn
            .iter()
            .filter(|w| !present.contains(w.client_id.as_str()))
            .count()
    }

    /// Present clients that have not yet signaled stop readiness
    pub fn unfinished_clients(&self) -> Vec<String> {
        self.clients
            .iter()
            .filter(|c| !c.state.is_finished())
            .map(|c| c.client_id.clone())
            .collect()
    }

    pub fn all_finished(&self) -> bool {
        self.clients.iter().all(|c| c.state.is_finished())
    }
}

/// Rendezvous protocol between the clients of an experiment
///
/// All state lives on the signal board, so coordinators in different processes
/// sharing the same board see each other's registrations and signals.
pub struct ExperimentCoordinator {
    board: Arc<dyn SignalBoard>,
    backoff: Backoff,
    issuer: String,
    host: Option<String>,
}

impl ExperimentCoordinator {
    /// Create a new ExperimentCoordinator over a signal board
    pub fn new(board: Arc<dyn SignalBoard>) -> Self {
        Self {
            board,
            backoff: Backoff::default(),
            issuer: "specer".to_string(),
            host: None,
        }
    }

    /// Poll schedule used by every blocking wait
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Name recorded as the issuer of signals
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// Host name recorded in client registrations
    pub fn with_host(mut self, host: Option<String>) -> Self {
        self.host = host;
        self
    }

    pub fn board(&self) -> &Arc<dyn SignalBoard> {
        &self.board
    }

    /// Register a client, creating the experiment if this is its first client
    ///
    /// Fails with `DuplicateClient` while another registration of the same
    /// client id is active.
    pub async fn register(&self, experiment_id: &str, client_id: &str) -> Result<ClientHandle> {
        records::validate_identifier(experiment_id)?;
        records::validate_identifier(client_id)?;

        let now = Utc::now().to_rfc3339();
        self.create_experiment(experiment_id, &now).await?;

        let token = Uuid::new_v4();
        let key = records::client_key(client_id);
        let record = ClientRecord {
            client_id: client_id.to_string(),
            token,
            state: ClientState::Registered,
            registered_at: now.clone(),
            updated_at: now,
            host: self.host.clone(),
        };

        let claimed = self
            .board
            .try_create(experiment_id, &key, &records::encode(&key, &record)?)
            .await?;
        if !claimed {
            return Err(SyncError::DuplicateClient {
                experiment_id: experiment_id.to_string(),
                client_id: client_id.to_string(),
            });
        }

        // A client coming back after leaving is expected again
        self.board
            .remove(experiment_id, &records::withdrawn_key(client_id))
            .await?;

        info!(
            "Registered client '{}' in experiment '{}'",
            client_id, experiment_id
        );

        Ok(ClientHandle {
            experiment_id: experiment_id.to_string(),
            client_id: client_id.to_string(),
            token,
        })
    }

    /// Claim the experiment for a controller, creating it if needed
    ///
    /// Only one controller may ever drive an experiment. Fails with
    /// `StaleExperiment` if another controller claimed it before or if a
    /// signal was already issued, since the registrations and withdrawals on
    /// the board may then belong to an earlier run.
    pub async fn claim_controller(&self, experiment_id: &str, expected_clients: usize) -> Result<()> {
        records::validate_identifier(experiment_id)?;

        let now = Utc::now().to_rfc3339();
        self.create_experiment(experiment_id, &now).await?;

        for kind in [SignalKind::Start, SignalKind::Stop] {
            if let Some(signal) = self.read_signal(experiment_id, kind).await? {
                return Err(SyncError::StaleExperiment {
                    experiment_id: experiment_id.to_string(),
                    reason: format!(
                        "{} signal issued by '{}' at {}",
                        kind, signal.issued_by, signal.issued_at
                    ),
                });
            }
        }

        let record = ControllerRecord {
            controller: self.issuer.clone(),
            claimed_at: now,
            expected_clients,
            host: self.host.clone(),
        };
        let claimed = self
            .board
            .try_create(
                experiment_id,
                CONTROLLER_KEY,
                &records::encode(CONTROLLER_KEY, &record)?,
            )
            .await?;
        if !claimed {
            let reason = match self.read_controller(experiment_id).await? {
                Some(other) => format!(
                    "claimed by controller '{}' at {}",
                    other.controller, other.claimed_at
                ),
                None => "claimed by another controller".to_string(),
            };
            return Err(SyncError::StaleExperiment {
                experiment_id: experiment_id.to_string(),
                reason,
            });
        }

        info!(
            "Controller claimed experiment '{}' expecting {} clients",
            experiment_id, expected_clients
        );
        Ok(())
    }

    /// Block until the start signal is observed or the timeout elapses
    pub async fn await_start(&self, handle: &ClientHandle, timeout: Duration) -> Result<()> {
        self.await_signal(
            handle,
            SignalKind::Start,
            ClientState::WaitingForStart,
            ClientState::Running,
            timeout,
        )
        .await
    }

    /// Signal stop readiness, then block until the stop signal is observed or
    /// the timeout elapses
    pub async fn await_stop(&self, handle: &ClientHandle, timeout: Duration) -> Result<()> {
        self.await_signal(
            handle,
            SignalKind::Stop,
            ClientState::WaitingForStop,
            ClientState::Done,
            timeout,
        )
        .await
    }

    /// Broadcast the start signal to every client of the experiment
    ///
    /// Returns false if the signal had already been issued.
    pub async fn signal_start(&self, experiment_id: &str) -> Result<bool> {
        self.signal(experiment_id, SignalKind::Start).await
    }

    /// Broadcast the stop signal to every client of the experiment
    ///
    /// Returns false if the signal had already been issued.
    pub async fn signal_stop(&self, experiment_id: &str) -> Result<bool> {
        self.signal(experiment_id, SignalKind::Stop).await
    }

    /// Release a registration; releasing twice is not an error
    ///
    /// A client leaving before it is done is recorded as withdrawn so the
    /// controller stops expecting it. The last client to leave after the stop
    /// signal tears the experiment down.
    pub async fn deregister(&self, handle: &ClientHandle) -> Result<()> {
        let key = records::client_key(&handle.client_id);

        let Some(record) = self.read_client(&handle.experiment_id, &key).await? else {
            debug!(
                "Client '{}' already deregistered from '{}'",
                handle.client_id, handle.experiment_id
            );
            return Ok(());
        };

        if record.token != handle.token {
            // The id was released and claimed again by a newer registration
            debug!(
                "Registration of '{}' in '{}' belongs to another process, leaving it",
                handle.client_id, handle.experiment_id
            );
            return Ok(());
        }

        self.board.remove(&handle.experiment_id, &key).await?;

        if record.state != ClientState::Done {
            let withdrawal = WithdrawalRecord {
                client_id: handle.client_id.clone(),
                withdrawn_at: Utc::now().to_rfc3339(),
                last_state: record.state,
            };
            let withdrawn_key = records::withdrawn_key(&handle.client_id);
            let marked = self
                .board
                .set(
                    &handle.experiment_id,
                    &withdrawn_key,
                    &records::encode(&withdrawn_key, &withdrawal)?,
                )
                .await;
            match marked {
                Ok(()) => {}
                // Torn down underneath us, nobody is left to expect this client
                Err(SyncError::ExperimentNotFound { .. }) => {
                    debug!(
                        "Experiment '{}' is gone, not recording withdrawal of '{}'",
                        handle.experiment_id, handle.client_id
                    );
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
            warn!(
                "Client '{}' withdrew from experiment '{}' while {}",
                handle.client_id, handle.experiment_id, record.state
            );
        } else {
            info!(
                "Deregistered client '{}' from experiment '{}'",
                handle.client_id, handle.experiment_id
            );
        }

        let remaining = self
            .board
            .list(&handle.experiment_id, CLIENTS_PREFIX)
            .await?;
        let stopped = self
            .board
            .get(&handle.experiment_id, SignalKind::Stop.key())
            .await?
            .is_some();
        if remaining.is_empty() && stopped {
            info!(
                "Last client left experiment '{}', tearing it down",
                handle.experiment_id
            );
            self.teardown(&handle.experiment_id).await?;
        }

        Ok(())
    }

    /// Read the whole shared state of an experiment
    pub async fn snapshot(&self, experiment_id: &str) -> Result<ExperimentSnapshot> {
        records::validate_identifier(experiment_id)?;

        let created_at = match self.board.get(experiment_id, EXPERIMENT_KEY).await? {
            Some(raw) => {
                let record: ExperimentRecord = records::decode(EXPERIMENT_KEY, &raw)?;
                Some(record.created_at)
            }
            None => None,
        };

        let mut clients = Vec::new();
        for client_id in self.board.list(experiment_id, CLIENTS_PREFIX).await? {
            let key = records::client_key(&client_id);
            // A client may leave between listing and reading
            if let Some(record) = self.read_client(experiment_id, &key).await? {
                clients.push(record);
            }
        }

        let mut withdrawn = Vec::new();
        for client_id in self.board.list(experiment_id, WITHDRAWN_PREFIX).await? {
            let key = records::withdrawn_key(&client_id);
            if let Some(raw) = self.board.get(experiment_id, &key).await? {
                withdrawn.push(records::decode(&key, &raw)?);
            }
        }

        Ok(ExperimentSnapshot {
            experiment_id: experiment_id.to_string(),
            created_at,
            controller: self.read_controller(experiment_id).await?,
            clients,
            withdrawn,
            start: self.read_signal(experiment_id, SignalKind::Start).await?,
            stop: self.read_signal(experiment_id, SignalKind::Stop).await?,
        })
    }

    /// Remove all shared state of an experiment
    pub async fn teardown(&self, experiment_id: &str) -> Result<()> {
        records::validate_identifier(experiment_id)?;
        self.board.clear(experiment_id).await?;
        debug!("Experiment '{}' removed from the board", experiment_id);
        Ok(())
    }

    async fn signal(&self, experiment_id: &str, kind: SignalKind) -> Result<bool> {
        records::validate_identifier(experiment_id)?;
        self.ensure_experiment(experiment_id).await?;

        let record = SignalRecord {
            kind,
            issued_at: Utc::now().to_rfc3339(),
            issued_by: self.issuer.clone(),
        };
        let issued = self
            .board
            .try_create(
                experiment_id,
                kind.key(),
                &records::encode(kind.key(), &record)?,
            )
            .await?;

        if issued {
            info!("Issued {} signal for experiment '{}'", kind, experiment_id);
        } else {
            debug!(
                "{} signal for experiment '{}' was already issued",
                kind, experiment_id
            );
        }
        Ok(issued)
    }

    async fn await_signal(
        &self,
        handle: &ClientHandle,
        kind: SignalKind,
        waiting: ClientState,
        observed: ClientState,
        timeout: Duration,
    ) -> Result<()> {
        self.ensure_experiment(&handle.experiment_id).await?;
        self.update_state(handle, waiting).await?;

        info!(
            "Client '{}' waiting for {} signal (timeout {:.0}s)",
            handle.client_id,
            kind,
            timeout.as_secs_f64()
        );

        let raw = self
            .board
            .wait(&handle.experiment_id, kind.key(), timeout, self.backoff.clone())
            .await
            .map_err(|e| match e {
                SyncError::TimedOut {
                    experiment_id,
                    elapsed,
                    ..
                } => SyncError::TimedOut {
                    experiment_id,
                    waiting_for: kind.to_string(),
                    elapsed,
                },
                other => other,
            })?;
        let signal: SignalRecord = records::decode(kind.key(), &raw)?;

        // The signal was seen; a teardown racing the state update does not
        // change that
        match self.update_state(handle, observed).await {
            Ok(()) => {}
            Err(SyncError::ExperimentNotFound { .. } | SyncError::NotRegistered { .. }) => {
                debug!(
                    "Registration of '{}' in '{}' is gone, state not updated to {}",
                    handle.client_id, handle.experiment_id, observed
                );
            }
            Err(e) => return Err(e),
        }

        info!(
            "Client '{}' observed {} signal issued by '{}' at {}",
            handle.client_id, kind, signal.issued_by, signal.issued_at
        );
        Ok(())
    }

    /// Rewrite the client's own record with a new state
    ///
    /// Only the owning client writes its record, so a plain overwrite cannot
    /// lose another process's update.
    async fn update_state(&self, handle: &ClientHandle, state: ClientState) -> Result<()> {
        let key = records::client_key(&handle.client_id);

        let mut record = match self.read_client(&handle.experiment_id, &key).await? {
            Some(record) if record.token == handle.token => record,
            _ => {
                return Err(SyncError::NotRegistered {
                    experiment_id: handle.experiment_id.clone(),
                    client_id: handle.client_id.clone(),
                });
            }
        };

        record.state = state;
        record.updated_at = Utc::now().to_rfc3339();
        self.board
            .set(
                &handle.experiment_id,
                &key,
                &records::encode(&key, &record)?,
            )
            .await?;

        debug!("Client '{}' is now {}", handle.client_id, state);
        Ok(())
    }

    async fn create_experiment(&self, experiment_id: &str, now: &str) -> Result<()> {
        let experiment = ExperimentRecord {
            experiment_id: experiment_id.to_string(),
            created_at: now.to_string(),
        };
        let created = self
            .board
            .try_create(
                experiment_id,
                EXPERIMENT_KEY,
                &records::encode(EXPERIMENT_KEY, &experiment)?,
            )
            .await?;
        if created {
            info!(
                "Created experiment '{}' on {}",
                experiment_id,
                self.board.describe()
            );
        }
        Ok(())
    }

    async fn ensure_experiment(&self, experiment_id: &str) -> Result<()> {
        if self.board.get(experiment_id, EXPERIMENT_KEY).await?.is_none() {
            return Err(SyncError::ExperimentNotFound {
                experiment_id: experiment_id.to_string(),
            });
        }
        Ok(())
    }

    async fn read_client(&self, experiment_id: &str, key: &str) -> Result<Option<ClientRecord>> {
        match self.board.get(experiment_id, key).await? {
            Some(raw) => Ok(Some(records::decode(key, &raw)?)),
            None => Ok(None),
        }
    }

    async fn read_controller(&self, experiment_id: &str) -> Result<Option<ControllerRecord>> {
        match self.board.get(experiment_id, CONTROLLER_KEY).await? {
            Some(raw) => Ok(Some(records::decode(CONTROLLER_KEY, &raw)?)),
            None => Ok(None),
        }
    }

    async fn read_signal(
        &self,
        experiment_id: &str,
        kind: SignalKind,
    ) -> Result<Option<SignalRecord>> {
        match self.board.get(experiment_id, kind.key()).await? {
            Some(raw) => Ok(Some(records::decode(kind.key(), &raw)?)),
            None => Ok(None),
        }
    }
}

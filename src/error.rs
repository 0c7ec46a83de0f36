//! Error types for experiment coordination

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Exit status for a client that gave up waiting for its peers
pub const EXIT_TIMED_OUT: i32 = 3;
/// Exit status when the same client id is already active in the experiment
pub const EXIT_DUPLICATE_CLIENT: i32 = 4;
/// Exit status when the coordination medium cannot be reached
pub const EXIT_MEDIUM_UNAVAILABLE: i32 = 5;
/// Exit status when waiting on an experiment nobody created
pub const EXIT_EXPERIMENT_NOT_FOUND: i32 = 6;
/// Exit status when an experiment still holds state from an earlier run
pub const EXIT_STALE_EXPERIMENT: i32 = 7;
/// Exit status for invalid usage, matching clap's own status
pub const EXIT_USAGE: i32 = 2;
/// Exit status for any other failure
pub const EXIT_FAILURE: i32 = 1;

/// Coordinator error
#[derive(Error, Debug)]
pub enum SyncError {
    /// Client id already active in the experiment
    #[error("peer already running: client '{client_id}' is already registered in experiment '{experiment_id}'")]
    DuplicateClient {
        experiment_id: String,
        client_id: String,
    },

    /// Rendezvous not reached in time
    #[error("timed out waiting for peers: no {waiting_for} signal in experiment '{experiment_id}' after {:.1}s", .elapsed.as_secs_f64())]
    TimedOut {
        experiment_id: String,
        waiting_for: String,
        elapsed: Duration,
    },

    /// Experiment already controlled or signaled by an earlier run
    #[error("experiment '{experiment_id}' holds state from an earlier run ({reason}); clear it or use a new experiment id")]
    StaleExperiment {
        experiment_id: String,
        reason: String,
    },

    /// Experiment has no shared state on the board
    #[error("experiment '{experiment_id}' not found on the coordination medium")]
    ExperimentNotFound { experiment_id: String },

    /// Shared coordination resource inaccessible
    #[error("could not reach coordination medium at {}: {source}", .path.display())]
    SignalMediumUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Handle whose registration is gone or was taken over
    #[error("client '{client_id}' is no longer registered in experiment '{experiment_id}'")]
    NotRegistered {
        experiment_id: String,
        client_id: String,
    },

    /// Identifier unusable as a board key
    #[error("invalid identifier '{value}': {reason}")]
    InvalidIdentifier { value: String, reason: String },

    /// Board record that does not parse
    #[error("corrupt record '{key}' on the coordination medium: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl SyncError {
    /// Process exit status reported for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SyncError::TimedOut { .. } => EXIT_TIMED_OUT,
            SyncError::DuplicateClient { .. } => EXIT_DUPLICATE_CLIENT,
            SyncError::SignalMediumUnavailable { .. } | SyncError::Corrupt { .. } => {
                EXIT_MEDIUM_UNAVAILABLE
            }
            SyncError::ExperimentNotFound { .. } | SyncError::NotRegistered { .. } => {
                EXIT_EXPERIMENT_NOT_FOUND
            }
            SyncError::StaleExperiment { .. } => EXIT_STALE_EXPERIMENT,
            SyncError::InvalidIdentifier { .. } => EXIT_USAGE,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SyncError::TimedOut { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, SyncError>;

/// Map an anyhow error chain to a process exit status
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<SyncError>())
        .map(SyncError::exit_code)
        .unwrap_or(EXIT_FAILURE)
}

/// Map the benchmark's own exit status to the process exit status
///
/// Statuses that would read as one of specer's coordination failures are
/// folded into `EXIT_FAILURE`.
pub fn benchmark_exit_status(code: i32) -> i32 {
    if (EXIT_USAGE..=EXIT_STALE_EXPERIMENT).contains(&code) {
        EXIT_FAILURE
    } else {
        code
    }
}

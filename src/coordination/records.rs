use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::MAX_IDENTIFIER_LEN;
use crate::error::{Result, SyncError};

/// Key of the record created with the experiment
pub const EXPERIMENT_KEY: &str = "experiment";

/// Key claimed by the controller driving the experiment
pub const CONTROLLER_KEY: &str = "controller";

/// Prefix of client registration records
pub const CLIENTS_PREFIX: &str = "clients";

/// Prefix of withdrawal markers
pub const WITHDRAWN_PREFIX: &str = "withdrawn";

/// Get the board key of a client registration
pub fn client_key(client_id: &str) -> String {
    format!("{}/{}", CLIENTS_PREFIX, client_id)
}

/// Get the board key of a client withdrawal marker
pub fn withdrawn_key(client_id: &str) -> String {
    format!("{}/{}", WITHDRAWN_PREFIX, client_id)
}

/// Lifecycle of a client inside an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    Registered,
    WaitingForStart,
    Running,
    WaitingForStop,
    Done,
}

impl ClientState {
    /// Whether the client has signaled stop readiness
    pub fn is_finished(self) -> bool {
        matches!(self, ClientState::WaitingForStop | ClientState::Done)
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClientState::Registered => "registered",
            ClientState::WaitingForStart => "waiting-for-start",
            ClientState::Running => "running",
            ClientState::WaitingForStop => "waiting-for-stop",
            ClientState::Done => "done",
        };
        f.write_str(s)
    }
}

/// Broadcast signal kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Start,
    Stop,
}

impl SignalKind {
    /// Board key holding the signal flag
    pub fn key(self) -> &'static str {
        match self {
            SignalKind::Start => "signals/start",
            SignalKind::Stop => "signals/stop",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Start => "start",
            SignalKind::Stop => "stop",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record written when the experiment is first created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub experiment_id: String,
    pub created_at: String, // ISO 8601
}

/// Registration record owned by a single client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRecord {
    pub client_id: String,
    pub token: Uuid,
    pub state: ClientState,
    pub registered_at: String, // ISO 8601
    pub updated_at: String,    // ISO 8601
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// Marker left by a client that left before finishing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    pub client_id: String,
    pub withdrawn_at: String, // ISO 8601
    pub last_state: ClientState,
}

/// Claim of the single controller allowed to drive an experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerRecord {
    pub controller: String,
    pub claimed_at: String, // ISO 8601
    pub expected_clients: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// Level-triggered signal flag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    pub kind: SignalKind,
    pub issued_at: String, // ISO 8601
    pub issued_by: String,
}

/// Serialize a record for the board
pub fn encode<T: Serialize>(key: &str, record: &T) -> Result<String> {
    serde_json::to_string_pretty(record).map_err(|source| SyncError::Corrupt {
        key: key.to_string(),
        source,
    })
}

/// Parse a record read from the board
pub fn decode<T: for<'de> Deserialize<'de>>(key: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|source| SyncError::Corrupt {
        key: key.to_string(),
        source,
    })
}

/// Check that an experiment or client id can be used as a board key segment
pub fn validate_identifier(value: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(SyncError::InvalidIdentifier {
            value: value.to_string(),
            reason: reason.to_string(),
        })
    };

    if value.is_empty() {
        return invalid("must not be empty");
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return invalid(&format!("longer than {} characters", MAX_IDENTIFIER_LEN));
    }
    if value == "." || value == ".." {
        return invalid("reserved path name");
    }
    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return invalid(&format!(
            "character '{}' not allowed (use letters, digits, '-', '_' or '.')",
            c
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("exp1").is_ok());
        assert!(validate_identifier("node-01.rack_a").is_ok());

        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("..").is_err());
        assert!(validate_identifier("a/b").is_err());
        assert!(validate_identifier("with space").is_err());
        assert!(validate_identifier(&"x".repeat(MAX_IDENTIFIER_LEN + 1)).is_err());
    }

    #[test]
    fn test_client_state_ordering() {
        assert!(ClientState::Registered < ClientState::WaitingForStart);
        assert!(ClientState::Running < ClientState::WaitingForStop);
        assert!(ClientState::WaitingForStop.is_finished());
        assert!(ClientState::Done.is_finished());
        assert!(!ClientState::Running.is_finished());
    }

    #[test]
    fn test_client_record_format() {
        let record = ClientRecord {
            client_id: "c1".to_string(),
            token: Uuid::nil(),
            state: ClientState::WaitingForStart,
            registered_at: "2026-01-10T10:00:00Z".to_string(),
            updated_at: "2026-01-10T10:00:01Z".to_string(),
            host: None,
        };

        let json = encode("clients/c1", &record).unwrap();
        assert!(json.contains("\"waiting_for_start\""));
        assert!(!json.contains("host"));

        let parsed: ClientRecord = decode("clients/c1", &json).unwrap();
        assert_eq!(parsed.state, ClientState::WaitingForStart);
    }

    #[test]
    fn test_decode_corrupt_record() {
        let result: Result<SignalRecord> = decode("signals/start", "{not json");
        assert!(matches!(result, Err(SyncError::Corrupt { .. })));
    }
}

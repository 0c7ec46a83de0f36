//! Configuration constants for specer
//!
//! Environment variable names, poll bounds and default timeouts shared by the
//! runner, the coordinator and the controller.

use std::time::Duration;

// ============================================================================
// Environment
// ============================================================================

pub const EXPERIMENT_ID_ENV: &str = "EVALSYNC_EXPERIMENT_ID";

pub const CLIENT_ID_ENV: &str = "EVALSYNC_CLIENT_ID";

pub const SYNC_DIR_ENV: &str = "SPECER_SYNC_DIR";

pub const SPEC_PATH_ENV: &str = "SPEC_PATH";

/// Directory name used under the system temp dir when no sync dir is given
pub const DEFAULT_SYNC_DIR_NAME: &str = "specer-sync";

// ============================================================================
// Polling Configuration
// ============================================================================

/// First delay between two polls of the signal board
pub const POLL_INITIAL_DELAY: Duration = Duration::from_millis(10);

/// Upper bound for the delay between two polls of the signal board
///
/// Set to 500ms so a client observes a signal at most half a second after it
/// was issued, while a fleet of waiting clients only touches the shared medium
/// a couple of times per second each.
pub const POLL_MAX_DELAY: Duration = Duration::from_millis(500);

// ============================================================================
// Timeouts
// ============================================================================

/// Default time a client waits for the start signal
///
/// Generous because compilation on slower peers can delay registration of the
/// whole fleet.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(3600); // 1 hour

/// Default time a client waits for the stop signal once it has finished
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(3600); // 1 hour

/// Default time the controller waits for all clients to finish
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(48 * 3600); // 48 hours

/// Default time the controller waits for clients to acknowledge stop before
/// removing the experiment's state
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// Identifiers
// ============================================================================

pub const MAX_IDENTIFIER_LEN: usize = 128;

// ============================================================================
// Benchmark invocation
// ============================================================================

/// Output formats requested from runcpu unless the user overrides them
pub const DEFAULT_OUTPUT_FORMATS: &str = "rsf,pdf";

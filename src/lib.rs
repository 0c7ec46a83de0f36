// Public API - the runner plus the coordination protocol it is built on
pub mod config;
pub mod coordination;
pub mod error;
pub mod runner;
pub mod suite;

// Internal modules
mod telemetry;

#[cfg(test)]
mod integ_tests;

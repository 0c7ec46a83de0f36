//! Synchronized start and stop of benchmark runs across client processes

pub mod backoff;
pub mod board;
pub mod controller;
pub mod coordinator;
pub mod records;

pub use backoff::Backoff;
pub use board::{LocalSignalBoard, MemorySignalBoard, SignalBoard};
pub use controller::{Controller, ControllerConfig, ControllerConfigBuilder, ControllerReport};
pub use coordinator::{ClientHandle, ExperimentCoordinator, ExperimentSnapshot};
pub use records::{ClientState, SignalKind};

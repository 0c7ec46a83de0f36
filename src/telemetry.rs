use std::time::{Duration, Instant};

/// Events sent from the controller to the progress display
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// Registered client count changed
    Registered { registered: usize, expected: usize },
    /// Start signal was issued
    StartIssued { clients: usize },
    /// Number of clients waiting for stop changed
    Finished { finished: usize, present: usize },
    /// Stop signal was issued
    StopIssued { unfinished: usize },
}

/// Points in a synchronized client's run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Registered,
    Started,
    BenchmarkFinished,
    Stopped,
}

/// Timestamps of the phases a client went through
#[derive(Debug, Default, Clone)]
pub struct PhaseTimings {
    marks: Vec<(Phase, Instant)>,
}

impl PhaseTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a phase was reached now
    pub fn mark(&mut self, phase: Phase) {
        self.mark_at(phase, Instant::now());
    }

    pub fn mark_at(&mut self, phase: Phase, at: Instant) {
        self.marks.push((phase, at));
    }

    fn at(&self, phase: Phase) -> Option<Instant> {
        self.marks
            .iter()
            .find(|(p, _)| *p == phase)
            .map(|(_, at)| *at)
    }

    /// Time spent between two phases, if both were reached
    pub fn between(&self, from: Phase, to: Phase) -> Option<Duration> {
        let from = self.at(from)?;
        let to = self.at(to)?;
        Some(to.saturating_duration_since(from))
    }

    /// Time spent waiting for peers before the benchmark
    pub fn start_wait(&self) -> Option<Duration> {
        self.between(Phase::Registered, Phase::Started)
    }

    /// Time spent in the benchmark itself
    pub fn benchmark(&self) -> Option<Duration> {
        self.between(Phase::Started, Phase::BenchmarkFinished)
    }

    /// Time spent waiting for peers after the benchmark
    pub fn stop_wait(&self) -> Option<Duration> {
        self.between(Phase::BenchmarkFinished, Phase::Stopped)
    }
}

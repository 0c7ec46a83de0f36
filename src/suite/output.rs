use std::sync::LazyLock;

use regex::Regex;

use super::results::RunResults;

static BENCHMARK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)Running.*?(\d{3}\.\w+?(?:_[rs])?)\b",
        r"(?i)Building.*?(\d{3}\.\w+?(?:_[rs])?)\b",
        r"(?i)(\d{3}\.\w+?(?:_[rs])?)\s*(?:base|peak)",
        r"(?i)runcpu.*?(\d{3}\.\w+?(?:_[rs])?)\b",
        r"(?i)specinvoke.*?(\d{3}\.\w+?(?:_[rs])?)\b",
        r"^(\d{3}\.\w+?(?:_[rs])?):\s",
    ]
    .into_iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Extract the benchmark a line of runcpu output refers to
pub fn benchmark_from_line(line: &str) -> Option<String> {
    BENCHMARK_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(line))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

/// Tracks which benchmark runcpu is working on and what it reports
#[derive(Debug, Default)]
pub struct OutputScanner {
    current: Option<String>,
    seen: Vec<String>,
    results: RunResults,
}

impl OutputScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one output line, returning the benchmark if it changed
    pub fn observe(&mut self, line: &str) -> Option<&str> {
        self.results.observe(line);

        let benchmark = benchmark_from_line(line)?;
        if self.current.as_deref() == Some(benchmark.as_str()) {
            return None;
        }
        if !self.seen.contains(&benchmark) {
            self.seen.push(benchmark.clone());
        }
        self.current = Some(benchmark);
        self.current.as_deref()
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Benchmarks in the order they first appeared
    pub fn seen(&self) -> &[String] {
        &self.seen
    }

    pub fn results(&self) -> &RunResults {
        &self.results
    }

    pub fn into_parts(self) -> (Vec<String>, RunResults) {
        (self.seen, self.results)
    }
}

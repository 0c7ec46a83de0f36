//! SPEC CPU 2017 invocation: benchmark names, runcpu argv, output scanning
//! and host topology

pub mod command;
pub mod names;
pub mod output;
pub mod results;
pub mod topology;

pub use command::{
    Affinity, AffinityTool, RuncpuOptions, RuncpuOptionsBuilder, build_runcpu_command,
    validate_cpu_list, wrap_with_affinity,
};
pub use names::{Preference, RunKind, classify, detect_preference, is_suite, resolve_benchmarks};
pub use output::{OutputScanner, benchmark_from_line};
pub use results::{BenchmarkResult, RunResults, read_result_file};
pub use topology::{NumaTopology, check_numa_node, format_cpu_list, parse_numactl_hardware};

/// How a `--cores` count is passed to runcpu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreSplit {
    pub copies: Option<u32>,
    pub threads: Option<u32>,
}

/// Rate runs scale with copies, speed runs with threads
///
/// Mixed runs get both. Runs whose kind cannot be told from the names default
/// to threads.
pub fn split_cores(cores: u32, kind: RunKind) -> CoreSplit {
    match kind {
        RunKind::Rate => CoreSplit {
            copies: Some(cores),
            threads: None,
        },
        RunKind::Mixed => CoreSplit {
            copies: Some(cores),
            threads: Some(cores),
        },
        RunKind::Speed | RunKind::Unknown => CoreSplit {
            copies: None,
            threads: Some(cores),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_cores() {
        assert_eq!(
            split_cores(16, RunKind::Rate),
            CoreSplit {
                copies: Some(16),
                threads: None
            }
        );
        assert_eq!(split_cores(8, RunKind::Speed).threads, Some(8));
        assert_eq!(split_cores(8, RunKind::Unknown).copies, None);

        let mixed = split_cores(4, RunKind::Mixed);
        assert_eq!((mixed.copies, mixed.threads), (Some(4), Some(4)));
    }
}

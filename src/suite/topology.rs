//! NUMA layout of the host, as reported by `numactl --hardware`

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Result, bail};
use tokio::process::Command;
use tracing::debug;

const NUMACTL_TIMEOUT: Duration = Duration::from_secs(10);

/// NUMA nodes and the CPUs that belong to them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NumaTopology {
    /// Node ids in the order numactl lists them
    pub nodes: Vec<u32>,
    pub node_cpus: BTreeMap<u32, Vec<u32>>,
}

impl NumaTopology {
    /// Number of CPUs, counted up to the highest CPU id
    pub fn total_cpus(&self) -> u32 {
        self.node_cpus
            .values()
            .flatten()
            .max()
            .map_or(0, |highest| highest + 1)
    }

    pub fn cpus_of(&self, node: u32) -> &[u32] {
        self.node_cpus.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Parse the `node N cpus: ...` lines of `numactl --hardware`
///
/// Returns `None` when no node is listed.
pub fn parse_numactl_hardware(output: &str) -> Option<NumaTopology> {
    let mut topology = NumaTopology::default();

    for line in output.lines() {
        let Some((head, cpus)) = line.trim().split_once(" cpus:") else {
            continue;
        };
        let Some(node) = head
            .strip_prefix("node ")
            .and_then(|id| id.trim().parse::<u32>().ok())
        else {
            continue;
        };

        let cpus = cpus
            .split_whitespace()
            .filter_map(|cpu| cpu.parse().ok())
            .collect();
        topology.nodes.push(node);
        topology.node_cpus.insert(node, cpus);
    }

    (!topology.nodes.is_empty()).then_some(topology)
}

/// Query the host's NUMA topology
///
/// `None` when numactl is missing, fails, or reports no nodes.
pub async fn detect() -> Option<NumaTopology> {
    let output = Command::new("numactl")
        .arg("--hardware")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(NUMACTL_TIMEOUT, output).await {
        Ok(Ok(output)) if output.status.success() => output,
        Ok(Ok(output)) => {
            debug!("numactl --hardware exited with {}", output.status);
            return None;
        }
        Ok(Err(e)) => {
            debug!("Could not run numactl: {}", e);
            return None;
        }
        Err(_) => {
            debug!("numactl --hardware did not answer within {:?}", NUMACTL_TIMEOUT);
            return None;
        }
    };

    parse_numactl_hardware(&String::from_utf8_lossy(&output.stdout))
}

/// Check that a requested NUMA node exists, returning its CPUs
pub fn check_numa_node(node: u32, topology: Option<&NumaTopology>) -> Result<&[u32]> {
    let Some(topology) = topology else {
        bail!("NUMA topology not available or numactl not installed");
    };
    if !topology.nodes.contains(&node) {
        bail!(
            "NUMA node {} not available. Available nodes: {}",
            node,
            format_cpu_list(&topology.nodes)
        );
    }
    Ok(topology.cpus_of(node))
}

/// Render ids in the `0-3,8-11` list syntax
pub fn format_cpu_list(ids: &[u32]) -> String {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for id in sorted {
        match ranges.last_mut() {
            Some((_, end)) if *end + 1 == id => *end = id,
            _ => ranges.push((id, id)),
        }
    }

    ranges
        .iter()
        .map(|&(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{}-{}", start, end)
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

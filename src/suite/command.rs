use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use derive_builder::Builder;

use crate::config::DEFAULT_OUTPUT_FORMATS;

/// Parameters of one `runcpu --action run` invocation
#[derive(Debug, Clone, Builder)]
pub struct RuncpuOptions {
    /// Resolved benchmark or suite names
    pub benchmarks: Vec<String>,
    #[builder(setter(into))]
    pub config: String,
    #[builder(default, setter(strip_option, into))]
    pub tune: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub size: Option<String>,
    #[builder(default, setter(strip_option))]
    pub copies: Option<u32>,
    #[builder(default, setter(strip_option))]
    pub threads: Option<u32>,
    #[builder(default, setter(strip_option))]
    pub iterations: Option<u32>,
    #[builder(default = "false")]
    pub reportable: bool,
    #[builder(default = "false")]
    pub noreportable: bool,
    /// Comma separated formats, `all` leaves the choice to runcpu
    #[builder(default, setter(strip_option, into))]
    pub output_formats: Option<String>,
    #[builder(default = "false")]
    pub rebuild: bool,
    #[builder(default = "false")]
    pub ignore_errors: bool,
}

/// Locate runcpu under the SPEC installation, or rely on PATH without one
pub fn runcpu_path(spec_root: Option<&Path>) -> Result<PathBuf> {
    match spec_root {
        Some(root) => {
            let path = root.join("bin").join("runcpu");
            if !path.exists() {
                bail!("runcpu not found at {}", path.display());
            }
            Ok(path)
        }
        None => Ok(PathBuf::from("runcpu")),
    }
}

/// Build the argv of a runcpu invocation
pub fn build_runcpu_command(spec_root: Option<&Path>, options: &RuncpuOptions) -> Result<Vec<String>> {
    let mut cmd = vec![runcpu_path(spec_root)?.display().to_string()];

    cmd.extend(["--action".to_string(), "run".to_string()]);
    cmd.extend(["--config".to_string(), options.config.clone()]);

    if let Some(tune) = &options.tune {
        cmd.extend(["--tune".to_string(), tune.clone()]);
    }
    if let Some(size) = &options.size {
        cmd.extend(["--size".to_string(), size.clone()]);
    }
    if let Some(copies) = options.copies {
        cmd.extend(["--copies".to_string(), copies.to_string()]);
    }
    if let Some(threads) = options.threads {
        cmd.extend(["--threads".to_string(), threads.to_string()]);
    }
    if let Some(iterations) = options.iterations {
        cmd.extend(["--iterations".to_string(), iterations.to_string()]);
    }

    if options.reportable {
        cmd.push("--reportable".to_string());
    } else if options.noreportable {
        cmd.push("--noreportable".to_string());
    }

    // Must precede any flag that takes an optional numeric value
    match options.output_formats.as_deref() {
        Some(formats) if formats.eq_ignore_ascii_case("all") => {}
        Some(formats) => cmd.extend(["--output_format".to_string(), formats.to_string()]),
        None => cmd.extend([
            "--output_format".to_string(),
            DEFAULT_OUTPUT_FORMATS.to_string(),
        ]),
    }

    if options.rebuild {
        cmd.push("--rebuild".to_string());
    }
    if options.ignore_errors {
        cmd.push("--ignore_errors".to_string());
    }

    cmd.extend(options.benchmarks.iter().cloned());
    Ok(cmd)
}

/// CPU and memory placement of the benchmark process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Affinity {
    pub numa_node: Option<u32>,
    /// CPU list in `0-3,8-11` syntax
    pub cpu_cores: Option<String>,
    /// Bind memory to the same node as the CPUs
    pub bind_memory: bool,
}

impl Affinity {
    pub fn is_empty(&self) -> bool {
        self.numa_node.is_none() && self.cpu_cores.is_none()
    }
}

/// Tool used to apply an [`Affinity`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffinityTool {
    Numactl,
    Taskset,
}

impl AffinityTool {
    fn binary(self) -> &'static str {
        match self {
            AffinityTool::Numactl => "numactl",
            AffinityTool::Taskset => "taskset",
        }
    }

    /// Pick numactl when installed, taskset otherwise
    pub fn detect() -> Option<Self> {
        [AffinityTool::Numactl, AffinityTool::Taskset]
            .into_iter()
            .find(|tool| on_path(tool.binary()))
    }
}

fn on_path(binary: &str) -> bool {
    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|dir| dir.join(binary).is_file()))
        .unwrap_or(false)
}

/// Check a CPU list such as `0-3,8,10-11`
pub fn validate_cpu_list(list: &str) -> Result<()> {
    if list.trim().is_empty() {
        bail!("CPU list is empty");
    }

    for part in list.split(',') {
        let part = part.trim();
        let (start, end) = match part.split_once('-') {
            Some((start, end)) => (start, end),
            None => (part, part),
        };

        let (Ok(start), Ok(end)) = (start.trim().parse::<u32>(), end.trim().parse::<u32>()) else {
            bail!("invalid CPU list entry '{}' in '{}'", part, list);
        };
        if start > end {
            bail!("invalid CPU range '{}': start is after end", part);
        }
    }

    Ok(())
}

/// Prefix a command with the tool applying the requested affinity
///
/// taskset can only pin CPUs, so a NUMA node request without numactl fails.
pub fn wrap_with_affinity(
    cmd: Vec<String>,
    affinity: &Affinity,
    tool: Option<AffinityTool>,
) -> Result<Vec<String>> {
    if affinity.is_empty() {
        return Ok(cmd);
    }
    if let Some(cores) = &affinity.cpu_cores {
        validate_cpu_list(cores)?;
    }

    let mut wrapped = match tool {
        Some(AffinityTool::Numactl) => {
            let mut wrapped = vec!["numactl".to_string()];
            if let Some(node) = affinity.numa_node {
                wrapped.extend(["--cpunodebind".to_string(), node.to_string()]);
                if affinity.bind_memory {
                    wrapped.extend(["--membind".to_string(), node.to_string()]);
                }
            }
            if let Some(cores) = &affinity.cpu_cores {
                wrapped.extend(["--physcpubind".to_string(), cores.clone()]);
            }
            wrapped.push("--".to_string());
            wrapped
        }
        Some(AffinityTool::Taskset) => match (&affinity.cpu_cores, affinity.numa_node) {
            (Some(cores), None) => vec!["taskset".to_string(), "-c".to_string(), cores.clone()],
            _ => bail!("NUMA node binding requires numactl"),
        },
        None => bail!("CPU affinity requested but neither numactl nor taskset is installed"),
    };

    wrapped.extend(cmd);
    Ok(wrapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn spec_root() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("bin")).unwrap();
        std::fs::write(dir.path().join("bin/runcpu"), "#!/bin/sh\n").unwrap();
        dir
    }

    fn options(benchmarks: &[&str]) -> RuncpuOptionsBuilder {
        let mut builder = RuncpuOptionsBuilder::default();
        builder
            .benchmarks(benchmarks.iter().map(|s| s.to_string()).collect())
            .config("gcc-linux.cfg");
        builder
    }

    #[test]
    fn test_minimal_command() {
        let root = spec_root();
        let opts = options(&["519.lbm_r"]).build().unwrap();
        let cmd = build_runcpu_command(Some(root.path()), &opts).unwrap();

        let runcpu = root.path().join("bin/runcpu").display().to_string();
        assert_eq!(
            cmd,
            vec![
                runcpu.as_str(),
                "--action",
                "run",
                "--config",
                "gcc-linux.cfg",
                "--output_format",
                "rsf,pdf",
                "519.lbm_r",
            ]
        );
    }

    #[test]
    fn test_full_command_order() {
        let opts = options(&["intrate"])
            .tune("base")
            .size("ref")
            .copies(8)
            .iterations(3)
            .reportable(true)
            .noreportable(true)
            .output_formats("txt")
            .rebuild(true)
            .ignore_errors(true)
            .build()
            .unwrap();
        let cmd = build_runcpu_command(None, &opts).unwrap();

        assert_eq!(
            cmd,
            vec![
                "runcpu",
                "--action",
                "run",
                "--config",
                "gcc-linux.cfg",
                "--tune",
                "base",
                "--size",
                "ref",
                "--copies",
                "8",
                "--iterations",
                "3",
                "--reportable",
                "--output_format",
                "txt",
                "--rebuild",
                "--ignore_errors",
                "intrate",
            ]
        );
    }

    #[test]
    fn test_all_output_formats_omits_flag() {
        let opts = options(&["gcc"]).output_formats("ALL").build().unwrap();
        let cmd = build_runcpu_command(None, &opts).unwrap();
        assert!(!cmd.iter().any(|arg| arg == "--output_format"));
    }

    #[test]
    fn test_missing_runcpu() {
        let dir = TempDir::new().unwrap();
        let opts = options(&["gcc"]).build().unwrap();
        let err = build_runcpu_command(Some(dir.path()), &opts).unwrap_err();
        assert!(err.to_string().contains("runcpu not found"));
    }

    #[test]
    fn test_validate_cpu_list() {
        assert!(validate_cpu_list("0-3,8-11").is_ok());
        assert!(validate_cpu_list("5").is_ok());
        assert!(validate_cpu_list("").is_err());
        assert!(validate_cpu_list("3-1").is_err());
        assert!(validate_cpu_list("a-b").is_err());
        assert!(validate_cpu_list("0,,1").is_err());
    }

    #[test]
    fn test_numactl_wrapping() {
        let affinity = Affinity {
            numa_node: Some(1),
            cpu_cores: Some("0-3".to_string()),
            bind_memory: true,
        };
        let cmd = wrap_with_affinity(vec!["runcpu".to_string()], &affinity, Some(AffinityTool::Numactl))
            .unwrap();
        assert_eq!(
            cmd,
            vec![
                "numactl",
                "--cpunodebind",
                "1",
                "--membind",
                "1",
                "--physcpubind",
                "0-3",
                "--",
                "runcpu"
            ]
        );
    }

    #[test]
    fn test_numactl_without_memory_binding() {
        let affinity = Affinity {
            numa_node: Some(0),
            cpu_cores: None,
            bind_memory: false,
        };
        let cmd = wrap_with_affinity(vec!["runcpu".to_string()], &affinity, Some(AffinityTool::Numactl))
            .unwrap();
        assert_eq!(cmd, vec!["numactl", "--cpunodebind", "0", "--", "runcpu"]);
    }

    #[test]
    fn test_taskset_fallback() {
        let affinity = Affinity {
            numa_node: None,
            cpu_cores: Some("2,4".to_string()),
            bind_memory: true,
        };
        let cmd = wrap_with_affinity(vec!["runcpu".to_string()], &affinity, Some(AffinityTool::Taskset))
            .unwrap();
        assert_eq!(cmd, vec!["taskset", "-c", "2,4", "runcpu"]);

        let numa = Affinity {
            numa_node: Some(0),
            ..affinity
        };
        assert!(wrap_with_affinity(vec!["runcpu".to_string()], &numa, Some(AffinityTool::Taskset)).is_err());
    }

    #[test]
    fn test_no_affinity_is_passthrough() {
        let cmd = wrap_with_affinity(vec!["runcpu".to_string()], &Affinity::default(), None).unwrap();
        assert_eq!(cmd, vec!["runcpu"]);
    }
}

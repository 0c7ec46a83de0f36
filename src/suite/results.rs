//! Scores and result files reported by runcpu
//!
//! runcpu announces where it wrote its reports and prints estimated suite
//! scores at the end of a run. The raw result file (`.rsf`) then holds the
//! per-benchmark ratios and times.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use serde::Serialize;
use tokio::fs;
use tracing::{debug, warn};

/// Extensions of the report formats runcpu writes
const REPORT_EXTENSIONS: &[&str] = &[".rsf", ".html", ".pdf", ".txt", ".ps"];

static RESULT_FILE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)The result.*?is in (\S+)").ok());

static REPORT_LOCATION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)(?:format to|reports are in) (\S+)").ok());

static LOG_FILE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)The log for this run is in (\S+)").ok());

static ESTIMATE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)Est\.\s+(SPEC\w+\d+_\w+)\s*=\s*([\d.]+)").ok());

static RSF_MEAN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?im)^spec\.cpu2017\.(base|peak)mean:\s*([\d.]+)").ok());

static RSF_DETAIL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^spec\.cpu2017\.results\.(\d{3}_\w+)\.(?:base|peak)\.000\.(ratio|reported_sec|reference|copies|threads):\s*([\d.]+)",
    )
    .ok()
});

static RSF_ERROR: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?im)^spec\.cpu2017\.errors\d+:\s*(\d{3}\.\w+)\s*\([^)]+\)\s*(.+)$").ok()
});

fn captures<'h>(pattern: &Option<Regex>, haystack: &'h str) -> Option<Captures<'h>> {
    pattern.as_ref()?.captures(haystack)
}

fn captures_all<'h>(
    pattern: &Option<Regex>,
    haystack: &'h str,
) -> impl Iterator<Item = Captures<'h>> {
    pattern
        .iter()
        .flat_map(move |regex| regex.captures_iter(haystack))
}

/// How a result file was found in the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultFileKind {
    /// Announced by runcpu as a result or report location
    Result,
    /// A path with a report extension mentioned anywhere else
    ResultFile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultFile {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: ResultFileKind,
}

/// Measurements of one benchmark from a result file
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BenchmarkResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<f64>,
    /// Reported run time in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copies: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<u32>,
    /// Problem flagged by SPEC for a benchmark that still produced a ratio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Everything learned about a run's results
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunResults {
    pub result_files: Vec<ResultFile>,
    /// Suite scores such as `SPECrate2017_int_base`
    pub scores: BTreeMap<String, f64>,
    /// Estimates without a base or peak tuning suffix
    pub metrics: BTreeMap<String, f64>,
    pub log_file: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub benchmark_results: BTreeMap<String, BenchmarkResult>,
}

impl RunResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether runcpu reported anything worth showing
    pub fn is_empty(&self) -> bool {
        self.result_files.is_empty() && self.scores.is_empty() && self.log_file.is_none()
    }

    /// Feed one line of runcpu output
    pub fn observe(&mut self, line: &str) {
        let line = line.trim();

        for pattern in [&*RESULT_FILE, &*REPORT_LOCATION] {
            if let Some(found) = captures(pattern, line) {
                self.add_file(&found[1], ResultFileKind::Result);
            }
        }
        if let Some(found) = captures(&LOG_FILE, line) {
            self.log_file = Some(found[1].to_string());
        }
        if let Some(found) = captures(&ESTIMATE, line) {
            record_estimate(&mut self.scores, &mut self.metrics, &found[1], &found[2]);
        }

        for word in line.split_whitespace() {
            if REPORT_EXTENSIONS.iter().any(|ext| word.ends_with(ext)) {
                self.add_file(word, ResultFileKind::ResultFile);
            }
        }
    }

    fn add_file(&mut self, path: &str, kind: ResultFileKind) {
        if self.result_files.iter().any(|file| file.path == path) {
            return;
        }
        self.result_files.push(ResultFile {
            path: path.to_string(),
            kind,
        });
    }

    /// Read the reported result files for per-benchmark measurements
    ///
    /// Raw result files are preferred; the other formats are only read when
    /// no raw file yielded benchmark data. Files that cannot be read are
    /// skipped with a warning.
    pub async fn load_details(&mut self, spec_root: Option<&Path>) {
        let (raw, other): (Vec<_>, Vec<_>) = self
            .result_files
            .iter()
            .map(|file| file.path.clone())
            .partition(|path| path.ends_with(".rsf"));

        for group in [raw, other] {
            for path in group {
                match read_result_file(&path, spec_root).await {
                    Ok(Some(data)) => self.merge(data),
                    Ok(None) => debug!("Result file {} not found", path),
                    Err(e) => warn!("Could not parse result file {}: {:#}", path, e),
                }
            }
            if !self.benchmark_results.is_empty() {
                break;
            }
        }
    }

    fn merge(&mut self, data: ResultFileData) {
        for (name, score) in data.scores {
            self.scores.entry(name).or_insert(score);
        }
        for (name, metric) in data.metrics {
            self.metrics.entry(name).or_insert(metric);
        }
        self.benchmark_results.extend(data.benchmark_results);
    }
}

/// Contents of one parsed result file
#[derive(Debug, Clone, Default)]
pub struct ResultFileData {
    pub path: PathBuf,
    pub scores: BTreeMap<String, f64>,
    pub metrics: BTreeMap<String, f64>,
    pub benchmark_results: BTreeMap<String, BenchmarkResult>,
}

/// Scores carry a tuning suffix, anything else is a plain metric
fn record_estimate(
    scores: &mut BTreeMap<String, f64>,
    metrics: &mut BTreeMap<String, f64>,
    name: &str,
    value: &str,
) {
    let Ok(value) = value.parse::<f64>() else {
        return;
    };
    let lower = name.to_lowercase();
    if lower.ends_with("_base") || lower.ends_with("_peak") {
        scores.insert(name.to_string(), value);
    } else {
        metrics.insert(name.to_string(), value);
    }
}

/// Find a result file on disk
///
/// Relative paths are tried as given, then under the SPEC root and its
/// `result` directory.
pub fn locate_result_file(path: &str, spec_root: Option<&Path>) -> Option<PathBuf> {
    let path = Path::new(path);
    if path.is_absolute() {
        return path.exists().then(|| path.to_path_buf());
    }

    let mut candidates = vec![path.to_path_buf()];
    if let Some(root) = spec_root {
        candidates.push(root.join(path));
        candidates.push(root.join("result").join(path));
        if let Some(name) = path.file_name() {
            candidates.push(root.join("result").join(name));
        }
    }
    candidates.into_iter().find(|candidate| candidate.exists())
}

/// Parse a result file, `None` if it cannot be found
pub async fn read_result_file(path: &str, spec_root: Option<&Path>) -> Result<Option<ResultFileData>> {
    let Some(location) = locate_result_file(path, spec_root) else {
        return Ok(None);
    };

    let bytes = fs::read(&location)
        .await
        .with_context(|| format!("Failed to read {}", location.display()))?;
    let content = String::from_utf8_lossy(&bytes);

    let mut data = if path.ends_with(".rsf") {
        parse_raw_result(&content, path)
    } else {
        parse_text_result(&content)
    };
    data.path = location;
    Ok(Some(data))
}

/// Parse the key/value lines of a raw result file
///
/// Suite means are named after the suite in the file name, e.g.
/// `CPU2017.001.intrate.rsf` yields `SPECint2017_rate_base`.
pub fn parse_raw_result(content: &str, file_name: &str) -> ResultFileData {
    let mut data = ResultFileData::default();

    let lower = file_name.to_lowercase();
    let family = if lower.contains("intrate") || lower.contains("intspeed") {
        "int"
    } else {
        "fp"
    };
    let kind = if lower.contains("rate") { "rate" } else { "speed" };

    for found in captures_all(&RSF_MEAN, content) {
        if let Ok(value) = found[2].parse::<f64>() {
            let tuning = found[1].to_lowercase();
            data.scores
                .insert(format!("SPEC{}2017_{}_{}", family, kind, tuning), value);
        }
    }

    for found in captures_all(&RSF_DETAIL, content) {
        let Ok(value) = found[3].parse::<f64>() else {
            continue;
        };
        // 648_exchange2_s names 648.exchange2_s
        let name = found[1].replacen('_', ".", 1);
        let entry = data.benchmark_results.entry(name).or_default();
        match found[2].to_lowercase().as_str() {
            "ratio" => entry.ratio = Some(value),
            "reported_sec" => entry.time = Some(value),
            "reference" => entry.reference = Some(value),
            "copies" => entry.copies = Some(value as u32),
            "threads" => entry.threads = Some(value as u32),
            _ => {}
        }
    }

    // Benchmarks that never produced a ratio did not run and stay out
    for found in captures_all(&RSF_ERROR, content) {
        if let Some(entry) = data
            .benchmark_results
            .get_mut(&found[1])
            .filter(|entry| entry.ratio.is_some())
        {
            entry.warning = Some(found[2].trim().to_string());
        }
    }

    data
}

/// Parse the estimate lines of a text report
pub fn parse_text_result(content: &str) -> ResultFileData {
    let mut data = ResultFileData::default();
    for line in content.lines() {
        if let Some(found) = captures(&ESTIMATE, line) {
            record_estimate(&mut data.scores, &mut data.metrics, &found[1], &found[2]);
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RUNCPU_TAIL: &str = "\
Success: 1x 519.lbm_r
Producing Raw Reports
 format: raw -> /spec/result/CPU2017.003.fprate.test.rsf
The log for this run is in /spec/result/CPU2017.003.log
The result is in /spec/result/CPU2017.003.fprate.test.txt
Est. SPECrate2017_fp_base = 12.5
Est. SPECrate2017_fp_peak = 13.25
runcpu finished at 2026-01-10 10:00:00; 120 total seconds elapsed
";

    const RAW_RESULT: &str = "\
spec.cpu2017.basemean: 12.5
spec.cpu2017.peakmean: --
spec.cpu2017.results.519_lbm_r.base.000.ratio: 12.38
spec.cpu2017.results.519_lbm_r.base.000.reported_sec: 84.1
spec.cpu2017.results.519_lbm_r.base.000.reference: 1054
spec.cpu2017.results.519_lbm_r.base.000.copies: 4
spec.cpu2017.results.648_exchange2_s.base.000.threads: 8
spec.cpu2017.errors000: 519.lbm_r (base) miscompare in output
spec.cpu2017.errors001: 505.mcf_r (base) did not run
";

    fn parse(output: &str) -> RunResults {
        let mut results = RunResults::new();
        for line in output.lines() {
            results.observe(line);
        }
        results
    }

    #[test]
    fn test_parse_runcpu_output() {
        let results = parse(RUNCPU_TAIL);

        assert_eq!(results.scores.get("SPECrate2017_fp_base"), Some(&12.5));
        assert_eq!(results.scores.get("SPECrate2017_fp_peak"), Some(&13.25));
        assert!(results.metrics.is_empty());
        assert_eq!(
            results.log_file.as_deref(),
            Some("/spec/result/CPU2017.003.log")
        );

        let paths: Vec<&str> = results.result_files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/spec/result/CPU2017.003.fprate.test.rsf",
                "/spec/result/CPU2017.003.fprate.test.txt",
            ]
        );
        assert_eq!(results.result_files[1].kind, ResultFileKind::Result);
        assert!(!results.is_empty());
    }

    #[test]
    fn test_output_without_results() {
        let results = parse("Running 519.lbm_r refrate (ref) base\nSuccess: 1x 519.lbm_r\n");
        assert!(results.is_empty());
    }

    #[test]
    fn test_estimate_without_tuning_is_metric() {
        let results = parse("Est. SPECrate2017_fp_energy = 4.5\n");
        assert!(results.scores.is_empty());
        assert_eq!(results.metrics.get("SPECrate2017_fp_energy"), Some(&4.5));
    }

    #[test]
    fn test_parse_raw_result() {
        let data = parse_raw_result(RAW_RESULT, "CPU2017.003.fprate.test.rsf");

        assert_eq!(data.scores.get("SPECfp2017_rate_base"), Some(&12.5));
        assert!(!data.scores.contains_key("SPECfp2017_rate_peak"));

        let lbm = &data.benchmark_results["519.lbm_r"];
        assert_eq!(lbm.ratio, Some(12.38));
        assert_eq!(lbm.time, Some(84.1));
        assert_eq!(lbm.reference, Some(1054.0));
        assert_eq!(lbm.copies, Some(4));
        assert_eq!(lbm.warning.as_deref(), Some("miscompare in output"));

        assert_eq!(data.benchmark_results["648.exchange2_s"].threads, Some(8));
        assert!(!data.benchmark_results.contains_key("505.mcf_r"));
    }

    #[test]
    fn test_suite_name_from_file_name() {
        let data = parse_raw_result("spec.cpu2017.peakmean: 3.1\n", "CPU2017.001.intspeed.rsf");
        assert_eq!(data.scores.get("SPECint2017_speed_peak"), Some(&3.1));
    }

    #[tokio::test]
    async fn test_load_details_from_spec_root() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("result")).unwrap();
        std::fs::write(
            root.path().join("result/CPU2017.003.fprate.test.rsf"),
            RAW_RESULT,
        )
        .unwrap();
        std::fs::write(
            root.path().join("result/CPU2017.003.fprate.test.txt"),
            "Est. SPECrate2017_fp_base = 99\n",
        )
        .unwrap();

        let mut results = parse(
            "The result is in result/CPU2017.003.fprate.test.rsf\n\
             The result is in CPU2017.003.fprate.test.txt\n",
        );
        assert!(results.scores.is_empty());
        results.load_details(Some(root.path())).await;

        // Raw data was found, so the text report is not consulted
        assert_eq!(results.scores.get("SPECfp2017_rate_base"), Some(&12.5));
        assert_eq!(results.benchmark_results["519.lbm_r"].ratio, Some(12.38));
    }

    #[tokio::test]
    async fn test_missing_result_file() {
        let root = TempDir::new().unwrap();
        let data = read_result_file("CPU2017.999.intrate.rsf", Some(root.path()))
            .await
            .unwrap();
        assert!(data.is_none());
    }

    #[test]
    fn test_results_json_shape() {
        let mut results = parse(RUNCPU_TAIL);
        results.merge(parse_raw_result(RAW_RESULT, "CPU2017.003.fprate.test.rsf"));

        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json["result_files"][0]["type"], "result_file");
        assert_eq!(json["scores"]["SPECrate2017_fp_base"], 12.5);
        assert_eq!(json["benchmark_results"]["519.lbm_r"]["copies"], 4);
        assert!(json["benchmark_results"]["519.lbm_r"].get("threads").is_none());
    }
}

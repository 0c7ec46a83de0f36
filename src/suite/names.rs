//! Benchmark name resolution for SPEC CPU 2017

/// Simple benchmark names and their (speed, rate) SPEC identifiers
const BENCHMARKS: &[(&str, &str, &str)] = &[
    ("perlbench", "600.perlbench_s", "500.perlbench_r"),
    ("gcc", "602.gcc_s", "502.gcc_r"),
    ("mcf", "605.mcf_s", "505.mcf_r"),
    ("omnetpp", "620.omnetpp_s", "520.omnetpp_r"),
    ("xalancbmk", "623.xalancbmk_s", "523.xalancbmk_r"),
    ("x264", "625.x264_s", "525.x264_r"),
    ("deepsjeng", "631.deepsjeng_s", "531.deepsjeng_r"),
    ("leela", "641.leela_s", "541.leela_r"),
    ("exchange2", "648.exchange2_s", "548.exchange2_r"),
    ("xz", "657.xz_s", "557.xz_r"),
    ("bwaves", "603.bwaves_s", "503.bwaves_r"),
    ("cactubssn", "607.cactuBSSN_s", "507.cactuBSSN_r"),
    ("lbm", "619.lbm_s", "519.lbm_r"),
    ("wrf", "621.wrf_s", "521.wrf_r"),
    ("cam4", "627.cam4_s", "527.cam4_r"),
    ("pop2", "628.pop2_s", "528.pop2_r"),
    ("imagick", "638.imagick_s", "538.imagick_r"),
    ("nab", "644.nab_s", "544.nab_r"),
    ("fotonik3d", "649.fotonik3d_s", "549.fotonik3d_r"),
    ("roms", "654.roms_s", "554.roms_r"),
];

const RATE_SUITES: &[&str] = &["intrate", "fprate", "specrate"];
const SPEED_SUITES: &[&str] = &["intspeed", "fpspeed", "specspeed"];

/// Suites accepted for reportable runs
pub const REPORTABLE_SUITES: &[&str] = &["intspeed", "intrate", "fpspeed", "fprate", "all"];

/// Which variant a simple benchmark name resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preference {
    #[default]
    Speed,
    Rate,
}

/// Kind of run implied by a set of resolved benchmark names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Rate,
    Speed,
    Mixed,
    Unknown,
}

/// Whether the name is a suite rather than a single benchmark
pub fn is_suite(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower == "all" || RATE_SUITES.contains(&lower.as_str()) || SPEED_SUITES.contains(&lower.as_str())
}

/// Full SPEC names look like "519.lbm_r"
fn is_full_name(name: &str) -> bool {
    name.split_once('.')
        .is_some_and(|(number, _)| number.chars().any(|c| c.is_ascii_digit()))
}

/// Guess the preferred variant from the names the user already gave
///
/// Returns `None` when speed and rate names are balanced.
pub fn detect_preference(benchmarks: &[String]) -> Option<Preference> {
    let mut speed = 0usize;
    let mut rate = 0usize;

    for benchmark in benchmarks {
        let lower = benchmark.to_lowercase();
        if lower.contains("_s") || lower.contains("speed") {
            speed += 1;
        } else if lower.contains("_r") || lower.contains("rate") {
            rate += 1;
        }
    }

    match speed.cmp(&rate) {
        std::cmp::Ordering::Greater => Some(Preference::Speed),
        std::cmp::Ordering::Less => Some(Preference::Rate),
        std::cmp::Ordering::Equal => None,
    }
}

/// Convert simple benchmark names to full SPEC names
///
/// Full names and suite names are kept as-is, as are unknown names so runcpu
/// can report them.
pub fn resolve_benchmarks(benchmarks: &[String], preference: Preference) -> Vec<String> {
    benchmarks
        .iter()
        .map(|benchmark| {
            if is_full_name(benchmark) || is_suite(benchmark) {
                return benchmark.clone();
            }

            let lower = benchmark.to_lowercase();
            match BENCHMARKS.iter().find(|(simple, _, _)| *simple == lower) {
                Some((_, speed, rate)) => match preference {
                    Preference::Speed => speed.to_string(),
                    Preference::Rate => rate.to_string(),
                },
                None => benchmark.clone(),
            }
        })
        .collect()
}

/// Classify resolved benchmark names as a rate run, a speed run, or both
pub fn classify(benchmarks: &[String]) -> RunKind {
    let is_rate = benchmarks
        .iter()
        .any(|b| b.ends_with("_r") || RATE_SUITES.contains(&b.to_lowercase().as_str()));
    let is_speed = benchmarks
        .iter()
        .any(|b| b.ends_with("_s") || SPEED_SUITES.contains(&b.to_lowercase().as_str()));

    match (is_rate, is_speed) {
        (true, false) => RunKind::Rate,
        (false, true) => RunKind::Speed,
        (true, true) => RunKind::Mixed,
        (false, false) => RunKind::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_simple_names() {
        assert_eq!(
            resolve_benchmarks(&names(&["gcc"]), Preference::Speed),
            vec!["602.gcc_s"]
        );
        assert_eq!(
            resolve_benchmarks(&names(&["gcc", "LBM"]), Preference::Rate),
            vec!["502.gcc_r", "519.lbm_r"]
        );
        assert_eq!(
            resolve_benchmarks(&names(&["cactuBSSN"]), Preference::Rate),
            vec!["507.cactuBSSN_r"]
        );
    }

    #[test]
    fn test_resolve_keeps_full_suite_and_unknown_names() {
        assert_eq!(
            resolve_benchmarks(
                &names(&["602.gcc_s", "intrate", "all", "mystery"]),
                Preference::Rate
            ),
            vec!["602.gcc_s", "intrate", "all", "mystery"]
        );
    }

    #[test]
    fn test_detect_preference() {
        assert_eq!(
            detect_preference(&names(&["519.lbm_r", "gcc"])),
            Some(Preference::Rate)
        );
        assert_eq!(
            detect_preference(&names(&["intspeed", "gcc"])),
            Some(Preference::Speed)
        );
        assert_eq!(detect_preference(&names(&["gcc", "mcf"])), None);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&names(&["502.gcc_r", "fprate"])), RunKind::Rate);
        assert_eq!(classify(&names(&["602.gcc_s"])), RunKind::Speed);
        assert_eq!(classify(&names(&["602.gcc_s", "502.gcc_r"])), RunKind::Mixed);
        assert_eq!(classify(&names(&["all"])), RunKind::Unknown);
    }

    #[test]
    fn test_is_suite() {
        assert!(is_suite("intspeed"));
        assert!(is_suite("FPRATE"));
        assert!(is_suite("all"));
        assert!(!is_suite("gcc"));
    }
}

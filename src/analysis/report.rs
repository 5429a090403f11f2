//! Comparison report: document layout, output naming and persistence.
//!
//! A report is written at most once per run id. The output name is derived
//! from the run's routing configuration; when a file of that name already
//! belongs to another run, `_1`, `_2`, ... variants are tried in order.
//!
//! Reports are staged in a hidden temporary file next to the target and
//! published with a no-clobber link, so a report name is never visible
//! before its content is complete.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ReportError;
use crate::provider::{AcoParameters, AcoVariant, HeuristicType, RunIdentity};

/// Persisted comparison of all iterations of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub common_data: CommonData,
    pub events: Vec<IterationRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonData {
    /// Wall-clock time elapsed since the run started
    pub time: String,
    pub started_at: String,
    pub routing_algorithm_type: String,
    #[serde(rename = "runId")]
    pub run_id: String,
    pub iterations: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aco_configuration: Option<AcoParameters>,
    pub best_evacuation_time: String,
    pub best_clearing_time: String,
    pub best_graph_evacuation_time: String,
    pub population: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name_of_best_evacuation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name_of_best_clearing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name_of_best_graph_evacuation_time: Option<String>,
    #[serde(rename = "RandomPlanSelector_ReRoute", default, skip_serializing_if = "Option::is_none")]
    pub reroute_weight: Option<f64>,
    #[serde(rename = "ExpBetaPlanChanger", default, skip_serializing_if = "Option::is_none")]
    pub exp_beta_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_iterations: Vec<SkippedIteration>,
}

/// Metrics of one analyzed iteration, times formatted as `{h}h{mm}m{ss}s`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub file_name: String,
    pub evacuation_time: String,
    pub clearing_time: String,
    pub graph_evacuation_time: String,
    pub population_observed: u64,
    pub grid_anomalies: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedIteration {
    pub file_name: String,
    pub reason: String,
}

/// Weights of the two supported replanning strategies, by position: the
/// re-route selector first, the exp-beta plan changer second.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReplanningWeights {
    pub reroute: Option<f64>,
    pub exp_beta: Option<f64>,
}

impl ReplanningWeights {
    pub fn from_strategies(weights: &[f64]) -> Result<Self, ReportError> {
        if weights.len() > 2 {
            return Err(ReportError::UnsupportedConfiguration(format!(
                "{} replanning strategies configured, at most 2 are supported",
                weights.len()
            )));
        }
        Ok(Self {
            reroute: weights.first().copied(),
            exp_beta: weights.get(1).copied(),
        })
    }
}

/// Deterministic base name (without `.json`) of a run's report.
pub fn output_base_name(identity: &RunIdentity, weights: &ReplanningWeights) -> String {
    let mut name = format!(
        "output-{}-i{}-weight",
        identity.routing_algorithm.as_str().to_lowercase(),
        identity.iteration_count
    );
    if let Some(w) = weights.reroute {
        name.push_str(&format!("-rer{}", format_tag_number(w)));
    }
    if let Some(w) = weights.exp_beta {
        name.push_str(&format!("-exp{}", format_tag_number(w)));
    }
    if let Some(params) = &identity.algorithm_parameters {
        name.push_str(&aco_tags(params));
    }
    name
}

fn aco_tags(params: &AcoParameters) -> String {
    let variant = match params.aco_type {
        AcoVariant::Variant1 => "clssc",
        AcoVariant::Variant2 => "cstm",
    };
    let heuristic = match params.heuristic_type {
        HeuristicType::TravelCost => "t",
        HeuristicType::LinkLength => "l",
    };
    format!(
        "-t{}-a{}-b{}-p{}-e{}-q{}-h{}",
        variant,
        format_tag_number(params.alpha),
        format_tag_number(params.beta),
        format_tag_number(params.pheromone_constant),
        format_tag_number(params.evaporation_rate),
        format_tag_number(params.q),
        heuristic
    )
}

/// Render with at least one decimal: `1.0`, `0.25`.
pub fn format_tag_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

fn slot_path(dir: &Path, base_name: &str, index: usize) -> PathBuf {
    if index == 0 {
        dir.join(format!("{}.json", base_name))
    } else {
        dir.join(format!("{}_{}.json", base_name, index))
    }
}

/// Result of scanning the name variants of a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportSlot {
    /// A report for the same run id already exists here
    Existing(PathBuf),
    /// First variant that does not exist yet
    Free(PathBuf),
}

/// Attempts made on a slot that cannot be parsed before it is taken to
/// belong to another run.
const UNREADABLE_SLOT_ATTEMPTS: u32 = 8;
const UNREADABLE_SLOT_WAIT: Duration = Duration::from_millis(25);

/// Walk `base.json`, `base_1.json`, ... until either a report with `run_id`
/// or a missing file is found.
///
/// A slot that exists but does not parse may still be filled by another
/// writer. It is re-read for a short while before the scan moves past it.
pub fn scan_report_slots(dir: &Path, base_name: &str, run_id: &str) -> ReportSlot {
    let mut index = 0;
    loop {
        let path = slot_path(dir, base_name, index);
        if !slot_taken(&path) {
            return ReportSlot::Free(path);
        }
        match settle_slot(&path) {
            StoredReport::RunId(id) if id == run_id => return ReportSlot::Existing(path),
            StoredReport::Unreadable if !slot_taken(&path) => return ReportSlot::Free(path),
            _ => index += 1,
        }
    }
}

/// Any directory entry occupies a slot, dangling symlinks included.
fn slot_taken(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Path of an existing report for `run_id`, if any.
pub fn find_existing_report(dir: &Path, base_name: &str, run_id: &str) -> Option<PathBuf> {
    match scan_report_slots(dir, base_name, run_id) {
        ReportSlot::Existing(path) => Some(path),
        ReportSlot::Free(_) => None,
    }
}

/// What a report slot on disk holds.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StoredReport {
    /// `common_data.runId` of a complete report
    RunId(String),
    /// Valid JSON that is not a report
    Foreign,
    /// Empty, partial or unreadable content
    Unreadable,
}

fn settle_slot(path: &Path) -> StoredReport {
    let mut attempt = 1;
    loop {
        let stored = read_stored_report(path);
        if stored != StoredReport::Unreadable || attempt >= UNREADABLE_SLOT_ATTEMPTS {
            if stored == StoredReport::Unreadable {
                log::warn!("{} stays unreadable, treating it as another run's report", path.display());
            }
            return stored;
        }
        log::debug!("{} is not readable yet, waiting (attempt {})", path.display(), attempt);
        thread::sleep(UNREADABLE_SLOT_WAIT);
        attempt += 1;
    }
}

fn read_stored_report(path: &Path) -> StoredReport {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            log::debug!("Cannot read {}: {}", path.display(), e);
            return StoredReport::Unreadable;
        }
    };
    let value: serde_json::Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            log::debug!("{} is not a JSON report: {}", path.display(), e);
            return StoredReport::Unreadable;
        }
    };
    match value
        .get("common_data")
        .and_then(|common| common.get("runId"))
        .and_then(|id| id.as_str())
    {
        Some(id) => StoredReport::RunId(id.to_string()),
        None => StoredReport::Foreign,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(PathBuf),
    AlreadyReported(PathBuf),
}

/// Write `report` to the first free name variant in `dir`.
///
/// The report is fully written to a temporary file first and then linked to
/// the chosen name without replacing anything. When another writer takes
/// that name first, the scan is repeated, so a concurrent write of the same
/// run id is detected instead of duplicated.
pub fn write_report(dir: &Path, base_name: &str, report: &AnalysisReport) -> std::io::Result<WriteOutcome> {
    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
    let run_id = report.common_data.run_id.as_str();

    let mut staged = tempfile::Builder::new()
        .prefix(&format!(".{}.", base_name))
        .suffix(".json.tmp")
        .tempfile_in(dir)?;
    staged.write_all(json.as_bytes())?;
    staged.as_file().sync_all()?;

    loop {
        let path = match scan_report_slots(dir, base_name, run_id) {
            ReportSlot::Existing(path) => return Ok(WriteOutcome::AlreadyReported(path)),
            ReportSlot::Free(path) => path,
        };

        match staged.persist_noclobber(&path) {
            Ok(_) => {
                log::info!("JSON report written to {}", path.display());
                return Ok(WriteOutcome::Written(path));
            }
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                log::debug!("{} was created concurrently, rescanning", path.display());
                staged = e.file;
            }
            Err(e) => return Err(e.error),
        }
    }
}

/// Print a short summary to stdout
pub fn print_summary(report: &AnalysisReport) {
    let common = &report.common_data;
    println!("\n=== EVACUATION ANALYSIS SUMMARY ===\n");
    println!("Run: {} ({})", common.run_id, common.routing_algorithm_type);
    println!("Started: {} (elapsed {})", common.started_at, common.time);
    println!("Iterations: {} ({} analyzed)", common.iterations, report.events.len());
    println!("Population: {}", common.population);

    println!("\nBest iterations:");
    print_best("Evacuation", &common.best_evacuation_time, &common.file_name_of_best_evacuation);
    print_best("Clearing", &common.best_clearing_time, &common.file_name_of_best_clearing);
    print_best(
        "Graph evacuation",
        &common.best_graph_evacuation_time,
        &common.file_name_of_best_graph_evacuation_time,
    );

    if !common.skipped_iterations.is_empty() {
        println!("\nSkipped iterations:");
        for skipped in &common.skipped_iterations {
            println!("  {}: {}", skipped.file_name, skipped.reason);
        }
    }

    println!();
}

fn print_best(label: &str, time: &str, file: &Option<String>) {
    match file {
        Some(file) => println!("  {:<17} {:>10}  {}", label, time, file),
        None => println!("  {:<17} {:>10}  -", label, "n/a"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::RoutingAlgorithm;
    use chrono::NaiveDateTime;
    use tempfile::TempDir;

    fn identity(algorithm: RoutingAlgorithm, params: Option<AcoParameters>) -> RunIdentity {
        RunIdentity {
            run_id: "run-1".to_string(),
            routing_algorithm: algorithm,
            started_at: NaiveDateTime::default(),
            iteration_count: 20,
            algorithm_parameters: params,
        }
    }

    fn report(run_id: &str) -> AnalysisReport {
        AnalysisReport {
            common_data: CommonData {
                time: "0h10m00s".to_string(),
                started_at: "2024-03-05T10:15:30".to_string(),
                routing_algorithm_type: "Dijkstra".to_string(),
                run_id: run_id.to_string(),
                iterations: 1,
                aco_configuration: None,
                best_evacuation_time: "0h01m00s".to_string(),
                best_clearing_time: "0h02m00s".to_string(),
                best_graph_evacuation_time: "0h01m30s".to_string(),
                population: 10,
                file_name_of_best_evacuation: Some("0.events.xml".to_string()),
                file_name_of_best_clearing: Some("0.events.xml".to_string()),
                file_name_of_best_graph_evacuation_time: Some("0.events.xml".to_string()),
                reroute_weight: Some(0.1),
                exp_beta_weight: None,
                skipped_iterations: Vec::new(),
            },
            events: Vec::new(),
        }
    }

    #[test]
    fn test_format_tag_number() {
        assert_eq!(format_tag_number(1.0), "1.0");
        assert_eq!(format_tag_number(10.0), "10.0");
        assert_eq!(format_tag_number(0.25), "0.25");
        assert_eq!(format_tag_number(0.1), "0.1");
    }

    #[test]
    fn test_base_name_for_plain_algorithm() {
        let weights = ReplanningWeights::from_strategies(&[0.1, 0.9]).unwrap();
        let name = output_base_name(&identity(RoutingAlgorithm::SpeedyAlt, None), &weights);
        assert_eq!(name, "output-speedyalt-i20-weight-rer0.1-exp0.9");

        let name = output_base_name(&identity(RoutingAlgorithm::Dijkstra, None), &ReplanningWeights::default());
        assert_eq!(name, "output-dijkstra-i20-weight");
    }

    #[test]
    fn test_base_name_for_aco() {
        let params = AcoParameters {
            heuristic_type: HeuristicType::LinkLength,
            aco_type: AcoVariant::Variant2,
            ..AcoParameters::default()
        };
        let weights = ReplanningWeights::from_strategies(&[1.0]).unwrap();
        let name = output_base_name(&identity(RoutingAlgorithm::Aco, Some(params)), &weights);
        assert_eq!(name, "output-aco-i20-weight-rer1.0-tcstm-a1.0-b2.0-p0.1-e0.5-q1.0-hl");
    }

    #[test]
    fn test_three_strategies_unsupported() {
        assert!(matches!(
            ReplanningWeights::from_strategies(&[0.2, 0.3, 0.5]),
            Err(ReportError::UnsupportedConfiguration(_))
        ));
    }

    #[test]
    fn test_json_field_names() {
        let value = serde_json::to_value(report("abc")).unwrap();
        let common = &value["common_data"];
        assert_eq!(common["runId"], "abc");
        assert_eq!(common["RandomPlanSelector_ReRoute"], 0.1);
        assert!(common.get("ExpBetaPlanChanger").is_none());
        assert!(common.get("aco_configuration").is_none());
        assert!(common.get("skipped_iterations").is_none());
        assert!(value["events"].is_array());
    }

    #[test]
    fn test_write_then_detect_existing() {
        let dir = TempDir::new().unwrap();
        let first = write_report(dir.path(), "output-x", &report("abc")).unwrap();
        let path = dir.path().join("output-x.json");
        assert_eq!(first, WriteOutcome::Written(path.clone()));

        let bytes = fs::read(&path).unwrap();
        let second = write_report(dir.path(), "output-x", &report("abc")).unwrap();
        assert_eq!(second, WriteOutcome::AlreadyReported(path.clone()));
        assert_eq!(fs::read(&path).unwrap(), bytes);
        assert_eq!(find_existing_report(dir.path(), "output-x", "abc"), Some(path));
    }

    #[test]
    fn test_other_run_gets_suffix() {
        let dir = TempDir::new().unwrap();
        write_report(dir.path(), "output-x", &report("abc")).unwrap();
        fs::write(dir.path().join("output-x_1.json"), "not json").unwrap();

        let outcome = write_report(dir.path(), "output-x", &report("def")).unwrap();
        assert_eq!(outcome, WriteOutcome::Written(dir.path().join("output-x_2.json")));
        assert_eq!(
            find_existing_report(dir.path(), "output-x", "def"),
            Some(dir.path().join("output-x_2.json"))
        );
        assert_eq!(find_existing_report(dir.path(), "output-x", "ghi"), None);
    }

    #[test]
    fn test_stored_report_round_trips() {
        let dir = TempDir::new().unwrap();
        let original = report("abc");
        write_report(dir.path(), "output-x", &original).unwrap();
        let stored: AnalysisReport =
            serde_json::from_str(&fs::read_to_string(dir.path().join("output-x.json")).unwrap()).unwrap();
        assert_eq!(stored, original);
    }

    #[test]
    fn test_slot_filled_late_by_same_run_is_not_duplicated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("output-x.json");
        fs::write(&path, "").unwrap();

        let late_path = path.clone();
        let filler = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(40));
            fs::write(&late_path, serde_json::to_string_pretty(&report("abc")).unwrap()).unwrap();
        });

        let outcome = write_report(dir.path(), "output-x", &report("abc")).unwrap();
        filler.join().unwrap();
        assert_eq!(outcome, WriteOutcome::AlreadyReported(path));
        assert!(!dir.path().join("output-x_1.json").exists());
    }

    #[test]
    fn test_abandoned_empty_slot_is_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("output-x.json"), "").unwrap();

        let outcome = write_report(dir.path(), "output-x", &report("abc")).unwrap();
        assert_eq!(outcome, WriteOutcome::Written(dir.path().join("output-x_1.json")));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_occupies_slot() {
        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink(dir.path().join("nowhere"), dir.path().join("output-x.json")).unwrap();

        let outcome = write_report(dir.path(), "output-x", &report("abc")).unwrap();
        assert_eq!(outcome, WriteOutcome::Written(dir.path().join("output-x_1.json")));
    }

    #[test]
    fn test_write_leaves_no_staging_files() {
        let dir = TempDir::new().unwrap();
        write_report(dir.path(), "output-x", &report("abc")).unwrap();
        write_report(dir.path(), "output-x", &report("abc")).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["output-x.json"]);
    }

    #[test]
    fn test_concurrent_writers_publish_one_report() {
        let dir = TempDir::new().unwrap();
        let outcomes: Vec<WriteOutcome> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| write_report(dir.path(), "output-x", &report("abc")).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let written = outcomes
            .iter()
            .filter(|o| matches!(o, WriteOutcome::Written(_)))
            .count();
        assert_eq!(written, 1);
        assert!(!dir.path().join("output-x_1.json").exists());
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(write_report(&missing, "output-x", &report("abc")).is_err());
    }
}

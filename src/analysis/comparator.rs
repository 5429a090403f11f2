//! Cross-iteration comparison of one run.
//!
//! Every iteration's event log is analyzed independently (in parallel); the
//! per-iteration metrics are then folded, in file order, into the best
//! evacuation, clearing and graph evacuation times, and the aggregate is
//! persisted once per run id.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Local, NaiveDateTime};
use rayon::prelude::*;

use super::iteration::{analyze_event_file, AnalysisSettings};
use super::report::{
    find_existing_report, output_base_name, write_report, AnalysisReport, CommonData, IterationRecord,
    ReplanningWeights, SkippedIteration, WriteOutcome,
};
use super::types::*;
use crate::config::AnalyzerConfig;
use crate::error::ReportError;
use crate::network::LinkLocator;
use crate::provider::{load_run_identity, ConfigurationProvider, RunIdentity};
use crate::utils::discovery::{discover_event_files, IterationFile};
use crate::utils::duration::{format_duration, format_optional};

/// What to compare and where to put the result.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRequest {
    pub iterations_dir: PathBuf,
    pub event_suffixes: Vec<String>,
    pub output_dir: PathBuf,
    /// Scenario population; falls back to the largest observed arrival count
    pub population: Option<u64>,
    /// Replanning strategy weights in declaration order
    pub strategy_weights: Vec<f64>,
}

impl ComparisonRequest {
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self {
            iterations_dir: config.input.iterations_dir.clone(),
            event_suffixes: config.input.event_suffixes.clone(),
            output_dir: config.output.dir.clone(),
            population: config.scenario.population,
            strategy_weights: config.strategy_weights(),
        }
    }
}

/// Result of a comparison pass.
#[derive(Debug, Clone)]
pub enum ComparisonOutcome {
    Written { path: PathBuf, report: AnalysisReport },
    /// A report for this run id exists; nothing was analyzed
    AlreadyReported { path: PathBuf },
    /// The report was built but could not be persisted
    WriteFailed { report: AnalysisReport, reason: String },
}

/// Outcome of one iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    Analyzed(IterationMetrics),
    Skipped { file_name: String, reason: String },
}

/// Best value of one metric and the file it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct BestRecord {
    pub time: SimTime,
    pub file_name: String,
}

/// Running minimum of the three completion metrics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BestOfThree {
    pub evacuation: Option<BestRecord>,
    pub clearing: Option<BestRecord>,
    pub graph_evacuation: Option<BestRecord>,
}

impl BestOfThree {
    /// Fold metrics in order. Only a strictly smaller value replaces the
    /// current best, so the earliest file wins ties.
    pub fn from_metrics<'a>(metrics: impl IntoIterator<Item = &'a IterationMetrics>) -> Self {
        metrics.into_iter().fold(Self::default(), Self::observe)
    }

    pub fn observe(mut self, metrics: &IterationMetrics) -> Self {
        consider(&mut self.evacuation, metrics.evacuation_time, &metrics.file_name);
        consider(&mut self.clearing, metrics.clearing_time, &metrics.file_name);
        consider(&mut self.graph_evacuation, metrics.graph_evacuation_time, &metrics.file_name);
        self
    }
}

fn consider(best: &mut Option<BestRecord>, time: SimTime, file_name: &str) {
    if best.as_ref().map_or(true, |current| time < current.time) {
        *best = Some(BestRecord {
            time,
            file_name: file_name.to_string(),
        });
    }
}

pub struct RunComparator<'a> {
    provider: &'a dyn ConfigurationProvider,
    locator: &'a dyn LinkLocator,
    settings: AnalysisSettings,
}

impl<'a> RunComparator<'a> {
    pub fn new(
        provider: &'a dyn ConfigurationProvider,
        locator: &'a dyn LinkLocator,
        settings: AnalysisSettings,
    ) -> Self {
        Self {
            provider,
            locator,
            settings,
        }
    }

    /// Compare all iterations, stamping the report with the current time.
    pub fn run(&self, request: &ComparisonRequest) -> Result<ComparisonOutcome, ReportError> {
        self.run_at(request, Local::now().naive_local())
    }

    pub fn run_at(&self, request: &ComparisonRequest, now: NaiveDateTime) -> Result<ComparisonOutcome, ReportError> {
        let files = self.discover(request)?;
        let identity = load_run_identity(self.provider, files.len())?;
        let weights = ReplanningWeights::from_strategies(&request.strategy_weights)?;
        let base_name = output_base_name(&identity, &weights);

        std::fs::create_dir_all(&request.output_dir).map_err(|source| ReportError::OutputUnwritable {
            path: request.output_dir.clone(),
            source,
        })?;

        if let Some(path) = find_existing_report(&request.output_dir, &base_name, &identity.run_id) {
            log::info!(
                "Run {} already reported in {}, skipping analysis",
                identity.run_id,
                path.display()
            );
            return Ok(ComparisonOutcome::AlreadyReported { path });
        }

        let outcomes = self.analyze_all(&files, &request.output_dir)?;
        let report = build_report(&identity, &weights, request.population, &outcomes, now);

        match write_report(&request.output_dir, &base_name, &report) {
            Ok(WriteOutcome::Written(path)) => Ok(ComparisonOutcome::Written { path, report }),
            Ok(WriteOutcome::AlreadyReported(path)) => {
                log::info!("Run {} was reported concurrently in {}", identity.run_id, path.display());
                Ok(ComparisonOutcome::AlreadyReported { path })
            }
            Err(e) => {
                log::error!("Failed to write report {}: {}", base_name, e);
                Ok(ComparisonOutcome::WriteFailed {
                    report,
                    reason: e.to_string(),
                })
            }
        }
    }

    fn discover(&self, request: &ComparisonRequest) -> Result<Vec<IterationFile>, ReportError> {
        if !request.iterations_dir.is_dir() {
            return Err(ReportError::MissingIterations(request.iterations_dir.clone()));
        }
        let files = discover_event_files(&request.iterations_dir, &request.event_suffixes)
            .map_err(|_| ReportError::MissingIterations(request.iterations_dir.clone()))?;
        if files.is_empty() {
            return Err(ReportError::NoEventFiles(request.iterations_dir.clone()));
        }
        log::info!(
            "Comparing {} iterations under {}",
            files.len(),
            request.iterations_dir.display()
        );
        Ok(files)
    }

    /// Analyze every file in parallel, keeping file order. Stops scheduling
    /// new files once the output directory is gone or write-protected.
    fn analyze_all(&self, files: &[IterationFile], output_dir: &Path) -> Result<Vec<IterationOutcome>, ReportError> {
        let aborted = AtomicBool::new(false);

        let outcomes: Vec<Option<IterationOutcome>> = files
            .par_iter()
            .map(|file| {
                if aborted.load(Ordering::Relaxed) {
                    return None;
                }
                if !output_dir_writable(output_dir) {
                    aborted.store(true, Ordering::Relaxed);
                    return None;
                }
                Some(self.analyze_one(file))
            })
            .collect();

        if aborted.load(Ordering::Relaxed) {
            return Err(ReportError::OutputUnwritable {
                path: output_dir.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "output directory disappeared or became read-only",
                ),
            });
        }

        let outcomes: Vec<IterationOutcome> = outcomes.into_iter().flatten().collect();
        let analyzed = outcomes
            .iter()
            .filter(|o| matches!(o, IterationOutcome::Analyzed(_)))
            .count();
        log::info!("Analyzed {} of {} iterations", analyzed, files.len());
        Ok(outcomes)
    }

    fn analyze_one(&self, file: &IterationFile) -> IterationOutcome {
        let file_name = file.file_name();
        // only scalar metrics survive, so cells need no replay history
        let settings = AnalysisSettings {
            keep_history: false,
            ..self.settings
        };
        let result = analyze_event_file(&file.path, self.locator, &settings)
            .and_then(|analysis| analysis.metrics());

        match result {
            Ok(metrics) => {
                log::debug!(
                    "{}: evacuation {}, clearing {}, graph {}",
                    file_name,
                    format_duration(metrics.evacuation_time),
                    format_duration(metrics.clearing_time),
                    format_duration(metrics.graph_evacuation_time)
                );
                IterationOutcome::Analyzed(metrics)
            }
            Err(e) => {
                log::warn!("Skipping {}: {}", file.path.display(), e);
                IterationOutcome::Skipped {
                    file_name,
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// Assemble the report document. Pure apart from the given clock value.
pub fn build_report(
    identity: &RunIdentity,
    weights: &ReplanningWeights,
    population: Option<u64>,
    outcomes: &[IterationOutcome],
    now: NaiveDateTime,
) -> AnalysisReport {
    let metrics: Vec<&IterationMetrics> = outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            IterationOutcome::Analyzed(metrics) => Some(metrics),
            IterationOutcome::Skipped { .. } => None,
        })
        .collect();
    let skipped_iterations: Vec<SkippedIteration> = outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            IterationOutcome::Skipped { file_name, reason } => Some(SkippedIteration {
                file_name: file_name.clone(),
                reason: reason.clone(),
            }),
            IterationOutcome::Analyzed(_) => None,
        })
        .collect();

    if metrics.is_empty() {
        log::warn!("No iteration of run {} could be analyzed", identity.run_id);
    }

    let best = BestOfThree::from_metrics(metrics.iter().copied());
    let population = population
        .or_else(|| metrics.iter().map(|m| m.sample_size).max())
        .unwrap_or(0);
    let elapsed = (now - identity.started_at).num_milliseconds() as f64 / 1000.0;

    let events = metrics
        .iter()
        .map(|m| IterationRecord {
            file_name: m.file_name.clone(),
            evacuation_time: format_duration(m.evacuation_time),
            clearing_time: format_duration(m.clearing_time),
            graph_evacuation_time: format_duration(m.graph_evacuation_time),
            population_observed: m.sample_size,
            grid_anomalies: m.grid_anomalies,
        })
        .collect();

    AnalysisReport {
        common_data: CommonData {
            time: format_duration(elapsed),
            started_at: identity.started_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
            routing_algorithm_type: identity.routing_algorithm.to_string(),
            run_id: identity.run_id.clone(),
            iterations: identity.iteration_count,
            aco_configuration: identity.algorithm_parameters.clone(),
            best_evacuation_time: format_optional(best.evacuation.as_ref().map(|b| b.time)),
            best_clearing_time: format_optional(best.clearing.as_ref().map(|b| b.time)),
            best_graph_evacuation_time: format_optional(best.graph_evacuation.as_ref().map(|b| b.time)),
            population,
            file_name_of_best_evacuation: best.evacuation.map(|b| b.file_name),
            file_name_of_best_clearing: best.clearing.map(|b| b.file_name),
            file_name_of_best_graph_evacuation_time: best.graph_evacuation.map(|b| b.file_name),
            reroute_weight: weights.reroute,
            exp_beta_weight: weights.exp_beta,
            skipped_iterations,
        },
        events,
    }
}

/// Whether `dir` still exists as a directory without write protection.
fn output_dir_writable(dir: &Path) -> bool {
    std::fs::metadata(dir).is_ok_and(|meta| meta.is_dir() && !meta.permissions().readonly())
}

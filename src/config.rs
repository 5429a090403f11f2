//! Analyzer configuration.
//!
//! Every section and field has a default, so an empty YAML document is a
//! valid configuration:
//!
//! ```yaml
//! general:
//!   log_level: info
//!   threads: 4
//! input:
//!   iterations_dir: output/ITERS
//!   config_dir: evacuation-config
//!   network: output/output_network.xml
//! scenario:
//!   population: 1200
//!   replanning:
//!     - name: ReRoute
//!       weight: 0.1
//!     - name: ChangeExpBeta
//!       weight: 0.9
//! grid:
//!   cell_size: 25.0
//!   measure: count
//!   top_k: 5
//! coloring:
//!   palette: green_yellow_red
//!   transparency: 0.6
//! time_series:
//!   bucket_width: 1s
//! output:
//!   dir: analysis_output
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::coloring::Palette;
use crate::analysis::grid::DensityMeasure;
use crate::analysis::iteration::AnalysisSettings;
use crate::analysis::time_series::DEFAULT_BUCKET_WIDTH;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub general: GeneralConfig,
    pub input: InputConfig,
    pub scenario: ScenarioConfig,
    pub grid: GridConfig,
    pub coloring: ColoringConfig,
    pub time_series: TimeSeriesConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
    /// Worker threads for per-iteration analysis (0 = one per core)
    pub threads: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Root of the per-iteration output directories
    pub iterations_dir: PathBuf,
    /// Directory holding `routingAlgorithmType.json` and `aco-configuration.json`
    pub config_dir: PathBuf,
    /// Network file used to place links on the grid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<PathBuf>,
    pub event_suffixes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Scenario population; the largest observed arrival count when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub population: Option<u64>,
    /// Replanning strategies in declaration order
    pub replanning: Vec<StrategySetting>,
}

/// One replanning strategy and its selection weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySetting {
    pub name: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub cell_size: f64,
    pub measure: DensityMeasure,
    pub top_k: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColoringConfig {
    pub palette: Palette,
    pub transparency: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSeriesConfig {
    #[serde(with = "humantime_serde")]
    pub bucket_width: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl AnalyzerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.general.log_level.trim().is_empty() {
            return Err(ValidationError::InvalidGeneral(
                "log_level cannot be empty".to_string(),
            ));
        }

        if self.input.event_suffixes.is_empty() {
            return Err(ValidationError::InvalidInput(
                "event_suffixes must list at least one suffix".to_string(),
            ));
        }
        if let Some(suffix) = self.input.event_suffixes.iter().find(|s| s.trim().is_empty()) {
            return Err(ValidationError::InvalidInput(format!(
                "event suffix '{}' is empty",
                suffix
            )));
        }

        if self.scenario.population == Some(0) {
            return Err(ValidationError::InvalidScenario(
                "population must be positive".to_string(),
            ));
        }
        for strategy in &self.scenario.replanning {
            if !strategy.weight.is_finite() || strategy.weight < 0.0 {
                return Err(ValidationError::InvalidScenario(format!(
                    "strategy '{}' has invalid weight {}",
                    strategy.name, strategy.weight
                )));
            }
        }

        if !self.grid.cell_size.is_finite() || self.grid.cell_size <= 0.0 {
            return Err(ValidationError::InvalidGrid(format!(
                "cell_size must be positive, got {}",
                self.grid.cell_size
            )));
        }
        if self.grid.top_k == 0 {
            return Err(ValidationError::InvalidGrid("top_k must be at least 1".to_string()));
        }

        if !(0.0..=1.0).contains(&self.coloring.transparency) {
            return Err(ValidationError::InvalidColoring(format!(
                "transparency must be within [0, 1], got {}",
                self.coloring.transparency
            )));
        }

        if self.time_series.bucket_width.is_zero() {
            return Err(ValidationError::InvalidTimeSeries(
                "bucket_width must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Settings of the per-iteration pipeline.
    pub fn analysis_settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            grid_size: self.grid.cell_size,
            measure: self.grid.measure,
            bucket_width: self.time_series.bucket_width,
            keep_history: true,
        }
    }

    /// Replanning weights in declaration order.
    pub fn strategy_weights(&self) -> Vec<f64> {
        self.scenario.replanning.iter().map(|s| s.weight).collect()
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid input configuration: {0}")]
    InvalidInput(String),
    #[error("Invalid scenario configuration: {0}")]
    InvalidScenario(String),
    #[error("Invalid grid configuration: {0}")]
    InvalidGrid(String),
    #[error("Invalid coloring configuration: {0}")]
    InvalidColoring(String),
    #[error("Invalid time series configuration: {0}")]
    InvalidTimeSeries(String),
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            threads: 0,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            iterations_dir: PathBuf::from("output/ITERS"),
            config_dir: PathBuf::from("evacuation-config"),
            network: None,
            event_suffixes: vec![
                ".events.xml.gz".to_string(),
                ".events.xml".to_string(),
                ".events.xml.zst".to_string(),
            ],
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_size: 10.0,
            measure: DensityMeasure::Count,
            top_k: 5,
        }
    }
}

impl Default for ColoringConfig {
    fn default() -> Self {
        Self {
            palette: Palette::GreenYellowRed,
            transparency: 0.6,
        }
    }
}

impl Default for TimeSeriesConfig {
    fn default() -> Self {
        Self {
            bucket_width: DEFAULT_BUCKET_WIDTH,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("analysis_output"),
        }
    }
}

//! Run identity and routing-algorithm parameters.
//!
//! The simulation launcher leaves two small JSON records behind before every
//! run: the run identity (`routingAlgorithmType`) and, for ACO routing, the
//! algorithm parameters (`aco-configuration`). They are read through a
//! [`ConfigurationProvider`] so tests can swap the directory for a map.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;

/// Key of the run identity record
pub const RUN_IDENTITY_KEY: &str = "routingAlgorithmType";
/// Key of the ACO parameter record
pub const ALGORITHM_PARAMETERS_KEY: &str = "aco-configuration";

/// Key-value access to the launcher's records. `Ok(None)` means the record
/// does not exist.
pub trait ConfigurationProvider: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, ConfigError>;
}

/// Reads `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileConfigurationProvider {
    dir: PathBuf,
}

impl FileConfigurationProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl ConfigurationProvider for FileConfigurationProvider {
    fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let path = self.record_path(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ConfigError::unavailable(
                key,
                format!("failed to read {}: {}", path.display(), e),
            )),
        }
    }
}

/// In-memory records.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigurationProvider {
    records: HashMap<String, String>,
}

impl MemoryConfigurationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.records.insert(key.to_string(), value.into());
    }
}

impl ConfigurationProvider for MemoryConfigurationProvider {
    fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        Ok(self.records.get(key).cloned())
    }
}

/// Routing algorithms the launcher can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoutingAlgorithm {
    #[serde(rename = "ACO")]
    Aco,
    Dijkstra,
    AStarLandmarks,
    FastDijkstra,
    FastAStarLandmarks,
    #[serde(rename = "SpeedyALT")]
    SpeedyAlt,
}

impl RoutingAlgorithm {
    /// Name as written by the launcher.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingAlgorithm::Aco => "ACO",
            RoutingAlgorithm::Dijkstra => "Dijkstra",
            RoutingAlgorithm::AStarLandmarks => "AStarLandmarks",
            RoutingAlgorithm::FastDijkstra => "FastDijkstra",
            RoutingAlgorithm::FastAStarLandmarks => "FastAStarLandmarks",
            RoutingAlgorithm::SpeedyAlt => "SpeedyALT",
        }
    }

    /// Whether the algorithm reads a parameter record.
    pub fn is_parameter_driven(&self) -> bool {
        matches!(self, RoutingAlgorithm::Aco)
    }
}

impl fmt::Display for RoutingAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACO" => Ok(RoutingAlgorithm::Aco),
            "Dijkstra" => Ok(RoutingAlgorithm::Dijkstra),
            "AStarLandmarks" => Ok(RoutingAlgorithm::AStarLandmarks),
            "FastDijkstra" => Ok(RoutingAlgorithm::FastDijkstra),
            "FastAStarLandmarks" => Ok(RoutingAlgorithm::FastAStarLandmarks),
            "SpeedyALT" => Ok(RoutingAlgorithm::SpeedyAlt),
            other => Err(format!("unknown routing algorithm '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HeuristicType {
    #[default]
    #[serde(rename = "TRAVEL_COST")]
    TravelCost,
    #[serde(rename = "LINK_LENGTH")]
    LinkLength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AcoVariant {
    /// Classic ACO
    #[default]
    #[serde(rename = "VARIANT_1")]
    Variant1,
    /// Custom ACO
    #[serde(rename = "VARIANT_2")]
    Variant2,
}

/// ACO tuning parameters. The launcher writes numbers as strings, so both
/// forms are accepted; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AcoParameters {
    #[serde(deserialize_with = "number_or_string")]
    pub number_of_ants: u32,
    #[serde(deserialize_with = "number_or_string")]
    pub pheromone_constant: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub alpha: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub beta: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub evaporation_rate: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub q: f64,
    pub heuristic_type: HeuristicType,
    pub aco_type: AcoVariant,
}

impl Default for AcoParameters {
    fn default() -> Self {
        Self {
            number_of_ants: 20,
            pheromone_constant: 0.1,
            alpha: 1.0,
            beta: 2.0,
            evaporation_rate: 0.5,
            q: 1.0,
            heuristic_type: HeuristicType::TravelCost,
            aco_type: AcoVariant::Variant1,
        }
    }
}

fn number_or_string<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: fmt::Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw<T> {
        Number(T),
        Text(String),
    }

    match Raw::<T>::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) => text
            .trim()
            .parse()
            .map_err(|e| D::Error::custom(format!("invalid number '{}': {}", text, e))),
    }
}

/// Identity of the run whose iterations are being compared.
#[derive(Debug, Clone, PartialEq)]
pub struct RunIdentity {
    pub run_id: String,
    pub routing_algorithm: RoutingAlgorithm,
    pub started_at: NaiveDateTime,
    pub iteration_count: usize,
    /// Present only for parameter-driven algorithms
    pub algorithm_parameters: Option<AcoParameters>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunIdentityRecord {
    routing_algorithm_type: String,
    run_id: String,
    start: String,
}

/// Load the run identity, plus the algorithm parameters when the algorithm
/// needs them.
pub fn load_run_identity(
    provider: &dyn ConfigurationProvider,
    iteration_count: usize,
) -> Result<RunIdentity, ConfigError> {
    let raw = provider
        .get(RUN_IDENTITY_KEY)?
        .ok_or_else(|| ConfigError::unavailable(RUN_IDENTITY_KEY, "record missing"))?;

    let record: RunIdentityRecord = serde_json::from_str(raw.trim())
        .map_err(|e| ConfigError::unavailable(RUN_IDENTITY_KEY, e.to_string()))?;

    if record.run_id.trim().is_empty() {
        return Err(ConfigError::unavailable(RUN_IDENTITY_KEY, "empty runId"));
    }
    let routing_algorithm: RoutingAlgorithm = record
        .routing_algorithm_type
        .parse()
        .map_err(|e: String| ConfigError::unavailable(RUN_IDENTITY_KEY, e))?;
    let started_at = parse_start(&record.start)
        .ok_or_else(|| ConfigError::unavailable(RUN_IDENTITY_KEY, format!("invalid start '{}'", record.start)))?;

    let algorithm_parameters = if routing_algorithm.is_parameter_driven() {
        Some(load_algorithm_parameters(provider)?)
    } else {
        None
    };

    log::info!(
        "Run {} ({}) started at {}",
        record.run_id,
        routing_algorithm,
        started_at
    );

    Ok(RunIdentity {
        run_id: record.run_id,
        routing_algorithm,
        started_at,
        iteration_count,
        algorithm_parameters,
    })
}

/// Load ACO parameters, substituting the defaults when the record is absent.
pub fn load_algorithm_parameters(
    provider: &dyn ConfigurationProvider,
) -> Result<AcoParameters, ConfigError> {
    match provider.get(ALGORITHM_PARAMETERS_KEY)? {
        Some(raw) => serde_json::from_str(raw.trim())
            .map_err(|e| ConfigError::unavailable(ALGORITHM_PARAMETERS_KEY, e.to_string())),
        None => {
            log::info!("No {} record, using default ACO parameters", ALGORITHM_PARAMETERS_KEY);
            Ok(AcoParameters::default())
        }
    }
}

/// ISO local date-time, optionally wrapped in an extra pair of quotes.
fn parse_start(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim().trim_matches('"');
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

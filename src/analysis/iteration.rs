//! Single-pass analysis of one iteration's event log.
//!
//! The grid aggregator, both cluster extractors and the time-series builder
//! all observe the same ordered stream, one event at a time.

use std::path::Path;
use std::time::Duration;

use super::clusters::LinkClusterExtractor;
use super::event_reader::EventLog;
use super::grid::{DensityMeasure, GridAggregator};
use super::time_series::{ArrivalSeries, TimeSeriesBuilder, DEFAULT_BUCKET_WIDTH};
use super::types::*;
use crate::error::{AnalysisError, ReadError};
use crate::network::LinkLocator;

/// Knobs of the per-iteration pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisSettings {
    pub grid_size: f64,
    pub measure: DensityMeasure,
    pub bucket_width: Duration,
    /// Keep each cell's population history for replay at a given time
    pub keep_history: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            grid_size: 10.0,
            measure: DensityMeasure::Count,
            bucket_width: DEFAULT_BUCKET_WIDTH,
            keep_history: true,
        }
    }
}

/// Result of one pass: the retained event data and the arrival series.
#[derive(Debug, Clone)]
pub struct IterationAnalysis {
    pub data: EventData,
    pub series: ArrivalSeries,
}

impl IterationAnalysis {
    /// Scalar metrics of the iteration.
    ///
    /// An iteration without arrivals fails with `EmptySample` before the
    /// cluster lists are looked at.
    pub fn metrics(&self) -> Result<IterationMetrics, AnalysisError> {
        let graph_evacuation_time = self.series.graph_evacuation_time()?;
        let evacuation_time = self
            .data
            .completion_time(Mode::Evacuation)
            .ok_or(AnalysisError::NoLinkActivity(Mode::Evacuation))?;
        let clearing_time = self
            .data
            .completion_time(Mode::Clearing)
            .ok_or(AnalysisError::NoLinkActivity(Mode::Clearing))?;

        Ok(IterationMetrics {
            file_name: self.data.file_name.clone(),
            evacuation_time,
            clearing_time,
            graph_evacuation_time,
            sample_size: self.series.sample_size(),
            grid_anomalies: self.data.grid_anomalies,
        })
    }
}

/// Run the pipeline over an already opened event sequence.
pub fn analyze_events<I>(
    file_name: &str,
    events: I,
    locator: &dyn LinkLocator,
    settings: &AnalysisSettings,
) -> Result<IterationAnalysis, AnalysisError>
where
    I: IntoIterator<Item = Result<Event, ReadError>>,
{
    let mut grid =
        GridAggregator::new(locator, settings.grid_size, settings.measure).with_history(settings.keep_history);
    let mut evacuation = LinkClusterExtractor::new(Mode::Evacuation);
    let mut clearing = LinkClusterExtractor::new(Mode::Clearing);
    let mut series = TimeSeriesBuilder::new(settings.bucket_width);

    let mut first_event_time = None;
    let mut last_event_time = None;
    let mut processed = 0u64;

    for event in events {
        let event = event?;
        first_event_time.get_or_insert(event.timestamp);
        last_event_time = Some(event.timestamp);

        grid.apply_event(&event);
        evacuation.observe(&event);
        clearing.observe(&event);
        series.observe(&event);
        processed += 1;
    }

    let run_end = last_event_time.unwrap_or(0.0);
    let mut data = EventData {
        file_name: file_name.to_string(),
        first_event_time,
        last_event_time,
        grid_anomalies: grid.anomalies(),
        unlocated_events: grid.unlocated(),
        ..EventData::default()
    };
    data.clusters.insert(Mode::Evacuation, evacuation.finish(&grid, run_end));
    data.clusters.insert(Mode::Clearing, clearing.finish(&grid, run_end));
    data.grid = grid.into_snapshot();

    let series = series.finish();
    data.arrival_times = series.samples().to_vec();
    data.sample_size = series.sample_size();

    log::debug!(
        "{}: {} events, {} arrivals, {} cells, {} anomalies, {} unlocated",
        file_name,
        processed,
        data.sample_size,
        data.grid.len(),
        data.grid_anomalies,
        data.unlocated_events
    );

    Ok(IterationAnalysis { data, series })
}

/// Open and analyze one event log file.
pub fn analyze_event_file(
    path: &Path,
    locator: &dyn LinkLocator,
    settings: &AnalysisSettings,
) -> Result<IterationAnalysis, AnalysisError> {
    let log = EventLog::open(path)?;
    let events = log.events()?;
    analyze_events(&log.file_name(), events, locator, settings)
}

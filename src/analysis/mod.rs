//! Evacuation event log analysis.
//!
//! This module turns simulation event logs into density grids, per-link
//! completion times and arrival curves, and compares the iterations of a run.

pub mod types;
pub mod event_reader;
pub mod grid;
pub mod clusters;
pub mod time_series;
pub mod coloring;
pub mod iteration;
pub mod comparator;
pub mod report;
pub mod export;

pub use types::*;
pub use event_reader::EventLog;
pub use grid::{DensityMeasure, GridAggregator};
pub use clusters::LinkClusterExtractor;
pub use time_series::{ArrivalSeries, TimeSeriesBuilder};
pub use iteration::{analyze_event_file, analyze_events, AnalysisSettings, IterationAnalysis};
pub use comparator::{ComparisonOutcome, ComparisonRequest, RunComparator};
pub use report::{print_summary, AnalysisReport};
pub use export::{build_export, write_export, ExportOptions};

//! JSON export of one iteration for external renderers.
//!
//! Cells are colored either by their peak population over the whole run or,
//! when a time is given, by their density at that moment.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use color_eyre::eyre::{Context, Result};
use serde::Serialize;

use super::coloring::{classify, classify_cell, CellColor, ColorBasis, Palette};
use super::grid::{density_of, top_k_by_peak, top_k_cells, DensityMeasure};
use super::iteration::{AnalysisSettings, IterationAnalysis};
use super::time_series::calendar_time;
use super::types::*;

/// Coloring knobs of an export.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportOptions {
    pub top_k: usize,
    pub palette: Palette,
    pub transparency: f32,
    /// Color the grid state at this simulated time instead of peaks
    pub at: Option<SimTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GridExport {
    pub file_name: String,
    pub cell_size: f64,
    pub measure: DensityMeasure,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at: Option<SimTime>,
    /// Value of the k-th ranked cell; every cell at or above it is drawn in the top color
    pub threshold: f64,
    pub cells: Vec<ExportedCell>,
    pub clusters: BTreeMap<Mode, Vec<LinkClusterEntry>>,
    pub arrival_series: Vec<ExportedSample>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportedCell {
    pub x: i64,
    pub y: i64,
    pub population_count: u32,
    pub density: f64,
    pub peak_count: u32,
    pub entries: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_emptied_at: Option<SimTime>,
    pub color: CellColor,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportedSample {
    pub time: SimTime,
    pub calendar_time: String,
    pub fraction: f64,
}

/// Cells as they were at `time`.
pub fn cells_at(cells: &[GridCell], time: SimTime, measure: DensityMeasure, cell_size: f64) -> Vec<GridCell> {
    let area = cell_size * cell_size;
    cells
        .iter()
        .map(|cell| {
            let mut state = cell.clone();
            state.population_count = cell.population_at(time);
            state.density = density_of(state.population_count, measure, area);
            state
        })
        .collect()
}

pub fn build_export(analysis: &IterationAnalysis, settings: &AnalysisSettings, options: &ExportOptions) -> GridExport {
    let data = &analysis.data;
    let k = options.top_k.max(1);

    let (cells, threshold, colors): (Vec<GridCell>, f64, Vec<CellColor>) = match options.at {
        Some(time) => {
            let cells = cells_at(&data.grid, time, settings.measure, settings.grid_size);
            let threshold = top_k_cells(&cells, k).last().map_or(0.0, |cell| cell.density);
            let colors = cells
                .iter()
                .map(|cell| classify_cell(cell, threshold, ColorBasis::Density, options.palette, options.transparency))
                .collect();
            (cells, threshold, colors)
        }
        None => {
            let threshold = top_k_by_peak(&data.grid, k)
                .last()
                .map_or(0.0, |cell| cell.peak_count as f64);
            let colors = data
                .grid
                .iter()
                .map(|cell| classify(cell.peak_count as f64, threshold, options.palette, options.transparency))
                .collect();
            (data.grid.clone(), threshold, colors)
        }
    };

    let cells = cells
        .into_iter()
        .zip(colors)
        .map(|(cell, color)| ExportedCell {
            x: cell.key.x,
            y: cell.key.y,
            population_count: cell.population_count,
            density: cell.density,
            peak_count: cell.peak_count,
            entries: cell.entries,
            last_emptied_at: cell.last_emptied_at,
            color,
        })
        .collect();

    let arrival_series = analysis
        .series
        .normalized()
        .unwrap_or_default()
        .into_iter()
        .map(|(time, fraction)| ExportedSample {
            time,
            calendar_time: calendar_time(time).format("%H:%M:%S").to_string(),
            fraction,
        })
        .collect();

    GridExport {
        file_name: data.file_name.clone(),
        cell_size: settings.grid_size,
        measure: settings.measure,
        at: options.at,
        threshold,
        cells,
        clusters: data.clusters.clone(),
        arrival_series,
    }
}

/// Write an export as pretty JSON
pub fn write_export(export: &GridExport, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(export).context("Failed to serialize grid export to JSON")?;

    fs::write(output_path, json)
        .with_context(|| format!("Failed to write grid export to {}", output_path.display()))?;

    log::info!("Grid export written to {}", output_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::coloring::ColorBucket;
    use crate::analysis::iteration::analyze_events;
    use crate::network::Coord;
    use std::collections::HashMap;

    fn analysis() -> IterationAnalysis {
        let mut links = HashMap::new();
        links.insert("a".to_string(), Coord::new(1.0, 1.0));
        links.insert("b".to_string(), Coord::new(15.0, 1.0));
        let events = vec![
            Event::new(0.0, EventKind::Departure, "1", "a"),
            Event::new(1.0, EventKind::Departure, "2", "a"),
            Event::new(2.0, EventKind::Departure, "3", "a"),
            Event::new(3.0, EventKind::Departure, "4", "a"),
            Event::new(5.0, EventKind::LinkLeave, "1", "a"),
            Event::new(5.0, EventKind::LinkEnter, "1", "b"),
            Event::new(9.0, EventKind::Arrival, "1", "b"),
        ];
        analyze_events("0.events.xml", events.into_iter().map(Ok), &links, &AnalysisSettings::default()).unwrap()
    }

    fn options(at: Option<SimTime>) -> ExportOptions {
        ExportOptions {
            top_k: 1,
            palette: Palette::GreenYellowRed,
            transparency: 0.6,
            at,
        }
    }

    #[test]
    fn test_peak_coloring() {
        let export = build_export(&analysis(), &AnalysisSettings::default(), &options(None));
        assert_eq!(export.threshold, 4.0);
        assert_eq!(export.cells.len(), 2);

        let a = &export.cells[0];
        assert_eq!((a.x, a.y, a.peak_count), (0, 0, 4));
        assert_eq!(a.color.bucket, ColorBucket::Red);
        let b = &export.cells[1];
        assert_eq!(b.peak_count, 1);
        assert_eq!(b.color.bucket, ColorBucket::Green);
    }

    #[test]
    fn test_coloring_at_time() {
        let export = build_export(&analysis(), &AnalysisSettings::default(), &options(Some(6.0)));
        assert_eq!(export.cells[0].population_count, 3);
        assert_eq!(export.cells[1].population_count, 1);
        assert_eq!(export.threshold, 3.0);
        assert_eq!(export.cells[1].color.bucket, ColorBucket::Yellow);

        let before = build_export(&analysis(), &AnalysisSettings::default(), &options(Some(0.5)));
        assert_eq!(before.cells[1].color.bucket, ColorBucket::Transparent);
    }

    #[test]
    fn test_series_uses_calendar_time() {
        let export = build_export(&analysis(), &AnalysisSettings::default(), &options(None));
        assert_eq!(export.arrival_series.len(), 1);
        assert_eq!(export.arrival_series[0].calendar_time, "23:00:09");
        assert_eq!(export.arrival_series[0].fraction, 1.0);
    }

    #[test]
    fn test_write_export() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("grid.json");
        let export = build_export(&analysis(), &AnalysisSettings::default(), &options(None));
        write_export(&export, &path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["file_name"], "0.events.xml");
        assert!(value["clusters"]["evacuation"].is_array());
        assert_eq!(value["cells"][0]["color"]["bucket"], "red");
    }
}

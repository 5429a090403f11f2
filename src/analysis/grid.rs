//! Spatial grid aggregation of agent positions.
//!
//! Every located event moves one agent into or out of the grid cell that
//! contains its link's origin node. Cells are square with edge length
//! `grid_size`; cell `(x, y)` covers `[x * size, (x + 1) * size)` on each axis.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::types::*;
use crate::network::{Coord, LinkLocator};

/// Warnings about clamped cells beyond this count are logged at debug level
const MAX_ANOMALY_WARNINGS: u64 = 10;

/// How a cell's population is turned into a density.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DensityMeasure {
    /// Density is the raw agent count
    #[default]
    Count,
    /// Agents per square unit of cell area
    Area,
}

/// Population change of a cell caused by one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellTransition {
    pub key: CellKey,
    pub before: u32,
    pub after: u32,
    /// A decrement hit an empty cell and was dropped
    pub clamped: bool,
}

/// Per-run population grid.
pub struct GridAggregator<'a> {
    locator: &'a dyn LinkLocator,
    grid_size: f64,
    measure: DensityMeasure,
    cells: HashMap<CellKey, GridCell>,
    keep_history: bool,
    anomalies: u64,
    unlocated: u64,
}

impl<'a> GridAggregator<'a> {
    /// `grid_size` must be positive and finite; the analyzer config enforces it.
    pub fn new(locator: &'a dyn LinkLocator, grid_size: f64, measure: DensityMeasure) -> Self {
        debug_assert!(grid_size.is_finite() && grid_size > 0.0, "invalid grid size {}", grid_size);
        Self {
            locator,
            grid_size,
            measure,
            cells: HashMap::new(),
            keep_history: true,
            anomalies: 0,
            unlocated: 0,
        }
    }

    /// Whether cells record their population after every change. Without
    /// history, `population_at` only knows that nothing happened yet.
    pub fn with_history(mut self, keep_history: bool) -> Self {
        self.keep_history = keep_history;
        self
    }

    pub fn grid_size(&self) -> f64 {
        self.grid_size
    }

    pub fn measure(&self) -> DensityMeasure {
        self.measure
    }

    /// Cell containing a coordinate.
    pub fn cell_key(&self, coord: Coord) -> CellKey {
        CellKey::new(
            (coord.x / self.grid_size).floor() as i64,
            (coord.y / self.grid_size).floor() as i64,
        )
    }

    /// Cell of a link's origin, if the link is known.
    pub fn locate(&self, link_id: &str) -> Option<CellKey> {
        self.locator.origin(link_id).map(|coord| self.cell_key(coord))
    }

    /// Apply one event. Returns `None` when the event's link cannot be located.
    pub fn apply_event(&mut self, event: &Event) -> Option<CellTransition> {
        let Some(key) = self.locate(&event.link_id) else {
            self.unlocated += 1;
            log::trace!("Link {} not in network, event skipped", event.link_id);
            return None;
        };

        let measure = self.measure;
        let cell_area = self.grid_size * self.grid_size;
        let cell = self.cells.entry(key).or_insert_with(|| GridCell::new(key));
        let before = cell.population_count;
        let mut clamped = false;

        if event.kind.adds_population() {
            cell.population_count += 1;
            cell.entries += 1;
            cell.peak_count = cell.peak_count.max(cell.population_count);
        } else if cell.population_count == 0 {
            clamped = true;
        } else {
            cell.population_count -= 1;
            if cell.population_count == 0 {
                cell.last_emptied_at = Some(event.timestamp);
            }
        }

        if cell.population_count != before {
            cell.density = density_of(cell.population_count, measure, cell_area);
            if self.keep_history {
                cell.history.push((event.timestamp, cell.population_count));
            }
        }
        let after = cell.population_count;

        if clamped {
            self.anomalies += 1;
            if self.anomalies <= MAX_ANOMALY_WARNINGS {
                log::warn!(
                    "Cell {} would go negative on '{}' of agent {} at {:.1}s (link {}); clamped at zero",
                    key,
                    event.kind,
                    event.agent_id,
                    event.timestamp,
                    event.link_id
                );
            } else {
                log::debug!("Cell {} clamped at zero at {:.1}s", key, event.timestamp);
            }
        }

        Some(CellTransition {
            key,
            before,
            after,
            clamped,
        })
    }

    pub fn cell(&self, key: CellKey) -> Option<&GridCell> {
        self.cells.get(&key)
    }

    pub fn cells(&self) -> impl Iterator<Item = &GridCell> {
        self.cells.values()
    }

    /// Population of a cell right after all events up to `time` were applied.
    pub fn population_at(&self, key: CellKey, time: SimTime) -> u32 {
        self.cells.get(&key).map_or(0, |cell| cell.population_at(time))
    }

    /// Number of decrements that had to be clamped at zero.
    pub fn anomalies(&self) -> u64 {
        self.anomalies
    }

    /// Number of events whose link the locator did not know.
    pub fn unlocated(&self) -> u64 {
        self.unlocated
    }

    /// The `k` densest cells, ties broken by ascending key.
    pub fn top_k(&self, k: usize) -> Vec<&GridCell> {
        let cells: Vec<&GridCell> = self.cells.values().collect();
        rank_cells(cells, k)
    }

    /// Cells ordered by key.
    pub fn snapshot(&self) -> Vec<GridCell> {
        let mut cells: Vec<GridCell> = self.cells.values().cloned().collect();
        cells.sort_by_key(|cell| cell.key);
        cells
    }

    /// Like [`snapshot`](Self::snapshot), without copying the cells.
    pub fn into_snapshot(self) -> Vec<GridCell> {
        let mut cells: Vec<GridCell> = self.cells.into_values().collect();
        cells.sort_by_key(|cell| cell.key);
        cells
    }
}

pub(crate) fn density_of(count: u32, measure: DensityMeasure, cell_area: f64) -> f64 {
    match measure {
        DensityMeasure::Count => count as f64,
        DensityMeasure::Area => count as f64 / cell_area,
    }
}

fn rank_cells(mut cells: Vec<&GridCell>, k: usize) -> Vec<&GridCell> {
    cells.sort_by(|a, b| b.density.total_cmp(&a.density).then_with(|| a.key.cmp(&b.key)));
    cells.truncate(k);
    cells
}

/// Top-k ranking over a snapshot.
pub fn top_k_cells(cells: &[GridCell], k: usize) -> Vec<&GridCell> {
    rank_cells(cells.iter().collect(), k)
}

/// Top-k ranking by peak population, used when coloring a finished run.
pub fn top_k_by_peak(cells: &[GridCell], k: usize) -> Vec<&GridCell> {
    let mut ranked: Vec<&GridCell> = cells.iter().collect();
    ranked.sort_by(|a, b| b.peak_count.cmp(&a.peak_count).then_with(|| a.key.cmp(&b.key)));
    ranked.truncate(k);
    ranked
}

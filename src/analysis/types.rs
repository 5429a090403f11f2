//! Core data types for evacuation event analysis.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Simulated time in seconds since the start of the simulated day.
pub type SimTime = f64;

/// Kind of an agent movement event relevant to the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Agent starts its leg on a link
    Departure,
    /// Agent enters a link
    LinkEnter,
    /// Agent leaves a link
    LinkLeave,
    /// Agent reaches its destination and leaves the network
    Arrival,
}

impl EventKind {
    /// Map a raw event `type` attribute to a kind. Returns `None` for event
    /// types the analysis does not look at.
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type {
            "departure" => Some(EventKind::Departure),
            "entered link" => Some(EventKind::LinkEnter),
            "left link" => Some(EventKind::LinkLeave),
            "arrival" => Some(EventKind::Arrival),
            _ => None,
        }
    }

    /// Events that put an agent onto a link.
    pub fn adds_population(self) -> bool {
        matches!(self, EventKind::Departure | EventKind::LinkEnter)
    }

    /// Movement away from a link, i.e. the link used as a departure edge.
    pub fn departs_link(self) -> bool {
        matches!(self, EventKind::Departure | EventKind::LinkLeave)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Departure => write!(f, "departure"),
            EventKind::LinkEnter => write!(f, "entered link"),
            EventKind::LinkLeave => write!(f, "left link"),
            EventKind::Arrival => write!(f, "arrival"),
        }
    }
}

/// A single parsed simulation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: SimTime,
    pub kind: EventKind,
    pub agent_id: String,
    pub link_id: String,
}

impl Event {
    pub fn new(timestamp: SimTime, kind: EventKind, agent_id: &str, link_id: &str) -> Self {
        Self {
            timestamp,
            kind,
            agent_id: agent_id.to_string(),
            link_id: link_id.to_string(),
        }
    }
}

/// Completion criterion used by the link cluster extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Last movement away from a link
    Evacuation,
    /// Last moment the link's origin cell was occupied
    Clearing,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Evacuation, Mode::Clearing];
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Evacuation => write!(f, "evacuation"),
            Mode::Clearing => write!(f, "clearing"),
        }
    }
}

/// Completion time of one link for one mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkClusterEntry {
    pub link_id: String,
    pub time: SimTime,
}

/// Cumulative arrivals observed up to (and including) a time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArrivalSample {
    pub time: SimTime,
    pub cumulative_count: u64,
}

/// Integer coordinates of a grid cell. Orders by `x`, then `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellKey {
    pub x: i64,
    pub y: i64,
}

impl CellKey {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// State of one grid cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub key: CellKey,
    /// Agents currently on links whose origin lies in this cell
    pub population_count: u32,
    /// Current population under the aggregator's density measure
    pub density: f64,
    /// Highest population seen so far
    pub peak_count: u32,
    /// Total number of agents that were placed in this cell
    pub entries: u64,
    /// Last time the population dropped to zero
    pub last_emptied_at: Option<SimTime>,
    /// Population after every change, in event order
    #[serde(skip)]
    pub history: Vec<(SimTime, u32)>,
}

impl GridCell {
    pub fn new(key: CellKey) -> Self {
        Self {
            key,
            population_count: 0,
            density: 0.0,
            peak_count: 0,
            entries: 0,
            last_emptied_at: None,
            history: Vec::new(),
        }
    }

    /// Whether the cell ever held at least one agent.
    pub fn was_populated(&self) -> bool {
        self.peak_count > 0
    }

    /// Population right after all changes up to `time`.
    pub fn population_at(&self, time: SimTime) -> u32 {
        let idx = self.history.partition_point(|(t, _)| *t <= time);
        if idx == 0 {
            0
        } else {
            self.history[idx - 1].1
        }
    }
}

/// Everything one analysis pass over an event log produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EventData {
    pub file_name: String,
    pub arrival_times: Vec<ArrivalSample>,
    pub clusters: BTreeMap<Mode, Vec<LinkClusterEntry>>,
    pub sample_size: u64,
    pub grid: Vec<GridCell>,
    pub grid_anomalies: u64,
    pub unlocated_events: u64,
    pub first_event_time: Option<SimTime>,
    pub last_event_time: Option<SimTime>,
}

impl EventData {
    /// Sorted cluster entries for a mode (empty when the mode saw no links).
    pub fn clusters(&self, mode: Mode) -> &[LinkClusterEntry] {
        self.clusters.get(&mode).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Scenario-wide completion time for a mode: the last sorted entry.
    pub fn completion_time(&self, mode: Mode) -> Option<SimTime> {
        self.clusters(mode).last().map(|entry| entry.time)
    }
}

/// Scalar results of one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationMetrics {
    pub file_name: String,
    pub evacuation_time: SimTime,
    pub clearing_time: SimTime,
    pub graph_evacuation_time: SimTime,
    pub sample_size: u64,
    pub grid_anomalies: u64,
}

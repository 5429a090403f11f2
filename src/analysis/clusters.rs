//! Per-link completion times.
//!
//! The extractor observes the same ordered event stream as the grid
//! aggregator and, once the stream is exhausted, turns what it saw into a
//! time-sorted list of [`LinkClusterEntry`] values. The last entry of that
//! list is the scenario-wide completion time of the mode.

use std::collections::HashMap;

use super::grid::GridAggregator;
use super::types::*;

pub struct LinkClusterExtractor {
    mode: Mode,
    /// Evacuation: last departure-edge event per link. Clearing: last event per link.
    last_seen: HashMap<String, SimTime>,
}

impl LinkClusterExtractor {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            last_seen: HashMap::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn observe(&mut self, event: &Event) {
        let relevant = match self.mode {
            Mode::Evacuation => event.kind.departs_link(),
            Mode::Clearing => true,
        };
        if !relevant {
            return;
        }

        self.last_seen
            .entry(event.link_id.clone())
            .and_modify(|t| *t = t.max(event.timestamp))
            .or_insert(event.timestamp);
    }

    /// Produce the sorted entries. `run_end` is the timestamp of the last
    /// event of the run, used for cells still occupied when the log ends.
    pub fn finish(self, grid: &GridAggregator<'_>, run_end: SimTime) -> Vec<LinkClusterEntry> {
        let mode = self.mode;
        let mut entries: Vec<LinkClusterEntry> = self
            .last_seen
            .into_iter()
            .filter_map(|(link_id, last)| {
                let time = match mode {
                    Mode::Evacuation => last,
                    Mode::Clearing => clearing_time(grid, &link_id, run_end)?,
                };
                Some(LinkClusterEntry { link_id, time })
            })
            .collect();

        sort_entries(&mut entries);
        log::debug!("{} {} cluster entries", entries.len(), mode);
        entries
    }
}

/// Last moment the link's origin cell held anyone.
fn clearing_time(grid: &GridAggregator<'_>, link_id: &str, run_end: SimTime) -> Option<SimTime> {
    let cell = grid.cell(grid.locate(link_id)?)?;
    if !cell.was_populated() {
        return None;
    }
    if cell.population_count > 0 {
        Some(run_end)
    } else {
        cell.last_emptied_at
    }
}

/// Sort ascending by time, ties by link id.
pub fn sort_entries(entries: &mut [LinkClusterEntry]) {
    entries.sort_by(|a, b| a.time.total_cmp(&b.time).then_with(|| a.link_id.cmp(&b.link_id)));
}

/// Completion time of a sorted entry list.
pub fn completion_time(entries: &[LinkClusterEntry]) -> Option<SimTime> {
    entries.last().map(|entry| entry.time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::grid::DensityMeasure;
    use crate::network::Coord;

    fn locator() -> HashMap<String, Coord> {
        let mut links = HashMap::new();
        links.insert("a".to_string(), Coord::new(1.0, 1.0));
        links.insert("b".to_string(), Coord::new(15.0, 1.0));
        links.insert("c".to_string(), Coord::new(25.0, 1.0));
        links
    }

    /// Agent 1 walks a -> b -> c, agent 2 walks b -> c.
    fn events() -> Vec<Event> {
        vec![
            Event::new(0.0, EventKind::Departure, "1", "a"),
            Event::new(2.0, EventKind::Departure, "2", "b"),
            Event::new(10.0, EventKind::LinkLeave, "1", "a"),
            Event::new(10.0, EventKind::LinkEnter, "1", "b"),
            Event::new(12.0, EventKind::LinkLeave, "2", "b"),
            Event::new(12.0, EventKind::LinkEnter, "2", "c"),
            Event::new(30.0, EventKind::LinkLeave, "1", "b"),
            Event::new(30.0, EventKind::LinkEnter, "1", "c"),
            Event::new(40.0, EventKind::Arrival, "2", "c"),
            Event::new(55.0, EventKind::Arrival, "1", "c"),
        ]
    }

    fn run(mode: Mode, events: &[Event]) -> Vec<LinkClusterEntry> {
        let links = locator();
        let mut grid = GridAggregator::new(&links, 10.0, DensityMeasure::Count);
        let mut extractor = LinkClusterExtractor::new(mode);
        for event in events {
            grid.apply_event(event);
            extractor.observe(event);
        }
        let end = events.last().map(|e| e.timestamp).unwrap_or(0.0);
        extractor.finish(&grid, end)
    }

    #[test]
    fn test_evacuation_uses_last_departure_edge_event() {
        let entries = run(Mode::Evacuation, &events());
        let pairs: Vec<(&str, f64)> = entries.iter().map(|e| (e.link_id.as_str(), e.time)).collect();
        // c is never left, only arrived on
        assert_eq!(pairs, vec![("a", 10.0), ("b", 30.0)]);
        assert_eq!(completion_time(&entries), Some(30.0));
    }

    #[test]
    fn test_clearing_uses_origin_cell_emptying() {
        let entries = run(Mode::Clearing, &events());
        let pairs: Vec<(&str, f64)> = entries.iter().map(|e| (e.link_id.as_str(), e.time)).collect();
        assert_eq!(pairs, vec![("a", 10.0), ("b", 30.0), ("c", 55.0)]);
        assert_eq!(completion_time(&entries), Some(55.0));
    }

    #[test]
    fn test_clearing_of_occupied_cell_is_run_end() {
        let mut evs = events();
        evs.pop(); // agent 1 never arrives
        evs.push(Event::new(70.0, EventKind::LinkLeave, "3", "a"));

        let entries = run(Mode::Clearing, &evs);
        assert_eq!(entries.last().unwrap().link_id, "c");
        assert_eq!(entries.last().unwrap().time, 70.0);
    }

    #[test]
    fn test_never_populated_links_are_omitted() {
        let evs = vec![Event::new(3.0, EventKind::LinkLeave, "9", "a")];
        assert!(run(Mode::Clearing, &evs).is_empty());
        assert_eq!(run(Mode::Evacuation, &evs).len(), 1);
    }

    #[test]
    fn test_sorting_is_idempotent() {
        let mut entries = vec![
            LinkClusterEntry { link_id: "z".into(), time: 4.0 },
            LinkClusterEntry { link_id: "y".into(), time: 9.5 },
            LinkClusterEntry { link_id: "x".into(), time: 4.0 },
            LinkClusterEntry { link_id: "w".into(), time: 0.0 },
        ];
        sort_entries(&mut entries);
        let once = entries.clone();
        sort_entries(&mut entries);
        assert_eq!(once, entries);

        let max = entries.iter().map(|e| e.time).fold(f64::MIN, f64::max);
        assert_eq!(completion_time(&entries), Some(max));
        assert_eq!(entries[0].link_id, "w");
        assert_eq!(entries[1].link_id, "x");
    }

    #[test]
    fn test_empty_stream_has_no_completion_time() {
        assert!(run(Mode::Evacuation, &[]).is_empty());
        assert_eq!(completion_time(&[]), None);
    }
}

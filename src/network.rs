//! Link geometry lookup.
//!
//! The grid aggregator only needs to know where a link starts. That lookup is
//! abstracted as [`LinkLocator`]; [`NetworkIndex`] implements it from a
//! MATSim-style network file with one `<node/>` or `<link/>` element per line.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analysis::event_reader::{decode, unescape, PATTERNS};

/// Planar coordinate in network units (usually metres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Maps a link id to the coordinate of its origin node.
pub trait LinkLocator: Send + Sync {
    fn origin(&self, link_id: &str) -> Option<Coord>;
}

impl LinkLocator for HashMap<String, Coord> {
    fn origin(&self, link_id: &str) -> Option<Coord> {
        self.get(link_id).copied()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Failed to read network file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid network file {path} at line {line}: {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Link {link} references unknown node {node}")]
    UnknownNode { link: String, node: String },
}

/// Start and end coordinates of a link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkGeometry {
    pub from: Coord,
    pub to: Coord,
}

/// In-memory link geometry table.
#[derive(Debug, Clone, Default)]
pub struct NetworkIndex {
    links: HashMap<String, LinkGeometry>,
}

impl NetworkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_link(&mut self, link_id: &str, from: Coord, to: Coord) {
        self.links
            .insert(link_id.to_string(), LinkGeometry { from, to });
    }

    pub fn link(&self, link_id: &str) -> Option<&LinkGeometry> {
        self.links.get(link_id)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Load a network file (plain, `.gz` or `.zst` compressed).
    pub fn load(path: &Path) -> Result<Self, NetworkError> {
        let io_err = |source| NetworkError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(io_err)?;
        let reader = decode(path, file).map_err(io_err)?;

        let index = Self::parse(path, BufReader::new(reader))?;
        log::info!("Loaded {} links from {}", index.len(), path.display());
        Ok(index)
    }

    fn parse<R: BufRead>(path: &Path, reader: R) -> Result<Self, NetworkError> {
        let parse_err = |line: usize, reason: String| NetworkError::Parse {
            path: path.to_path_buf(),
            line,
            reason,
        };

        let mut nodes: HashMap<String, Coord> = HashMap::new();
        let mut raw_links: Vec<(String, String, String)> = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.map_err(|e| parse_err(line_no, e.to_string()))?;
            let trimmed = line.trim();

            let is_node = trimmed.starts_with("<node ");
            let is_link = trimmed.starts_with("<link ");
            if !is_node && !is_link {
                continue;
            }

            let attributes: HashMap<&str, String> = PATTERNS
                .attribute
                .captures_iter(trimmed)
                .filter_map(|caps| {
                    Some((caps.get(1)?.as_str(), unescape(caps.get(2)?.as_str()).into_owned()))
                })
                .collect();
            let require = |name: &str| {
                attributes
                    .get(name)
                    .cloned()
                    .ok_or_else(|| parse_err(line_no, format!("missing attribute '{}'", name)))
            };

            if is_node {
                let id = require("id")?;
                let x = parse_coord(&require("x")?).map_err(|r| parse_err(line_no, r))?;
                let y = parse_coord(&require("y")?).map_err(|r| parse_err(line_no, r))?;
                nodes.insert(id, Coord::new(x, y));
            } else {
                raw_links.push((require("id")?, require("from")?, require("to")?));
            }
        }

        let mut index = NetworkIndex::new();
        for (link, from, to) in raw_links {
            let lookup = |node: &str| {
                nodes.get(node).copied().ok_or_else(|| NetworkError::UnknownNode {
                    link: link.clone(),
                    node: node.to_string(),
                })
            };
            let from = lookup(&from)?;
            let to = lookup(&to)?;
            index.insert_link(&link, from, to);
        }

        Ok(index)
    }
}

fn parse_coord(value: &str) -> Result<f64, String> {
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(format!("invalid coordinate '{}'", value)),
    }
}

impl LinkLocator for NetworkIndex {
    fn origin(&self, link_id: &str) -> Option<Coord> {
        self.links.get(link_id).map(|geometry| geometry.from)
    }
}

//! Streaming reader for simulation event logs.
//!
//! Event logs are line-oriented XML with one `<event .../>` element per line:
//!
//! ```text
//! <event time="21602.0" type="left link" vehicle="17" link="4711"  />
//! ```
//!
//! Files ending in `.gz` or `.zst` are decompressed on the fly. Each call to
//! [`EventLog::events`] reopens the file, so a log can be scanned any number
//! of times.

use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Lines, Read};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use flate2::read::MultiGzDecoder;
use regex::Regex;

use super::types::*;
use crate::error::ReadError;

/// Compiled regex patterns for event log parsing
pub struct EventPatterns {
    /// Match: `name="value"` attribute pairs
    pub attribute: Regex,
    /// Match: opening of an event element
    pub event_element: Regex,
}

impl EventPatterns {
    pub fn new() -> Self {
        Self {
            attribute: Regex::new(r#"([A-Za-z_][\w.-]*)\s*=\s*"([^"]*)""#)
                .expect("Invalid attribute regex"),
            event_element: Regex::new(r"^<event\s").expect("Invalid event_element regex"),
        }
    }
}

impl Default for EventPatterns {
    fn default() -> Self {
        Self::new()
    }
}

/// Global patterns instance
pub static PATTERNS: LazyLock<EventPatterns> = LazyLock::new(EventPatterns::new);

const READ_BUFFER_BYTES: usize = 64 * 1024;

/// Handle on one iteration's event log.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    /// Check that `path` is a readable regular file.
    pub fn open(path: &Path) -> Result<Self, ReadError> {
        open_file(path)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without directories, as used in reports.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Start a fresh pass over the log.
    pub fn events(&self) -> Result<EventStream, ReadError> {
        let file = open_file(&self.path)?;
        let decoded = decode(&self.path, file).map_err(|e| {
            ReadError::malformed(&self.path, 0, format!("{} stream: {}", Compression::of(&self.path), e))
        })?;
        let reader: Box<dyn BufRead + Send> = Box::new(BufReader::with_capacity(READ_BUFFER_BYTES, decoded));

        Ok(EventStream {
            path: self.path.clone(),
            lines: reader.lines(),
            line_no: 0,
            last_timestamp: None,
            finished: false,
        })
    }

    /// Read the whole log into memory.
    pub fn read_all(&self) -> Result<Vec<Event>, ReadError> {
        self.events()?.collect()
    }
}

fn open_file(path: &Path) -> Result<File, ReadError> {
    let not_found = |source: std::io::Error| ReadError::NotFound {
        path: path.to_path_buf(),
        source,
    };

    let metadata = std::fs::metadata(path).map_err(not_found)?;
    if !metadata.is_file() {
        return Err(not_found(std::io::Error::other("not a regular file")));
    }
    File::open(path).map_err(not_found)
}

/// Compression of a log or network file, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Compression {
    None,
    Gzip,
    Zstd,
}

impl Compression {
    pub(crate) fn of(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("gz") => Compression::Gzip,
            Some("zst") => Compression::Zstd,
            _ => Compression::None,
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compression::None => write!(f, "plain"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Zstd => write!(f, "zstd"),
        }
    }
}

/// Wrap `file` in the decoder its extension calls for.
pub(crate) fn decode(path: &Path, file: File) -> io::Result<Box<dyn Read + Send>> {
    Ok(match Compression::of(path) {
        Compression::None => Box::new(file),
        // multi-member files decode as one stream
        Compression::Gzip => Box::new(MultiGzDecoder::new(file)),
        Compression::Zstd => Box::new(zstd::stream::read::Decoder::new(file)?),
    })
}

/// Lazy sequence of relevant events in non-decreasing timestamp order.
///
/// The stream fuses after the first error.
pub struct EventStream {
    path: PathBuf,
    lines: Lines<Box<dyn BufRead + Send>>,
    line_no: usize,
    last_timestamp: Option<SimTime>,
    finished: bool,
}

impl EventStream {
    fn fail(&mut self, reason: impl Into<String>) -> Option<Result<Event, ReadError>> {
        self.finished = true;
        Some(Err(ReadError::malformed(&self.path, self.line_no, reason)))
    }
}

impl Iterator for EventStream {
    type Item = Result<Event, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let line = match self.lines.next() {
                None => {
                    self.finished = true;
                    return None;
                }
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.line_no += 1;
                    return self.fail(format!("read error: {}", e));
                }
            };
            self.line_no += 1;

            let parsed = match parse_line(&line) {
                Ok(Some(parsed)) => parsed,
                Ok(None) => continue,
                Err(reason) => return self.fail(reason),
            };

            if let Some(last) = self.last_timestamp {
                if parsed.timestamp < last {
                    return self.fail(format!(
                        "timestamp {} goes back in time (previous {})",
                        parsed.timestamp, last
                    ));
                }
            }
            self.last_timestamp = Some(parsed.timestamp);

            if let Some(event) = parsed.event {
                return Some(Ok(event));
            }
        }
    }
}

/// A parsed event element. `event` is `None` for event types the analysis
/// ignores; their timestamp still takes part in the ordering check.
#[derive(Debug)]
struct ParsedLine {
    timestamp: SimTime,
    event: Option<Event>,
}

/// Parse one log line. `Ok(None)` for blank lines and XML framing.
fn parse_line(line: &str) -> Result<Option<ParsedLine>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || is_framing(trimmed) {
        return Ok(None);
    }
    if !PATTERNS.event_element.is_match(trimmed) {
        return Err(format!("unrecognized line: {}", truncate(trimmed, 80)));
    }

    let attributes: Vec<(&str, Cow<'_, str>)> = PATTERNS
        .attribute
        .captures_iter(trimmed)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str();
            let value = caps.get(2)?.as_str();
            Some((name, unescape(value)))
        })
        .collect();
    let attr = |name: &str| {
        attributes
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_ref())
    };

    let time_str = attr("time").ok_or("event without time attribute")?;
    let timestamp: SimTime = time_str
        .parse()
        .map_err(|_| format!("invalid time '{}'", time_str))?;
    if !timestamp.is_finite() || timestamp < 0.0 {
        return Err(format!("invalid time '{}'", time_str));
    }

    let event_type = attr("type").ok_or("event without type attribute")?;
    let Some(kind) = EventKind::from_event_type(event_type) else {
        return Ok(Some(ParsedLine {
            timestamp,
            event: None,
        }));
    };

    let agent_id = attr("person")
        .or_else(|| attr("vehicle"))
        .ok_or_else(|| format!("'{}' event without person or vehicle", event_type))?;
    let link_id = attr("link").ok_or_else(|| format!("'{}' event without link", event_type))?;

    Ok(Some(ParsedLine {
        timestamp,
        event: Some(Event::new(timestamp, kind, agent_id, link_id)),
    }))
}

fn is_framing(line: &str) -> bool {
    line.starts_with("<?xml")
        || line.starts_with("<!--")
        || line.starts_with("<!DOCTYPE")
        || line.starts_with("<events")
        || line.starts_with("</events")
}

pub(crate) fn unescape(value: &str) -> Cow<'_, str> {
    if !value.contains('&') {
        return Cow::Borrowed(value);
    }
    Cow::Owned(
        value
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&apos;", "'")
            .replace("&amp;", "&"),
    )
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

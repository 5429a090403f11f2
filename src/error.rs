//! Error types for the analysis engine.
//!
//! Per-iteration failures (`ReadError`, `AnalysisError`) are caught by the run
//! comparator and turn into skipped iterations. Pass-level failures
//! (`ConfigError`, `ReportError`) propagate to the caller.

use std::path::PathBuf;

use crate::analysis::types::Mode;

/// Errors raised while opening or streaming an event log.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("Event log not found or unreadable: {path}: {source}")]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed event log {path} at line {line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

impl ReadError {
    pub(crate) fn malformed(path: &std::path::Path, line: usize, reason: impl Into<String>) -> Self {
        ReadError::Malformed {
            path: path.to_path_buf(),
            line,
            reason: reason.into(),
        }
    }
}

/// Errors raised while turning an event stream into metrics.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("No arrivals observed, cannot normalize the arrival series")]
    EmptySample,

    #[error("No link activity for {0} mode")]
    NoLinkActivity(Mode),
}

/// Errors raised while reading run identity or algorithm parameters.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration record '{key}' unavailable: {reason}")]
    Unavailable { key: String, reason: String },
}

impl ConfigError {
    pub(crate) fn unavailable(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::Unavailable {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Pass-level errors of the run comparator and reporter.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("Iterations directory not found: {0}")]
    MissingIterations(PathBuf),

    #[error("No event logs found under {0}")]
    NoEventFiles(PathBuf),

    #[error("Output directory is not writable: {path}")]
    OutputUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

//! Shared utilities: iteration discovery and simulated-time formatting.

pub mod discovery;
pub mod duration;

pub use discovery::{discover_event_files, IterationFile};
pub use duration::{format_duration, parse_sim_time};

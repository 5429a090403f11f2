//! # Evacsim - analysis of evacuation simulation event logs
//!
//! This library turns the event logs written by a traffic simulation of an
//! evacuation scenario into density grids, per-link completion times and
//! arrival curves, and picks the best of many iterations of the same run.
//!
//! ## Overview
//!
//! For every iteration of a run, the event log is streamed once. Each event
//! updates a spatial population grid, two link cluster extractors
//! (evacuation and clearing) and a cumulative arrival series. The resulting
//! scalar metrics of all iterations are folded into the best evacuation,
//! clearing and graph evacuation times, and the comparison is persisted once
//! per run id.
//!
//! ## Architecture
//!
//! - `analysis`: event reader, grid aggregator, cluster extractor, time
//!   series, coloring, run comparator and report
//! - `network`: link geometry used to place events on the grid
//! - `provider`: run identity and routing-algorithm parameters
//! - `config`: analyzer configuration structures and validation
//! - `config_loader`: YAML loading and CLI overrides
//! - `error`: error types of the analysis engine
//! - `utils`: iteration discovery and time formatting
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use evacsim::analysis::{ComparisonRequest, RunComparator};
//! use evacsim::network::NetworkIndex;
//! use evacsim::provider::FileConfigurationProvider;
//! use evacsim::config_loader;
//! use std::path::Path;
//!
//! let config = config_loader::load_config(Path::new("evacsim.yaml"))?;
//! let network = NetworkIndex::load(Path::new("output/output_network.xml"))?;
//! let provider = FileConfigurationProvider::new(&config.input.config_dir);
//!
//! let comparator = RunComparator::new(&provider, &network, config.analysis_settings());
//! let outcome = comparator.run(&ComparisonRequest::from_config(&config))?;
//! # Ok::<(), color_eyre::Report>(())
//! ```
//!
//! ## Error Handling
//!
//! Library errors are typed `thiserror` enums (see [`error`]); the binary
//! reports them through `color_eyre`. Failures of a single iteration never
//! abort a comparison, they are recorded as skipped iterations.

pub mod analysis;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod network;
pub mod provider;
pub mod utils;

//! Evacuation simulation analysis CLI.
//!
//! Compares the iterations of a simulation run, inspects single event logs
//! and lists the iteration files a comparison would use.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, eyre, Context, Result};
use env_logger::Env;
use log::{info, warn};

use evacsim::analysis::{
    self,
    coloring::classify,
    grid::top_k_by_peak,
    ComparisonOutcome, ComparisonRequest, ExportOptions, IterationAnalysis, Mode, RunComparator,
};
use evacsim::config::AnalyzerConfig;
use evacsim::config_loader::{self, CliOverrides};
use evacsim::network::{Coord, LinkLocator, NetworkIndex};
use evacsim::provider::FileConfigurationProvider;
use evacsim::utils::{discover_event_files, duration::format_optional, parse_sim_time};

#[derive(Parser)]
#[command(name = "evacsim")]
#[command(about = "Analysis of evacuation simulation event logs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Analyzer configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory containing the per-iteration event logs
    #[arg(short, long, global = true)]
    iterations_dir: Option<PathBuf>,

    /// Directory containing the run identity and algorithm parameter records
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Network file used to place links on the grid
    #[arg(short, long, global = true)]
    network: Option<PathBuf>,

    /// Output directory for reports
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Number of parallel workers (0 = auto-detect)
    #[arg(short = 'j', long, global = true)]
    threads: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze every iteration of the run and write the comparison report
    Compare {
        /// Scenario population (defaults to the largest observed arrival count)
        #[arg(long)]
        population: Option<u64>,
    },

    /// Analyze a single event log
    Inspect {
        /// Event log to analyze
        file: PathBuf,

        /// Write a JSON grid export to this path
        #[arg(long)]
        export: Option<PathBuf>,

        /// Number of densest cells to show and to scale colors against
        #[arg(long)]
        top_k: Option<usize>,

        /// Color the grid at this simulated time (e.g. "1800", "30m", "6h05m12s")
        #[arg(long, requires = "export")]
        at: Option<String>,
    },

    /// List the iteration files in comparison order
    List,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let mut config = config_loader::load_or_default(cli.config.as_deref())?;
    let overrides = CliOverrides {
        iterations_dir: cli.iterations_dir.clone(),
        config_dir: cli.config_dir.clone(),
        network: cli.network.clone(),
        output_dir: cli.output.clone(),
        log_level: cli.log_level.clone(),
        threads: cli.threads,
        population: match &cli.command {
            Commands::Compare { population } => *population,
            _ => None,
        },
        top_k: match &cli.command {
            Commands::Inspect { top_k, .. } => *top_k,
            _ => None,
        },
    };
    config_loader::apply_overrides(&mut config, &overrides)?;

    env_logger::Builder::from_env(Env::default().default_filter_or(&config.general.log_level)).init();

    if config.general.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.general.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    match cli.command {
        Commands::Compare { .. } => run_compare(&config),
        Commands::Inspect { file, export, at, .. } => run_inspect(&config, &file, export.as_deref(), at.as_deref()),
        Commands::List => run_list(&config),
    }
}

fn run_compare(config: &AnalyzerConfig) -> Result<()> {
    let Some(network_path) = &config.input.network else {
        bail!("compare needs a network file (input.network or --network) to place links on the grid");
    };
    let network = NetworkIndex::load(network_path)?;
    let provider = FileConfigurationProvider::new(&config.input.config_dir);

    info!("Reading run records from {}", provider.dir().display());
    let comparator = RunComparator::new(&provider, &network, config.analysis_settings());
    let outcome = comparator
        .run(&ComparisonRequest::from_config(config))
        .context("Comparison failed")?;

    match outcome {
        ComparisonOutcome::Written { path, report } => {
            analysis::print_summary(&report);
            println!("Report written to {}", path.display());
        }
        ComparisonOutcome::AlreadyReported { path } => {
            println!("Run already reported in {}", path.display());
        }
        ComparisonOutcome::WriteFailed { report, reason } => {
            analysis::print_summary(&report);
            bail!("Failed to write report: {}", reason);
        }
    }

    Ok(())
}

fn run_inspect(config: &AnalyzerConfig, file: &Path, export: Option<&Path>, at: Option<&str>) -> Result<()> {
    let at = at.map(parse_sim_time).transpose().map_err(|e| eyre!(e))?;

    let locator: Box<dyn LinkLocator> = match &config.input.network {
        Some(path) => Box::new(NetworkIndex::load(path)?),
        None => {
            warn!("No network configured, grid and clearing times will be empty");
            Box::new(HashMap::<String, Coord>::new())
        }
    };

    let settings = config.analysis_settings();
    let analysis = analysis::analyze_event_file(file, locator.as_ref(), &settings)
        .with_context(|| format!("Failed to analyze {}", file.display()))?;

    print_inspection(&analysis, config);

    if let Some(path) = export {
        let options = ExportOptions {
            top_k: config.grid.top_k,
            palette: config.coloring.palette,
            transparency: config.coloring.transparency,
            at,
        };
        let grid_export = analysis::build_export(&analysis, &settings, &options);
        analysis::write_export(&grid_export, path)?;
    }

    Ok(())
}

fn print_inspection(analysis: &IterationAnalysis, config: &AnalyzerConfig) {
    let data = &analysis.data;
    let graph_time = analysis.series.graph_evacuation_time().ok();

    println!("\n=== ITERATION {} ===\n", data.file_name);
    println!("Arrivals: {}", data.sample_size);
    println!("Evacuation time: {}", format_optional(data.completion_time(Mode::Evacuation)));
    println!("Clearing time: {}", format_optional(data.completion_time(Mode::Clearing)));
    println!("Graph evacuation time: {}", format_optional(graph_time));
    println!("Grid cells: {}", data.grid.len());
    println!("Grid anomalies: {}", data.grid_anomalies);
    println!("Unlocated events: {}", data.unlocated_events);

    let top = top_k_by_peak(&data.grid, config.grid.top_k);
    if !top.is_empty() {
        let threshold = top.last().map_or(0.0, |cell| cell.peak_count as f64);
        println!("\nBusiest cells:");
        for (i, cell) in top.iter().enumerate() {
            let color = classify(
                cell.peak_count as f64,
                threshold,
                config.coloring.palette,
                config.coloring.transparency,
            );
            println!(
                "  {}. {}: peak {} agents, {} entries, {:?}",
                i + 1,
                cell.key,
                cell.peak_count,
                cell.entries,
                color.bucket
            );
        }
    }

    println!();
}

fn run_list(config: &AnalyzerConfig) -> Result<()> {
    let dir = &config.input.iterations_dir;
    let files = discover_event_files(dir, &config.input.event_suffixes)
        .with_context(|| format!("Failed to read iterations directory {}", dir.display()))?;

    if files.is_empty() {
        println!("No event logs under {}", dir.display());
        return Ok(());
    }
    for file in &files {
        let iteration = file
            .iteration
            .map_or_else(|| "-".to_string(), |n| n.to_string());
        println!("{:>6}  {}", iteration, file.path.display());
    }
    Ok(())
}

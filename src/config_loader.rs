use crate::config::AnalyzerConfig;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::info;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Load and validate an analyzer configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<AnalyzerConfig> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open config file {}", config_path.display()))?;

    let config: AnalyzerConfig = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse config file {}", config_path.display()))?;

    config.validate()?;

    Ok(config)
}

/// Load the configuration file if one was given, defaults otherwise
pub fn load_or_default(config_path: Option<&Path>) -> Result<AnalyzerConfig> {
    match config_path {
        Some(path) => load_config(path),
        None => {
            info!("No configuration file given, using defaults");
            Ok(AnalyzerConfig::default())
        }
    }
}

/// CLI arguments that override YAML settings
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub iterations_dir: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
    pub network: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub threads: Option<usize>,
    pub population: Option<u64>,
    pub top_k: Option<usize>,
}

/// Apply CLI overrides to a loaded configuration
pub fn apply_overrides(config: &mut AnalyzerConfig, overrides: &CliOverrides) -> Result<()> {
    if let Some(dir) = &overrides.iterations_dir {
        config.input.iterations_dir = dir.clone();
    }
    if let Some(dir) = &overrides.config_dir {
        config.input.config_dir = dir.clone();
    }
    if let Some(network) = &overrides.network {
        config.input.network = Some(network.clone());
    }
    if let Some(dir) = &overrides.output_dir {
        config.output.dir = dir.clone();
    }
    if let Some(level) = &overrides.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(threads) = overrides.threads {
        config.general.threads = threads;
    }
    if let Some(population) = overrides.population {
        config.scenario.population = Some(population);
    }
    if let Some(top_k) = overrides.top_k {
        config.grid.top_k = top_k;
    }

    // Re-validate after applying overrides
    config.validate()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "grid:\n  cell_size: 50.0\noutput:\n  dir: reports").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.grid.cell_size, 50.0);
        assert_eq!(config.output.dir, PathBuf::from("reports"));
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "grid:\n  cell_size: -1.0").unwrap();
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(load_config(Path::new("/nonexistent/evacsim.yaml")).is_err());
        assert_eq!(load_or_default(None).unwrap(), AnalyzerConfig::default());
    }

    #[test]
    fn test_overrides_win() {
        let mut config = AnalyzerConfig::default();
        let overrides = CliOverrides {
            network: Some(PathBuf::from("net.xml")),
            threads: Some(2),
            log_level: Some("debug".to_string()),
            ..CliOverrides::default()
        };
        apply_overrides(&mut config, &overrides).unwrap();

        assert_eq!(config.input.network, Some(PathBuf::from("net.xml")));
        assert_eq!(config.general.threads, 2);
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.input.iterations_dir, PathBuf::from("output/ITERS"));
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let mut config = AnalyzerConfig::default();
        let overrides = CliOverrides {
            top_k: Some(0),
            ..CliOverrides::default()
        };
        assert!(apply_overrides(&mut config, &overrides).is_err());
    }
}

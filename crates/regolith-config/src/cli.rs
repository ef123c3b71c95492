//! Command-line argument parsing for Regolith tools.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Regolith command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "regolith", about = "Adaptive cube-sphere terrain LOD")]
pub struct CliArgs {
    /// Body radius in meters.
    #[arg(long)]
    pub radius: Option<f64>,

    /// Smallest chunk edge length in meters.
    #[arg(long)]
    pub min_chunk_size: Option<f64>,

    /// Split-distance factor.
    #[arg(long)]
    pub split_distance: Option<f64>,

    /// Quads per chunk edge.
    #[arg(long)]
    pub resolution: Option<u32>,

    /// Geometry worker threads (0 = auto).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of frames to simulate.
    #[arg(long, default_value_t = 600)]
    pub frames: u32,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(radius) = args.radius {
            self.body.radius = radius;
        }
        if let Some(size) = args.min_chunk_size {
            self.body.min_chunk_size = size;
        }
        if let Some(factor) = args.split_distance {
            self.body.chunk_split_distance = factor;
        }
        if let Some(res) = args.resolution {
            self.body.sample_resolution = res;
        }
        if let Some(workers) = args.workers {
            self.build.worker_threads = workers;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            radius: Some(6000.0),
            resolution: Some(64),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.body.radius, 6000.0);
        assert_eq!(config.body.sample_resolution, 64);
        assert_eq!(config.debug.log_level, "debug");
        // Non-overridden fields retain defaults
        assert_eq!(config.body.min_chunk_size, 100.0);
        assert_eq!(config.build.worker_threads, 0);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::parse_from([
            "regolith",
            "--radius",
            "1500",
            "--split-distance",
            "2.0",
            "--workers",
            "4",
        ]);
        assert_eq!(args.radius, Some(1500.0));
        assert_eq!(args.split_distance, Some(2.0));
        assert_eq!(args.workers, Some(4));
        assert_eq!(args.frames, 600);
    }
}

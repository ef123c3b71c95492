//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Shape and LOD parameters of the rendered body.
    pub body: BodyConfig,
    /// Background build and per-frame budget settings.
    pub build: BuildConfig,
    /// Pass-through rendering toggles.
    pub render: RenderConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Immutable description of the body whose surface is rendered.
///
/// Fixed at engine construction; there is no runtime mutation path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BodyConfig {
    /// Base radius in meters.
    pub radius: f64,
    /// Per-axis scale applied after projection (ellipsoidal bodies).
    pub stretch: [f64; 3],
    /// Multiplier applied to sampled heights before displacing the surface.
    pub displacement_weight: f64,
    /// Smallest permitted chunk edge length in meters.
    pub min_chunk_size: f64,
    /// A node splits while the camera is closer than `size * chunk_split_distance`.
    pub chunk_split_distance: f64,
    /// Quads per chunk edge; a chunk has `(sample_resolution + 1)^2` vertices.
    pub sample_resolution: u32,
    /// Samples per axis of the coarse per-face height grid.
    pub height_grid_resolution: u32,
}

/// Background geometry build settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildConfig {
    /// Number of geometry worker threads. 0 picks `num_cpus - 2` (at least 1).
    pub worker_threads: usize,
    /// A job that has not returned after this many milliseconds is resubmitted.
    pub job_timeout_ms: u64,
    /// Wall-clock budget per frame for surface synthesis, in milliseconds.
    pub synthesis_budget_ms: f64,
    /// Maximum retired chunks kept per size bucket. 0 keeps every one.
    pub pool_capacity_per_size: usize,
}

/// Rendering toggles forwarded to the host untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Chunks cast shadows.
    pub cast_shadows: bool,
    /// Chunks receive shadows.
    pub receive_shadows: bool,
    /// Draw chunks as wireframe.
    pub wireframe: bool,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "regolith_terrain=trace").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            radius: 1000.0,
            stretch: [1.0, 1.0, 1.0],
            displacement_weight: 40.0,
            min_chunk_size: 100.0,
            chunk_split_distance: 1.25,
            sample_resolution: 32,
            height_grid_resolution: 64,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            job_timeout_ms: 5_000,
            synthesis_budget_ms: 4.0,
            pool_capacity_per_size: 0,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            cast_shadows: true,
            receive_shadows: true,
            wireframe: false,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl BodyConfig {
    /// Reject configurations the engine cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(invalid("radius", format!("must be > 0, got {}", self.radius)));
        }
        if let Some(s) = self.stretch.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(invalid("stretch", format!("components must be > 0, got {s}")));
        }
        if !(self.displacement_weight.is_finite() && self.displacement_weight >= 0.0) {
            return Err(invalid(
                "displacement_weight",
                format!("must be >= 0, got {}", self.displacement_weight),
            ));
        }
        if !(self.min_chunk_size.is_finite() && self.min_chunk_size > 0.0) {
            return Err(invalid(
                "min_chunk_size",
                format!("must be > 0, got {}", self.min_chunk_size),
            ));
        }
        if !(self.chunk_split_distance.is_finite() && self.chunk_split_distance > 0.0) {
            return Err(invalid(
                "chunk_split_distance",
                format!("must be > 0, got {}", self.chunk_split_distance),
            ));
        }
        if self.sample_resolution == 0 {
            return Err(invalid("sample_resolution", "must be > 0".to_string()));
        }
        if self.height_grid_resolution < 2 {
            return Err(invalid(
                "height_grid_resolution",
                format!("must be >= 2, got {}", self.height_grid_resolution),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

/// Platform config directory for Regolith, e.g. `~/.config/regolith` on Linux.
///
/// Falls back to the working directory when the platform has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("regolith"))
        .unwrap_or_else(|| PathBuf::from("."))
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    ///
    /// Body settings are fixed for a running engine; callers rebuild it to apply them.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

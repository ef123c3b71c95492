//! Configuration system for the Regolith terrain engine.
//!
//! Body and build settings persist to disk as RON files. CLI flags override
//! loaded values, and body parameters are validated before an engine is built.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{BodyConfig, BuildConfig, Config, DebugConfig, RenderConfig, default_config_dir};
pub use error::ConfigError;

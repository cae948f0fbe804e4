//! Kiln configuration
//!
//! - Project configuration (`kiln.toml`, found by walking up from a directory)
//! - Global user configuration (`~/.kiln/config.toml`)
//! - Environment overrides (`KILN_*`)
//! - Resolution of file sets and conversion into target specs
//!
//! # Configuration Hierarchy
//!
//! Later sources override earlier ones:
//! 1. Global config (~/.kiln/config.toml)
//! 2. Project config (./kiln.toml)
//! 3. Environment variables (KILN_JOBS, KILN_CC, KILN_PROFILE)
//! 4. CLI flags
//!
//! # Example
//!
//! ```no_run
//! use kiln_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! let specs = config.target_specs().unwrap();
//! ```

pub mod files;
pub mod global;
pub mod loader;
pub mod project;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("No file matches '{pattern}' in target '{target}'")]
    NoMatch { target: String, pattern: String },

    #[error(transparent)]
    Build(#[from] kiln_build::BuildError),

    #[error("Home directory not found")]
    HomeNotFound,
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Name of the project file
pub const PROJECT_FILE: &str = "kiln.toml";

// Re-export main types
pub use files::resolve_file_set;
pub use global::GlobalConfig;
pub use loader::{Config, ConfigLoader, EnvOverrides};
pub use project::{BuildSection, ProjectConfig, TargetConfig};

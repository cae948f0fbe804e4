//! Global Configuration (~/.kiln/config.toml)

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.kiln/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,
}

/// Defaults used when neither the project nor the environment sets a value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct DefaultsConfig {
    /// Parallel jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,

    /// Compiler binary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiler: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

impl GlobalConfig {
    /// Load global configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(defaults) = &self.defaults {
            if defaults.jobs == Some(0) {
                return Err(ConfigError::invalid("defaults.jobs", "must be at least 1"));
            }
            if defaults.compiler.as_deref().is_some_and(|c| c.trim().is_empty()) {
                return Err(ConfigError::invalid("defaults.compiler", "cannot be empty"));
            }
        }
        Ok(())
    }

    /// `~/.kiln/config.toml`
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".kiln").join("config.toml"))
    }

    pub fn default_jobs(&self) -> Option<usize> {
        self.defaults.as_ref().and_then(|d| d.jobs)
    }

    pub fn default_compiler(&self) -> Option<&str> {
        self.defaults.as_ref().and_then(|d| d.compiler.as_deref())
    }

    pub fn default_profile(&self) -> Option<&str> {
        self.defaults.as_ref().and_then(|d| d.profile.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[defaults]\njobs = 6\ncompiler = \"clang\"\nprofile = \"fast\"\n",
        )
        .unwrap();

        let config = GlobalConfig::load_from_file(&path).unwrap();
        assert_eq!(config.default_jobs(), Some(6));
        assert_eq!(config.default_compiler(), Some("clang"));
        assert_eq!(config.default_profile(), Some("fast"));
    }

    #[test]
    fn test_zero_jobs_is_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[defaults]\njobs = 0\n").unwrap();

        assert!(matches!(
            GlobalConfig::load_from_file(&path),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        assert!(matches!(
            GlobalConfig::load_from_file(&path),
            Err(ConfigError::NotFound(_))
        ));
    }
}

//! Configuration Loader
//!
//! Loads configuration from multiple sources and merges them with proper precedence.

use crate::global::GlobalConfig;
use crate::project::{parse_profile, ProjectConfig};
use crate::{ConfigError, ConfigResult, PROJECT_FILE};
use kiln_build::{Features, Profile, TargetSpec};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default output directory, relative to the project root
pub const DEFAULT_OUTPUT: &str = "bin";

/// Configuration loader
///
/// Precedence, lowest first:
/// 1. Global config (~/.kiln/config.toml)
/// 2. Project config (kiln.toml)
/// 3. Environment variables (KILN_*)
/// 4. CLI flags, applied by the caller
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Values taken from `KILN_JOBS`, `KILN_CC` and `KILN_PROFILE`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub jobs: Option<usize>,
    pub compiler: Option<String>,
    pub profile: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> ConfigResult<Self> {
        let jobs = match non_empty_var("KILN_JOBS") {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(jobs) if jobs > 0 => Some(jobs),
                _ => {
                    return Err(ConfigError::invalid(
                        "KILN_JOBS",
                        format!("'{}' is not a positive number", value),
                    ))
                }
            },
            None => None,
        };

        Ok(Self {
            jobs,
            compiler: non_empty_var("KILN_CC"),
            profile: non_empty_var("KILN_PROFILE"),
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Merged configuration result
#[derive(Debug, Clone)]
pub struct Config {
    pub project: ProjectConfig,
    pub global: GlobalConfig,
    pub env: EnvOverrides,
    /// Directory holding kiln.toml
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Use another global config file than `~/.kiln/config.toml`
    pub fn with_global_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Walk up from `start_dir` to the first kiln.toml, then merge the global
    /// config and the environment. Without a project file the project part
    /// is empty.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project) = self.find_project_config(start_dir)?;
        self.finish(project, project_root)
    }

    /// Load a specific project file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project = ProjectConfig::load_from_file(config_path)?;
        let project_root = config_path.parent().map(|p| p.to_path_buf());
        self.finish(project, project_root)
    }

    fn finish(&mut self, project: ProjectConfig, project_root: Option<PathBuf>) -> ConfigResult<Config> {
        let global = self.load_global_config()?;
        let env = EnvOverrides::from_env()?;
        Ok(Config {
            project,
            global,
            env,
            project_root,
        })
    }

    fn find_project_config(&self, start_dir: &Path) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_FILE);

            if config_path.is_file() {
                debug!(path = %config_path.display(), "Found project file");
                let project = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ProjectConfig::default())),
            }
        }
    }

    /// Missing global config means defaults, a broken one is an error
    fn load_global_config(&mut self) -> ConfigResult<GlobalConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => match GlobalConfig::global_config_path() {
                Ok(path) => {
                    self.global_config_path = Some(path.clone());
                    path
                }
                Err(ConfigError::HomeNotFound) => return Ok(GlobalConfig::default()),
                Err(e) => return Err(e),
            },
        };

        if !path.exists() {
            return Ok(GlobalConfig::default());
        }

        GlobalConfig::load_from_file(&path)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if this is a project (has kiln.toml)
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }

    fn root(&self) -> &Path {
        self.project_root.as_deref().unwrap_or_else(|| Path::new("."))
    }

    /// environment > global
    pub fn jobs(&self) -> Option<usize> {
        self.env.jobs.or_else(|| self.global.default_jobs())
    }

    /// environment > global
    pub fn compiler(&self) -> Option<&str> {
        self.env
            .compiler
            .as_deref()
            .or_else(|| self.global.default_compiler())
    }

    /// environment > project > global > debug
    pub fn profile(&self) -> ConfigResult<Profile> {
        match self
            .env
            .profile
            .as_deref()
            .or_else(|| self.project.profile())
            .or_else(|| self.global.default_profile())
        {
            Some(name) => parse_profile(name),
            None => Ok(Profile::default()),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        let output = self.project.output().unwrap_or_else(|| Path::new(DEFAULT_OUTPUT));
        self.root().join(output)
    }

    pub fn version(&self) -> Option<&str> {
        self.project.version()
    }

    pub fn features(&self) -> Features {
        self.project.features()
    }

    pub fn use_env_flags(&self) -> bool {
        self.project.use_env_flags()
    }

    pub fn target_specs(&self) -> ConfigResult<Vec<TargetSpec>> {
        self.project.target_specs(self.root())
    }
}

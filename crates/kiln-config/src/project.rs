//! Project Configuration (kiln.toml)
//!
//! A `[build]` table with project-wide settings and one `[[target]]` table
//! per target. Paths are relative to the directory holding `kiln.toml`.

use crate::files::resolve_file_set;
use crate::{ConfigError, ConfigResult};
use kiln_build::{Features, Platform, Platforms, Profile, SourceFeatures, TargetKind, TargetSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Project configuration from kiln.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSection>,

    #[serde(default, rename = "target")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetConfig>,
}

/// Project-wide build settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    /// Output directory (default: "bin")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Version string written into the version marker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Profile name (debug, fast, release or a custom name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Features enabled on top of the profile
    #[serde(default, skip_serializing_if = "Features::is_empty")]
    pub features: Features,

    /// Append CFLAGS, CXXFLAGS, CPPFLAGS and LDFLAGS to commands
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_env_flags: Option<bool>,
}

/// One `[[target]]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: TargetKind,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,

    /// Per-source feature overrides, keyed by path
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub source_features: BTreeMap<PathBuf, SourceFeatures>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub definitions: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub export_definitions: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_directories: Vec<PathBuf>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub export_directories: Vec<PathBuf>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub c_pch: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cxx_pch: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_options: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<PathBuf>,

    /// Supported platforms, all when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platforms: Option<Vec<Platform>>,

    #[serde(default, skip_serializing_if = "Features::is_empty")]
    pub enable_features: Features,

    #[serde(default, skip_serializing_if = "Features::is_empty")]
    pub disable_features: Features,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub link_priority: i32,
}

fn is_zero(value: &i32) -> bool {
    *value == 0
}

impl ProjectConfig {
    /// Load project configuration from a file
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

    /// Checks that need no file system access. Target relations (imports,
    /// duplicates) are checked when the target set is resolved.
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(build) = &self.build {
            if let Some(profile) = &build.profile {
                if profile.trim().is_empty() {
                    return Err(ConfigError::invalid("build.profile", "profile cannot be empty"));
                }
            }
            if let Some(output) = &build.output {
                if output.as_os_str().is_empty() {
                    return Err(ConfigError::invalid("build.output", "path cannot be empty"));
                }
            }
        }

        for target in &self.targets {
            if target.name.is_empty() {
                return Err(ConfigError::invalid("target.name", "name cannot be empty"));
            }
            if target.platforms.as_ref().is_some_and(|p| p.is_empty()) {
                return Err(ConfigError::invalid(
                    format!("target.{}.platforms", target.name),
                    "at least one platform is required",
                ));
            }
        }

        Ok(())
    }

    pub fn output(&self) -> Option<&Path> {
        self.build.as_ref().and_then(|b| b.output.as_deref())
    }

    pub fn version(&self) -> Option<&str> {
        self.build.as_ref().and_then(|b| b.version.as_deref())
    }

    pub fn profile(&self) -> Option<&str> {
        self.build.as_ref().and_then(|b| b.profile.as_deref())
    }

    pub fn features(&self) -> Features {
        self.build.as_ref().map(|b| b.features).unwrap_or_default()
    }

    pub fn use_env_flags(&self) -> bool {
        self.build
            .as_ref()
            .and_then(|b| b.use_env_flags)
            .unwrap_or(false)
    }

    /// Target specs with every path made absolute against `root` and file
    /// sets expanded
    pub fn target_specs(&self, root: &Path) -> ConfigResult<Vec<TargetSpec>> {
        self.targets.iter().map(|t| t.to_spec(root)).collect()
    }
}

impl TargetConfig {
    pub fn to_spec(&self, root: &Path) -> ConfigResult<TargetSpec> {
        let join = |p: &PathBuf| root.join(p);

        let mut spec = TargetSpec::new(self.name.clone(), self.kind);
        spec.sources = resolve_file_set(root, &self.name, &self.sources)?;
        spec.source_features = self
            .source_features
            .iter()
            .map(|(path, features)| (join(path), *features))
            .collect();
        spec.c_pch = self.c_pch.as_ref().map(join);
        spec.cxx_pch = self.cxx_pch.as_ref().map(join);
        spec.imports = self.imports.clone();
        spec.definitions = self.definitions.clone();
        spec.export_definitions = self.export_definitions.clone();
        spec.include_directories = self.include_directories.iter().map(join).collect();
        spec.export_directories = self.export_directories.iter().map(join).collect();
        spec.libraries = self.libraries.clone();
        spec.enable_features = self.enable_features;
        spec.disable_features = self.disable_features;
        spec.assets = resolve_file_set(root, &self.name, &self.assets)?;
        spec.asset_options = self.asset_options.clone();
        spec.icon = self.icon.as_ref().map(join);
        spec.link_priority = self.link_priority;
        if let Some(platforms) = &self.platforms {
            spec.platforms = Platforms::only(platforms);
        }

        Ok(spec)
    }
}

/// Profile named by a configuration value
pub fn parse_profile(name: &str) -> ConfigResult<Profile> {
    Ok(Profile::from_str(name)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_minimal() {
        let config: ProjectConfig = toml::from_str(
            r#"
[[target]]
name = "app"
type = "executable"
"#,
        )
        .unwrap();

        assert_eq!(config.targets.len(), 1);
        assert_eq!(config.targets[0].kind, TargetKind::Executable);
        assert!(config.build.is_none());
        assert_eq!(config.features(), Features::empty());
    }

    #[test]
    fn test_parse_build_section() {
        let config: ProjectConfig = toml::from_str(
            r#"
[build]
output = "out"
version = "1.2.0"
profile = "release"
features = ["minimize_size"]
"#,
        )
        .unwrap();

        assert_eq!(config.output(), Some(Path::new("out")));
        assert_eq!(config.version(), Some("1.2.0"));
        assert_eq!(config.profile(), Some("release"));
        assert_eq!(config.features(), Features::MINIMIZE_SIZE);
        assert!(!config.use_env_flags());
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let result: Result<ProjectConfig, _> = toml::from_str(
            r#"
[[target]]
name = "app"
type = "executable"
optimise = true
"#,
        );
        assert!(result.is_err());

        let result: Result<ProjectConfig, _> = toml::from_str("[package]\nname = \"x\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_feature_is_rejected() {
        let result: Result<ProjectConfig, _> =
            toml::from_str("[build]\nfeatures = [\"turbo\"]\n");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("turbo"), "{}", err);
    }

    #[test]
    fn test_validate_rejects_empty_platforms() {
        let config: ProjectConfig = toml::from_str(
            r#"
[[target]]
name = "app"
type = "executable"
platforms = []
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));
    }
}

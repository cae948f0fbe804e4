/// Build system error types
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Duplicate target name '{0}'")]
    DuplicateTarget(String),

    #[error("Cannot import from unknown target '{import}' (required by '{target}')")]
    UnknownImport { target: String, import: String },

    #[error("Cannot import non-library target '{import}' (required by '{target}')")]
    InvalidImport { target: String, import: String },

    #[error("Target not found: {target}")]
    TargetNotFound { target: String },

    #[error("Invalid target configuration: {0}")]
    InvalidTarget(String),

    #[error("Cannot determine source kind of '{0}'")]
    UnknownSourceKind(PathBuf),

    #[error("Cannot build {kind} source '{path}' directly")]
    UnsupportedSource { path: PathBuf, kind: String },

    #[error("Unsupported compile features for {toolchain}: {features}")]
    UnsupportedFeatures { toolchain: String, features: String },

    #[error("Invalid feature combination: {0}")]
    InvalidFeatures(String),

    #[error("Unknown feature '{0}'")]
    UnknownFeature(String),

    #[error("Cannot find a supported toolchain for '{0}'")]
    ToolchainNotFound(String),

    #[error("Failed to parse dependency file {path}: {reason}")]
    DependencyParse { path: PathBuf, reason: String },

    #[error("Failed to start '{command}': {error}")]
    LaunchFailed {
        command: String,
        error: std::io::Error,
    },

    #[error("Build cache error: {0}")]
    CacheError(String),

    #[error("I/O error at {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BuildError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }

    /// Create an error for a target that fails validation
    pub fn invalid_target(message: impl ToString) -> Self {
        Self::InvalidTarget(message.to_string())
    }

    pub fn dependency_parse(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::DependencyParse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a launch failure error
    pub fn launch(command: impl Into<String>, error: std::io::Error) -> Self {
        Self::LaunchFailed {
            command: command.into(),
            error,
        }
    }

    /// Whether this error was raised while validating the target graph
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateTarget(_)
                | Self::UnknownImport { .. }
                | Self::InvalidImport { .. }
                | Self::TargetNotFound { .. }
                | Self::InvalidTarget(_)
                | Self::UnknownSourceKind(_)
        )
    }
}

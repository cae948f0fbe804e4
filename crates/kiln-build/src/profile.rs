//! Build profile management
//!
//! Provides build configuration profiles (debug, fast, release, custom) and
//! maps each onto the compile feature set handed to the toolchain.

use crate::error::BuildResult;
use crate::features::Features;
use serde::{Deserialize, Serialize};

/// Build profile
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Debug profile (default)
    Debug,
    /// Optimized build that keeps debug info
    Fast,
    /// Release profile (optimized, LTO)
    Release,
    /// Custom profile, starts from an empty feature set
    Custom(String),
}

impl Profile {
    /// Parse profile from string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> BuildResult<Self> {
        match s.to_lowercase().as_str() {
            "debug" | "dev" => Ok(Self::Debug),
            "fast" => Ok(Self::Fast),
            "release" => Ok(Self::Release),
            custom => Ok(Self::Custom(custom.to_string())),
        }
    }

    /// Get profile name
    pub fn name(&self) -> &str {
        match self {
            Self::Debug => "debug",
            Self::Fast => "fast",
            Self::Release => "release",
            Self::Custom(name) => name,
        }
    }

    /// Check if this is a built-in profile
    pub fn is_builtin(&self) -> bool {
        matches!(self, Self::Debug | Self::Fast | Self::Release)
    }

    /// Base compile features for this profile
    pub fn features(&self) -> Features {
        match self {
            Self::Debug => Features::DEBUG_INFO | Features::WARNINGS | Features::PCH,
            Self::Fast => {
                Features::OPTIMIZE | Features::DEBUG_INFO | Features::PCH | Features::WARNINGS
            }
            Self::Release => Features::OPTIMIZE | Features::LTO | Features::WARNINGS,
            Self::Custom(_) => Features::empty(),
        }
    }

    /// Profile features with extra enabled and disabled sets applied, validated
    pub fn resolve(&self, enable: Features, disable: Features) -> BuildResult<Features> {
        let features = self.features().combine(enable, disable);
        features.validate()?;
        Ok(features)
    }
}

#[allow(clippy::derivable_impls)]
impl Default for Profile {
    fn default() -> Self {
        Self::Debug
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

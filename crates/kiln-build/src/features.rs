//! Compile feature flags shared by targets, sources and toolchains

use crate::error::{BuildError, BuildResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Set of compile features, stored as a bit mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Features(u32);

impl Features {
    pub const OPTIMIZE: Features = Features(1 << 0);
    pub const MINIMIZE_SIZE: Features = Features(1 << 1);
    pub const DEBUG_INFO: Features = Features(1 << 2);
    pub const WARNINGS: Features = Features(1 << 3);
    pub const PCH: Features = Features(1 << 4);
    pub const LTO: Features = Features(1 << 5);
    pub const STATIC_RUNTIME: Features = Features(1 << 6);
    pub const LINK_LIBRARY: Features = Features(1 << 7);
    pub const HOT_ASSETS: Features = Features(1 << 8);
    pub const ASAN: Features = Features(1 << 9);
    pub const TSAN: Features = Features(1 << 10);
    pub const UBSAN: Features = Features(1 << 11);

    const NAMES: [(&'static str, Features); 12] = [
        ("optimize", Self::OPTIMIZE),
        ("minimize_size", Self::MINIMIZE_SIZE),
        ("debug_info", Self::DEBUG_INFO),
        ("warnings", Self::WARNINGS),
        ("pch", Self::PCH),
        ("lto", Self::LTO),
        ("static_runtime", Self::STATIC_RUNTIME),
        ("link_library", Self::LINK_LIBRARY),
        ("hot_assets", Self::HOT_ASSETS),
        ("asan", Self::ASAN),
        ("tsan", Self::TSAN),
        ("ubsan", Self::UBSAN),
    ];

    pub const fn empty() -> Self {
        Features(0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: Features) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Apply per-target or per-source overrides on top of a base set
    pub fn combine(self, enable: Features, disable: Features) -> Features {
        (self | enable) & !disable
    }

    /// Parse a single feature name (`optimize`, `pch`, ...)
    pub fn parse_name(name: &str) -> BuildResult<Features> {
        let normalized = name.trim().to_lowercase().replace('-', "_");
        Self::NAMES
            .iter()
            .find(|(n, _)| *n == normalized)
            .map(|(_, f)| *f)
            .ok_or_else(|| BuildError::UnknownFeature(name.to_string()))
    }

    /// Parse a list of feature names into a single set
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> BuildResult<Features> {
        names
            .iter()
            .try_fold(Features::empty(), |acc, n| Ok(acc | Self::parse_name(n.as_ref())?))
    }

    /// Names of the features in this set, in declaration order
    pub fn names(&self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(_, f)| self.contains(*f))
            .map(|(n, _)| *n)
            .collect()
    }

    /// Reject combinations no toolchain can honor
    pub fn validate(&self) -> BuildResult<()> {
        if self.contains(Self::MINIMIZE_SIZE) && !self.contains(Self::OPTIMIZE) {
            return Err(BuildError::InvalidFeatures(
                "minimize_size requires optimize".to_string(),
            ));
        }
        if self.contains(Self::ASAN) && self.contains(Self::TSAN) {
            return Err(BuildError::InvalidFeatures(
                "asan and tsan cannot be used together".to_string(),
            ));
        }
        Ok(())
    }
}

impl BitOr for Features {
    type Output = Features;

    fn bitor(self, rhs: Features) -> Features {
        Features(self.0 | rhs.0)
    }
}

impl BitOrAssign for Features {
    fn bitor_assign(&mut self, rhs: Features) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Features {
    type Output = Features;

    fn bitand(self, rhs: Features) -> Features {
        Features(self.0 & rhs.0)
    }
}

impl Not for Features {
    type Output = Features;

    fn not(self) -> Features {
        Features(!self.0)
    }
}

impl fmt::Display for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.names().join(", "))
        }
    }
}

impl Serialize for Features {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.names().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Features {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        Features::parse_list(&names).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_enable_then_disable() {
        let base = Features::WARNINGS | Features::PCH;
        let combined = base.combine(Features::OPTIMIZE, Features::PCH);

        assert!(combined.contains(Features::WARNINGS));
        assert!(combined.contains(Features::OPTIMIZE));
        assert!(!combined.contains(Features::PCH));
    }

    #[test]
    fn test_parse_names_accepts_dashes() {
        let features = Features::parse_list(&["debug-info", "Optimize"]).unwrap();
        assert_eq!(features, Features::DEBUG_INFO | Features::OPTIMIZE);
    }

    #[test]
    fn test_parse_unknown_feature() {
        assert!(matches!(
            Features::parse_name("turbo"),
            Err(BuildError::UnknownFeature(_))
        ));
    }

    #[test]
    fn test_minimize_size_requires_optimize() {
        assert!(Features::MINIMIZE_SIZE.validate().is_err());
        assert!((Features::MINIMIZE_SIZE | Features::OPTIMIZE).validate().is_ok());
    }

    #[test]
    fn test_display_lists_names() {
        let features = Features::OPTIMIZE | Features::LTO;
        assert_eq!(features.to_string(), "optimize, lto");
        assert_eq!(Features::empty().to_string(), "none");
    }
}

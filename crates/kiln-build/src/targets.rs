//! Build targets, sources and the target set they are resolved into
//!
//! A [`TargetSpec`] is what the configuration layer hands over: names,
//! file lists and flags, with imports still unresolved. [`TargetSetBuilder`]
//! turns specs into immutable [`Target`]s, flattening imports transitively
//! and deduplicating sources by path, so graph construction never has to
//! walk the import tree again.

use crate::error::{BuildError, BuildResult};
use crate::features::Features;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Kind of build target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Linked program
    Executable,
    /// Source library, folded into the targets importing it
    Library,
    /// Third-party source library, compiled without warnings
    #[serde(rename = "external")]
    ExternalLibrary,
}

impl TargetKind {
    /// Whether other targets may import this one
    pub fn is_library(&self) -> bool {
        matches!(self, Self::Library | Self::ExternalLibrary)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Executable => "executable",
            Self::Library => "library",
            Self::ExternalLibrary => "external",
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Kind of a source file, derived from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    C,
    Cxx,
    /// Prebuilt object, passed straight to the linker
    Object,
    /// Script entry point handed to the bundler
    Bundle,
    /// UI definition compiled to a header
    UiForm,
}

impl SourceKind {
    /// Determine the kind of a source file, `None` for unknown extensions
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "c" => Some(Self::C),
            "cc" | "cpp" | "cxx" | "c++" => Some(Self::Cxx),
            "o" | "obj" => Some(Self::Object),
            "js" | "jsx" | "mjs" | "ts" | "tsx" => Some(Self::Bundle),
            "ui" => Some(Self::UiForm),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::C => "C",
            Self::Cxx => "C++",
            Self::Object => "object",
            Self::Bundle => "bundle",
            Self::UiForm => "UI form",
        }
    }

    /// Whether the toolchain compiles this kind into an object file
    pub fn is_compiled(&self) -> bool {
        matches!(self, Self::C | Self::Cxx)
    }
}

/// Operating system family a target can be built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    #[serde(alias = "macOS")]
    Macos,
    Windows,
    Freebsd,
}

impl Platform {
    const ALL: [Platform; 4] = [Self::Linux, Self::Macos, Self::Windows, Self::Freebsd];

    /// Platform kiln is running on (unknown systems are treated as Linux)
    pub fn host() -> Self {
        match std::env::consts::OS {
            "macos" => Self::Macos,
            "windows" => Self::Windows,
            "freebsd" => Self::Freebsd,
            _ => Self::Linux,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name.to_lowercase())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Macos => "macos",
            Self::Windows => "windows",
            Self::Freebsd => "freebsd",
        }
    }

    fn bit(&self) -> u32 {
        1 << (*self as u32)
    }
}

/// Set of platforms a target supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platforms(u32);

impl Platforms {
    pub fn all() -> Self {
        Platforms(Platform::ALL.iter().fold(0, |acc, p| acc | p.bit()))
    }

    pub fn only(platforms: &[Platform]) -> Self {
        Platforms(platforms.iter().fold(0, |acc, p| acc | p.bit()))
    }

    pub fn contains(&self, platform: Platform) -> bool {
        self.0 & platform.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl Default for Platforms {
    fn default() -> Self {
        Self::all()
    }
}

/// Feature overrides for a single source file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFeatures {
    #[serde(default)]
    pub enable: Features,
    #[serde(default)]
    pub disable: Features,
}

/// Compile options of a target, shared by every source it owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    pub target: String,
    pub kind: TargetKind,
    /// Own definitions plus those exported by imported libraries
    pub definitions: Vec<String>,
    /// Own include directories plus those exported by imported libraries
    pub include_directories: Vec<PathBuf>,
    pub enable_features: Features,
    pub disable_features: Features,
    pub c_pch: Option<PathBuf>,
    pub cxx_pch: Option<PathBuf>,
    pub link_priority: i32,
}

impl CompileOptions {
    /// Apply this target's overrides to the build-wide feature set
    pub fn combine_features(&self, base: Features) -> Features {
        let mut disable = self.disable_features;
        if self.kind == TargetKind::ExternalLibrary {
            disable |= Features::WARNINGS;
        }
        base.combine(self.enable_features, disable)
    }

    /// Precompiled header that applies to sources of `kind`
    pub fn pch_for(&self, kind: SourceKind) -> Option<&Path> {
        match kind {
            SourceKind::C => self.c_pch.as_deref(),
            SourceKind::Cxx => self.cxx_pch.as_deref(),
            _ => None,
        }
    }
}

/// A single compilation unit.
///
/// Sources are identified by path. When several targets list the same file,
/// the first target to reference it owns it and its compile options apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub path: PathBuf,
    pub kind: SourceKind,
    pub owner: Arc<CompileOptions>,
    pub features: SourceFeatures,
}

impl Source {
    pub fn combine_features(&self, base: Features) -> Features {
        self.owner
            .combine_features(base)
            .combine(self.features.enable, self.features.disable)
    }
}

/// A resolved, immutable build target
#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub kind: TargetKind,
    pub platforms: Platforms,
    pub options: Arc<CompileOptions>,
    pub export_definitions: Vec<String>,
    pub export_directories: Vec<PathBuf>,
    /// Own libraries plus those of imported libraries
    pub libraries: Vec<String>,
    /// Transitively flattened imports, dependencies first
    pub imports: Vec<String>,
    /// Sources to build and link, own and imported, by descending link priority
    pub sources: Vec<Arc<Source>>,
    pub assets: Vec<PathBuf>,
    pub asset_options: Option<String>,
    /// Executable icon, linked as a resource where the platform has them
    pub icon: Option<PathBuf>,
}

impl Target {
    pub fn combine_features(&self, base: Features) -> Features {
        self.options.combine_features(base)
    }

    /// Whether this target ends with a link step
    pub fn is_linked(&self, base: Features) -> bool {
        match self.kind {
            TargetKind::Executable => true,
            TargetKind::Library | TargetKind::ExternalLibrary => {
                self.combine_features(base).contains(Features::LINK_LIBRARY)
            }
        }
    }

    pub fn supports(&self, platform: Platform) -> bool {
        self.platforms.contains(platform)
    }
}

/// Unresolved target description, as read from the project file
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSpec {
    pub name: String,
    pub kind: TargetKind,
    pub platforms: Platforms,
    pub sources: Vec<PathBuf>,
    pub source_features: HashMap<PathBuf, SourceFeatures>,
    pub c_pch: Option<PathBuf>,
    pub cxx_pch: Option<PathBuf>,
    pub imports: Vec<String>,
    pub definitions: Vec<String>,
    pub export_definitions: Vec<String>,
    pub include_directories: Vec<PathBuf>,
    pub export_directories: Vec<PathBuf>,
    pub libraries: Vec<String>,
    pub enable_features: Features,
    pub disable_features: Features,
    pub assets: Vec<PathBuf>,
    pub asset_options: Option<String>,
    pub icon: Option<PathBuf>,
    pub link_priority: i32,
}

impl TargetSpec {
    /// Create a new target description
    pub fn new(name: impl Into<String>, kind: TargetKind) -> Self {
        Self {
            name: name.into(),
            kind,
            platforms: Platforms::all(),
            sources: Vec::new(),
            source_features: HashMap::new(),
            c_pch: None,
            cxx_pch: None,
            imports: Vec::new(),
            definitions: Vec::new(),
            export_definitions: Vec::new(),
            include_directories: Vec::new(),
            export_directories: Vec::new(),
            libraries: Vec::new(),
            enable_features: Features::empty(),
            disable_features: Features::empty(),
            assets: Vec::new(),
            asset_options: None,
            icon: None,
            link_priority: 0,
        }
    }

    /// Add source files
    pub fn with_sources<P: Into<PathBuf>>(mut self, sources: impl IntoIterator<Item = P>) -> Self {
        self.sources.extend(sources.into_iter().map(Into::into));
        self
    }

    pub fn with_imports<S: Into<String>>(mut self, imports: impl IntoIterator<Item = S>) -> Self {
        self.imports.extend(imports.into_iter().map(Into::into));
        self
    }

    pub fn with_definitions<S: Into<String>>(mut self, defs: impl IntoIterator<Item = S>) -> Self {
        self.definitions.extend(defs.into_iter().map(Into::into));
        self
    }

    pub fn with_export_definitions<S: Into<String>>(
        mut self,
        defs: impl IntoIterator<Item = S>,
    ) -> Self {
        self.export_definitions.extend(defs.into_iter().map(Into::into));
        self
    }

    pub fn with_c_pch(mut self, path: impl Into<PathBuf>) -> Self {
        self.c_pch = Some(path.into());
        self
    }

    pub fn with_assets<P: Into<PathBuf>>(mut self, assets: impl IntoIterator<Item = P>) -> Self {
        self.assets.extend(assets.into_iter().map(Into::into));
        self
    }

    pub fn with_icon(mut self, path: impl Into<PathBuf>) -> Self {
        self.icon = Some(path.into());
        self
    }

    pub fn with_link_priority(mut self, priority: i32) -> Self {
        self.link_priority = priority;
        self
    }

    /// Validate fields that do not depend on other targets
    pub fn validate(&self) -> BuildResult<()> {
        if self.name.is_empty() {
            return Err(BuildError::invalid_target("Target name cannot be empty"));
        }
        if self
            .name
            .chars()
            .any(|c| !(c.is_alphanumeric() || c == '_' || c == '-' || c == '.'))
        {
            return Err(BuildError::invalid_target(format!(
                "Target name '{}' may only contain letters, digits, '_', '-' and '.'",
                self.name
            )));
        }
        if self.platforms.is_empty() {
            return Err(BuildError::invalid_target(format!(
                "Target '{}' does not support any platform",
                self.name
            )));
        }
        Ok(())
    }
}

/// All resolved targets of a project
#[derive(Debug, Clone, Default)]
pub struct TargetSet {
    targets: Vec<Arc<Target>>,
    by_name: HashMap<String, usize>,
    sources: HashMap<PathBuf, Arc<Source>>,
}

impl TargetSet {
    pub fn find(&self, name: &str) -> Option<&Arc<Target>> {
        self.by_name.get(name).map(|&idx| &self.targets[idx])
    }

    /// Source owned by the first target that referenced `path`
    pub fn find_source(&self, path: &Path) -> Option<&Arc<Source>> {
        self.sources.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Target>> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Targets to build for `platform`.
    ///
    /// With no names, every target supporting the platform is selected.
    /// Explicitly named targets must exist and support the platform.
    pub fn select<S: AsRef<str>>(
        &self,
        names: &[S],
        platform: Platform,
    ) -> BuildResult<Vec<Arc<Target>>> {
        if names.is_empty() {
            return Ok(self
                .targets
                .iter()
                .filter(|t| t.supports(platform))
                .cloned()
                .collect());
        }

        let mut selected: Vec<Arc<Target>> = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let target = self.find(name).ok_or_else(|| BuildError::TargetNotFound {
                target: name.to_string(),
            })?;
            if !target.supports(platform) {
                return Err(BuildError::invalid_target(format!(
                    "Target '{}' cannot be built on {}",
                    name,
                    platform.name()
                )));
            }
            if !selected.iter().any(|t| t.name == target.name) {
                selected.push(Arc::clone(target));
            }
        }
        Ok(selected)
    }
}

/// Resolves target specs into a [`TargetSet`], one target at a time
#[derive(Debug, Default)]
pub struct TargetSetBuilder {
    set: TargetSet,
}

impl TargetSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `spec` against the targets added so far.
    ///
    /// Imports must name libraries that were added before. The set is left
    /// untouched when an error is returned.
    pub fn add(&mut self, spec: TargetSpec) -> BuildResult<Arc<Target>> {
        spec.validate()?;
        if self.set.by_name.contains_key(&spec.name) {
            return Err(BuildError::DuplicateTarget(spec.name));
        }

        // Flatten imports, dependencies of an import come before the import
        let mut imports: Vec<Arc<Target>> = Vec::new();
        let mut handled = HashSet::new();
        for name in &spec.imports {
            let import = self
                .set
                .find(name)
                .ok_or_else(|| BuildError::UnknownImport {
                    target: spec.name.clone(),
                    import: name.clone(),
                })?;
            if !import.kind.is_library() {
                return Err(BuildError::InvalidImport {
                    target: spec.name.clone(),
                    import: name.clone(),
                });
            }

            for nested in &import.imports {
                if handled.insert(nested.clone()) {
                    if let Some(nested) = self.set.find(nested) {
                        imports.push(Arc::clone(nested));
                    }
                }
            }
            if handled.insert(import.name.clone()) {
                imports.push(Arc::clone(import));
            }
        }

        let mut own_sources = Vec::with_capacity(spec.sources.len());
        for path in &spec.sources {
            let kind = SourceKind::from_path(path)
                .ok_or_else(|| BuildError::UnknownSourceKind(path.clone()))?;
            own_sources.push((path.clone(), kind));
        }

        let mut definitions = spec.definitions.clone();
        let mut include_directories = spec.include_directories.clone();
        let mut libraries = spec.libraries.clone();
        for import in &imports {
            definitions.extend(import.export_definitions.iter().cloned());
            include_directories.extend(import.export_directories.iter().cloned());
            libraries.extend(import.libraries.iter().cloned());
        }
        dedup_by_key(&mut include_directories, |d| d.clone());
        dedup_by_key(&mut libraries, |l| l.clone());

        let options = Arc::new(CompileOptions {
            target: spec.name.clone(),
            kind: spec.kind,
            definitions,
            include_directories,
            enable_features: spec.enable_features,
            disable_features: spec.disable_features,
            c_pch: spec.c_pch.clone(),
            cxx_pch: spec.cxx_pch.clone(),
            link_priority: spec.link_priority,
        });

        // Nothing below can fail, sources are registered from here on
        let mut sources: Vec<Arc<Source>> = Vec::new();
        for import in &imports {
            sources.extend(import.sources.iter().cloned());
        }
        for (path, kind) in own_sources {
            let features = spec.source_features.get(&path).copied().unwrap_or_default();
            sources.push(self.create_source(&options, path, kind, features));
        }

        sources.sort_by(|a, b| b.owner.link_priority.cmp(&a.owner.link_priority));
        dedup_by_key(&mut sources, |s| s.path.clone());

        let target = Arc::new(Target {
            name: spec.name.clone(),
            kind: spec.kind,
            platforms: spec.platforms,
            options,
            export_definitions: spec.export_definitions,
            export_directories: spec.export_directories,
            libraries,
            imports: imports.iter().map(|t| t.name.clone()).collect(),
            sources,
            assets: spec.assets,
            asset_options: spec.asset_options,
            icon: spec.icon,
        });

        self.set
            .by_name
            .insert(target.name.clone(), self.set.targets.len());
        self.set.targets.push(Arc::clone(&target));

        Ok(target)
    }

    fn create_source(
        &mut self,
        owner: &Arc<CompileOptions>,
        path: PathBuf,
        kind: SourceKind,
        features: SourceFeatures,
    ) -> Arc<Source> {
        let source = self.set.sources.entry(path.clone()).or_insert_with(|| {
            Arc::new(Source {
                path,
                kind,
                owner: Arc::clone(owner),
                features,
            })
        });
        Arc::clone(source)
    }

    pub fn finish(self) -> TargetSet {
        self.set
    }
}

/// Resolve a whole list of specs in order
pub fn resolve_targets(specs: impl IntoIterator<Item = TargetSpec>) -> BuildResult<TargetSet> {
    let mut builder = TargetSetBuilder::new();
    for spec in specs {
        builder.add(spec)?;
    }
    Ok(builder.finish())
}

fn dedup_by_key<T, K: std::hash::Hash + Eq>(items: &mut Vec<T>, key: impl Fn(&T) -> K) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(key(item)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_source_kind_from_extension() {
        assert_eq!(SourceKind::from_path(Path::new("a.c")), Some(SourceKind::C));
        assert_eq!(SourceKind::from_path(Path::new("a.CPP")), Some(SourceKind::Cxx));
        assert_eq!(SourceKind::from_path(Path::new("lib.obj")), Some(SourceKind::Object));
        assert_eq!(SourceKind::from_path(Path::new("web/app.ts")), Some(SourceKind::Bundle));
        assert_eq!(SourceKind::from_path(Path::new("main.ui")), Some(SourceKind::UiForm));
        assert_eq!(SourceKind::from_path(Path::new("util.h")), None);
        assert_eq!(SourceKind::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_imports_merge_exported_settings() {
        let mut builder = TargetSetBuilder::new();
        builder
            .add(
                TargetSpec::new("util", TargetKind::Library)
                    .with_sources(["util/util.c"])
                    .with_definitions(["UTIL_INTERNAL"])
                    .with_export_definitions(["FEATURE_X"]),
            )
            .unwrap();
        let app = builder
            .add(
                TargetSpec::new("app", TargetKind::Executable)
                    .with_sources(["app/app.c"])
                    .with_imports(["util"]),
            )
            .unwrap();

        assert_eq!(app.options.definitions, vec!["FEATURE_X".to_string()]);
        assert_eq!(app.imports, vec!["util".to_string()]);
        let paths: Vec<_> = app.sources.iter().map(|s| s.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("util/util.c"), PathBuf::from("app/app.c")]);

        // util.c keeps the options of the library that owns it
        assert_eq!(app.sources[0].owner.target, "util");
        assert_eq!(app.sources[0].owner.definitions, vec!["UTIL_INTERNAL".to_string()]);
    }

    #[test]
    fn test_imports_are_flattened_transitively() {
        let set = resolve_targets([
            TargetSpec::new("base", TargetKind::Library)
                .with_sources(["base.c"])
                .with_export_definitions(["BASE"]),
            TargetSpec::new("mid", TargetKind::Library)
                .with_sources(["mid.c"])
                .with_imports(["base"]),
            TargetSpec::new("app", TargetKind::Executable)
                .with_sources(["main.c"])
                .with_imports(["mid", "base"]),
        ])
        .unwrap();

        let app = set.find("app").unwrap();
        assert_eq!(app.imports, vec!["base".to_string(), "mid".to_string()]);
        assert_eq!(app.sources.len(), 3);
    }

    #[test]
    fn test_first_target_owns_shared_source() {
        let set = resolve_targets([
            TargetSpec::new("one", TargetKind::Executable)
                .with_sources(["shared.c"])
                .with_definitions(["ONE"]),
            TargetSpec::new("two", TargetKind::Executable)
                .with_sources(["shared.c"])
                .with_definitions(["TWO"]),
        ])
        .unwrap();

        let two = set.find("two").unwrap();
        assert_eq!(two.sources[0].owner.target, "one");
        assert!(Arc::ptr_eq(
            &two.sources[0],
            set.find_source(Path::new("shared.c")).unwrap()
        ));
    }

    #[test]
    fn test_link_priority_orders_sources() {
        let set = resolve_targets([
            TargetSpec::new("late", TargetKind::Library).with_sources(["late.c"]),
            TargetSpec::new("early", TargetKind::Library)
                .with_sources(["early.c"])
                .with_link_priority(10),
            TargetSpec::new("app", TargetKind::Executable)
                .with_sources(["main.c"])
                .with_imports(["late", "early"]),
        ])
        .unwrap();

        let paths: Vec<_> = set.find("app").unwrap().sources.iter().map(|s| s.path.clone()).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("early.c"), PathBuf::from("late.c"), PathBuf::from("main.c")]
        );
    }

    #[test]
    fn test_configuration_errors() {
        let mut builder = TargetSetBuilder::new();
        builder
            .add(TargetSpec::new("tool", TargetKind::Executable).with_sources(["tool.c"]))
            .unwrap();

        let dup = builder.add(TargetSpec::new("tool", TargetKind::Executable));
        assert!(matches!(dup, Err(BuildError::DuplicateTarget(_))));

        let unknown = builder.add(TargetSpec::new("a", TargetKind::Executable).with_imports(["nope"]));
        assert!(matches!(unknown, Err(BuildError::UnknownImport { .. })));

        let invalid = builder.add(TargetSpec::new("b", TargetKind::Executable).with_imports(["tool"]));
        assert!(matches!(invalid, Err(BuildError::InvalidImport { .. })));

        let kind = builder.add(TargetSpec::new("c", TargetKind::Executable).with_sources(["c.xyz"]));
        assert!(matches!(kind, Err(BuildError::UnknownSourceKind(_))));

        assert_eq!(builder.finish().len(), 1);
    }

    #[test]
    fn test_failed_add_registers_no_sources() {
        let mut builder = TargetSetBuilder::new();
        let result = builder.add(
            TargetSpec::new("bad", TargetKind::Executable).with_sources(["ok.c", "broken.zzz"]),
        );
        assert!(result.is_err());

        let set = builder.finish();
        assert!(set.find_source(Path::new("ok.c")).is_none());
    }

    #[test]
    fn test_external_library_disables_warnings() {
        let set = resolve_targets([
            TargetSpec::new("vendor", TargetKind::ExternalLibrary).with_sources(["vendor.c"])
        ])
        .unwrap();
        let source = &set.find("vendor").unwrap().sources[0];
        let features = source.combine_features(Features::WARNINGS | Features::OPTIMIZE);
        assert_eq!(features, Features::OPTIMIZE);
    }

    #[test]
    fn test_select_by_platform() {
        let mut win = TargetSpec::new("win", TargetKind::Executable);
        win.platforms = Platforms::only(&[Platform::Windows]);
        let set = resolve_targets([TargetSpec::new("all", TargetKind::Executable), win]).unwrap();

        let names: Vec<_> = set
            .select::<&str>(&[], Platform::Linux)
            .unwrap()
            .iter()
            .map(|t| t.name.clone())
            .collect();
        assert_eq!(names, vec!["all".to_string()]);

        assert!(set.select(&["win"], Platform::Linux).is_err());
        assert!(matches!(
            set.select(&["ghost"], Platform::Linux),
            Err(BuildError::TargetNotFound { .. })
        ));
    }
}

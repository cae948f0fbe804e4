//! Kiln build engine
//!
//! Incremental builds of native C/C++ projects:
//! - Target resolution (imports, shared sources, link priority)
//! - Staleness decisions from modification times, command lines and
//!   compiler-reported dependencies
//! - A persisted cache of previous runs plus a compilation database
//! - Staged execution (prep, object, link) on a work-stealing task pool
//! - Toolchain drivers for GCC, Clang and MSVC
//! - Generated sources: precompiled headers, embedded assets, bundles, UI forms

pub mod builder;
pub mod cache;
pub mod depfile;
pub mod embed;
pub mod error;
pub mod features;
pub mod fs;
pub mod graph;
pub mod node;
pub mod oracle;
pub mod output;
pub mod process;
pub mod profile;
pub mod scheduler;
pub mod targets;
pub mod toolchain;

// Re-export main types
pub use builder::{clean, BuildOutcome, BuildReport, BuildSettings, BuildStats, Builder};
pub use cache::{BuildCache, CacheEntry, CompileCommand, DependencyEntry};
pub use depfile::{
    extract_show_includes, parse_bundle_meta, parse_make_rule, read_dependencies,
    DependencyFormat, Discovered,
};
pub use embed::EmbedOptions;
pub use error::{BuildError, BuildResult};
pub use features::Features;
pub use graph::{BuildGraph, GraphBuilder, GraphSettings, Tools};
pub use node::{Action, Node, NodeCounts, NodeFn, NodeLists, Stage};
pub use oracle::RebuildOracle;
pub use output::OutputMode;
pub use process::{ProcessOutput, ProcessRunner, INTERRUPTED_EXIT_CODE};
pub use profile::Profile;
pub use scheduler::{TaskGroup, TaskPool};
pub use targets::{
    resolve_targets, CompileOptions, Platform, Platforms, Source, SourceFeatures, SourceKind,
    Target, TargetKind, TargetSet, TargetSetBuilder, TargetSpec,
};
pub use toolchain::{
    default_compiler, detect, Bundler, Command, CompileRequest, Esbuild, GnuFamily,
    GnuToolchain, LinkKind, LinkRequest, MsvcToolchain, Toolchain, UiCompiler, Uic,
};

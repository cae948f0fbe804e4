//! Toolchain capability interface
//!
//! The graph builder never assembles compiler flags itself. It describes what
//! it needs (compile this source, link these objects) and a [`Toolchain`]
//! turns the request into a [`Command`]: the command line, how much of it is
//! significant for the rebuild cache, where the command writes its
//! dependencies and in which format.
//!
//! One implementation exists per toolchain family. The family is picked once
//! from the compiler binary name by [`detect`], then used for the whole run.

pub mod gnu;
pub mod msvc;
pub mod tools;

use crate::depfile::DependencyFormat;
use crate::error::{BuildError, BuildResult};
use crate::features::Features;
use crate::targets::SourceKind;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub use gnu::{GnuFamily, GnuToolchain};
pub use msvc::MsvcToolchain;
pub use tools::{Bundler, Esbuild, Uic, UiCompiler};

/// A command line ready to run, plus what the cache needs to know about it
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    pub cmd_line: String,
    /// Length of the prefix of `cmd_line` compared against the cache.
    /// Arguments past it (dependency output paths) do not affect the output.
    pub cache_len: usize,
    /// Byte offset after which arguments may be moved to a response file
    pub rsp_offset: Option<usize>,
    pub deps_format: DependencyFormat,
    pub deps_path: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Leading output lines to drop (e.g. the source name echoed by `cl`)
    pub skip_lines: usize,
}

impl Command {
    /// Command whose whole command line is significant
    pub fn new(cmd_line: impl Into<String>) -> Self {
        let cmd_line = cmd_line.into();
        Self {
            cache_len: cmd_line.len(),
            cmd_line,
            ..Self::default()
        }
    }

    /// The part of the command line recorded in the cache
    pub fn cache_key(&self) -> &str {
        let len = self.cache_len.min(self.cmd_line.len());
        self.cmd_line.get(..len).unwrap_or(&self.cmd_line)
    }

    /// Mark everything written so far as significant
    pub fn seal(&mut self) {
        self.cache_len = self.cmd_line.len();
    }

    pub fn with_deps(mut self, format: DependencyFormat, path: Option<PathBuf>) -> Self {
        self.deps_format = format;
        self.deps_path = path;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Everything a toolchain needs to compile one source (or precompiled header)
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    pub source: &'a Path,
    pub kind: SourceKind,
    /// Precompiled header stub to force-include
    pub pch: Option<&'a Path>,
    pub definitions: &'a [String],
    pub include_directories: &'a [PathBuf],
    /// Extra user flags (`CFLAGS` and friends)
    pub flags: Option<&'a str>,
    pub features: Features,
    pub output: &'a Path,
}

/// Shape of a link output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Executable,
    /// Shared library or loadable module
    SharedLibrary,
}

#[derive(Debug, Clone, Copy)]
pub struct LinkRequest<'a> {
    pub objects: &'a [PathBuf],
    pub libraries: &'a [String],
    pub kind: LinkKind,
    pub flags: Option<&'a str>,
    pub features: Features,
    pub output: &'a Path,
}

/// A family of compilers and linkers
pub trait Toolchain: Send + Sync + fmt::Debug {
    /// Short identifier, used in cache directory names (`gcc`, `clang`, `msvc`)
    fn name(&self) -> &str;

    /// Human readable description, including the version when known
    fn title(&self) -> &str;

    /// Features this toolchain can honor
    fn supported_features(&self) -> Features;

    fn object_extension(&self) -> &str;

    fn link_extension(&self, kind: LinkKind) -> &str;

    /// File produced by the precompile step for a header stub
    fn pch_cache(&self, stub: &Path) -> PathBuf;

    /// Object file the precompile step also produces, which must be linked
    fn pch_object(&self, _stub: &Path) -> Option<PathBuf> {
        None
    }

    fn make_pch_command(&self, request: &CompileRequest<'_>) -> Command;

    fn make_object_command(&self, request: &CompileRequest<'_>) -> Command;

    fn make_link_command(&self, request: &LinkRequest<'_>) -> Command;

    /// Compile a resource script into an object the linker accepts. `None`
    /// when the target platform has no resources.
    fn make_resource_command(&self, _script: &Path, _output: &Path) -> Option<Command> {
        None
    }

    /// Reject feature sets this toolchain cannot build
    fn check_features(&self, features: Features) -> BuildResult<()> {
        features.validate()?;
        let unsupported = features & !self.supported_features();
        if unsupported.is_empty() {
            Ok(())
        } else {
            Err(BuildError::UnsupportedFeatures {
                toolchain: self.name().to_string(),
                features: unsupported.to_string(),
            })
        }
    }
}

/// Pick the toolchain family for a compiler binary.
///
/// `cl` and `clang-cl` use MSVC conventions. Names starting with `clang` are
/// Clang, and `gcc`, `cc` or anything ending in `-gcc` is GCC. The version is
/// probed with `--version` on a best-effort basis.
pub fn detect(compiler: &str) -> BuildResult<Arc<dyn Toolchain>> {
    let stem = Path::new(compiler)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .ok_or_else(|| BuildError::ToolchainNotFound(compiler.to_string()))?;

    let toolchain: Arc<dyn Toolchain> = if stem == "cl" || stem == "clang-cl" {
        Arc::new(MsvcToolchain::new(compiler))
    } else if stem.starts_with("clang") {
        let version = probe_version(compiler);
        Arc::new(GnuToolchain::new(GnuFamily::Clang, compiler, version))
    } else if stem == "gcc" || stem == "cc" || stem.ends_with("-gcc") || stem.starts_with("gcc-") {
        let version = probe_version(compiler);
        Arc::new(GnuToolchain::new(GnuFamily::Gcc, compiler, version))
    } else {
        return Err(BuildError::ToolchainNotFound(compiler.to_string()));
    };

    debug!(compiler, toolchain = toolchain.title(), "Selected toolchain");
    Ok(toolchain)
}

/// Default compiler for the host
pub fn default_compiler() -> &'static str {
    if cfg!(windows) {
        "cl"
    } else if cfg!(target_os = "macos") {
        "clang"
    } else {
        "gcc"
    }
}

fn probe_version(compiler: &str) -> Option<String> {
    let output = std::process::Command::new(compiler)
        .arg("--version")
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let first = stdout.lines().next()?.trim();
    // "gcc (Debian 12.2.0-14) 12.2.0" -> "12.2.0", "clang version 16.0.6" -> "16.0.6"
    first
        .split_whitespace()
        .rev()
        .chain(first.split_whitespace())
        .find(|word| word.chars().next().is_some_and(|c| c.is_ascii_digit()) && word.contains('.'))
        .map(|word| word.to_string())
}

/// Quote a path for a shell command line
pub(crate) fn quote(path: &Path) -> String {
    format!("\"{}\"", path.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_by_binary_name() {
        assert_eq!(detect("cl").unwrap().name(), "msvc");
        assert_eq!(detect("clang-cl.exe").unwrap().name(), "msvc");
        assert_eq!(detect("/opt/llvm/bin/clang-17").unwrap().name(), "clang");
        assert_eq!(detect("arm-none-eabi-gcc").unwrap().name(), "gcc");
        assert_eq!(detect("cc").unwrap().name(), "gcc");
        assert!(matches!(detect("javac"), Err(BuildError::ToolchainNotFound(_))));
    }

    #[test]
    fn test_cache_key_excludes_trailing_arguments() {
        let mut cmd = Command::new("cc -c a.c -o a.o");
        cmd.cmd_line.push_str(" -MD -MF a.o.d");
        assert_eq!(cmd.cache_key(), "cc -c a.c -o a.o");

        cmd.seal();
        assert_eq!(cmd.cache_key(), cmd.cmd_line);
    }

    #[test]
    fn test_check_features_reports_unsupported() {
        let msvc = MsvcToolchain::new("cl");
        let err = msvc.check_features(Features::TSAN).unwrap_err();
        assert!(err.to_string().contains("tsan"));
        assert!(msvc.check_features(Features::OPTIMIZE | Features::PCH).is_ok());
    }
}

//! Generators that run before compilation: script bundler and UI compiler

use super::{quote, Command};
use crate::depfile::DependencyFormat;
use std::fmt;
use std::path::Path;

/// Bundles a script entry point into a single file
pub trait Bundler: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Command writing the bundle to `output` and its metadata to `meta`
    fn make_bundle_command(
        &self,
        entry: &Path,
        options: Option<&str>,
        output: &Path,
        meta: &Path,
    ) -> Command;
}

/// Compiles a UI definition into a C++ header
pub trait UiCompiler: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn make_ui_command(&self, source: &Path, output: &Path) -> Command;
}

/// esbuild, which reports its inputs through `--metafile`
#[derive(Debug, Clone)]
pub struct Esbuild {
    binary: String,
}

impl Esbuild {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Bundler for Esbuild {
    fn name(&self) -> &str {
        "esbuild"
    }

    fn make_bundle_command(
        &self,
        entry: &Path,
        options: Option<&str>,
        output: &Path,
        meta: &Path,
    ) -> Command {
        let mut cmd_line = format!(
            "\"{}\" {} --bundle --log-level=warning --outfile={}",
            self.binary,
            quote(entry),
            quote(output)
        );
        if let Some(options) = options {
            cmd_line.push(' ');
            cmd_line.push_str(options);
        }

        let mut cmd = Command::new(cmd_line);
        cmd.cmd_line.push_str(&format!(" --metafile={}", quote(meta)));
        cmd.with_deps(DependencyFormat::BundleMeta, Some(meta.to_path_buf()))
    }
}

/// Qt's `uic`
#[derive(Debug, Clone)]
pub struct Uic {
    binary: String,
}

impl Uic {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl UiCompiler for Uic {
    fn name(&self) -> &str {
        "uic"
    }

    fn make_ui_command(&self, source: &Path, output: &Path) -> Command {
        Command::new(format!(
            "\"{}\" -o {} {}",
            self.binary,
            quote(output),
            quote(source)
        ))
    }
}

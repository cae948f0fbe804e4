pub mod build;
pub mod clean;
pub mod list;

pub use build::BuildArgs;

use anyhow::{bail, Context, Result};
use clap::Args;
use kiln_build::{resolve_targets, TargetSet};
use kiln_config::{Config, ConfigLoader, PROJECT_FILE};
use std::path::PathBuf;
use tracing::debug;

/// Where the project and its outputs are
#[derive(Args, Debug, Clone, Default)]
pub struct ProjectArgs {
    /// Project file (default: kiln.toml in this directory or a parent)
    #[arg(short = 'C', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Output directory (default: [build] output of kiln.toml, or bin)
    #[arg(short = 'O', long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}

/// Loaded project configuration plus command line overrides
pub struct Project {
    pub config: Config,
    pub output_dir: PathBuf,
}

impl Project {
    pub fn load(args: &ProjectArgs) -> Result<Self> {
        let mut loader = ConfigLoader::new();
        let config = match &args.config {
            Some(path) => loader
                .load_from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => {
                let cwd = std::env::current_dir().context("Cannot read working directory")?;
                let config = loader
                    .load_from_directory(&cwd)
                    .context("Failed to load project configuration")?;
                if !config.is_project() {
                    bail!(
                        "No {} found in {} or its parents",
                        PROJECT_FILE,
                        cwd.display()
                    );
                }
                config
            }
        };

        let output_dir = args
            .output_dir
            .clone()
            .unwrap_or_else(|| config.output_dir());
        debug!(output = %output_dir.display(), "Loaded project");

        Ok(Self { config, output_dir })
    }

    pub fn targets(&self) -> Result<TargetSet> {
        let specs = self.config.target_specs()?;
        Ok(resolve_targets(specs)?)
    }
}

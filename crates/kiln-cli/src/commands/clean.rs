//! Clean command

use super::{Project, ProjectArgs};
use anyhow::{Context, Result};
use tracing::info;

pub fn run(args: &ProjectArgs) -> Result<()> {
    let project = Project::load(args)?;
    kiln_build::clean(&project.output_dir)
        .with_context(|| format!("Cannot remove {}", project.output_dir.display()))?;
    info!("Removed {}", project.output_dir.display());
    Ok(())
}

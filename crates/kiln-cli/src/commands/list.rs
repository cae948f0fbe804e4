//! List command

use super::{Project, ProjectArgs};
use anyhow::{Context, Result};
use kiln_build::{default_compiler, detect, BuildSettings, Builder, OutputMode, Platform, Tools};

pub fn run(args: &ProjectArgs, outputs: bool) -> Result<()> {
    let project = Project::load(args)?;
    let targets = project.targets()?;
    let host = Platform::host();

    if !outputs {
        for target in targets.iter() {
            let note = if target.supports(host) { "" } else { " (not supported here)" };
            println!(
                "{:<24} {:<10} {} source(s){}",
                target.name,
                target.kind.name(),
                target.sources.len(),
                note
            );
        }
        return Ok(());
    }

    // Outputs are only known once the graph exists
    let compiler = project.config.compiler().unwrap_or_else(|| default_compiler());
    let mut settings = BuildSettings::new(&project.output_dir);
    settings.dry_run = true;
    settings.features = project.config.profile()?.resolve(project.config.features(), Default::default())?;

    let mut builder = Builder::new(settings, Tools::new(detect(compiler)?)).with_output(OutputMode::Quiet);
    for target in targets.select::<&str>(&[], host)? {
        builder
            .add_target(&target)
            .with_context(|| format!("Cannot expand target '{}'", target.name))?;
    }

    for (name, path) in builder.target_outputs() {
        println!("{:<24} {}", name, path.display());
    }
    Ok(())
}

//! Build command

use super::{Project, ProjectArgs};
use anyhow::{Context, Result};
use clap::Args;
use kiln_build::{
    default_compiler, detect, BuildOutcome, BuildSettings, Builder, Esbuild, Features,
    OutputMode, Platform, Profile, Tools, Uic,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Args, Debug, Default)]
pub struct BuildArgs {
    /// Targets to build (default: all)
    pub targets: Vec<String>,

    #[command(flatten)]
    pub project: ProjectArgs,

    /// Parallel jobs (default: number of CPUs)
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Rebuild everything, ignoring the cache
    #[arg(short = 'r', long)]
    pub rebuild: bool,

    /// Stop starting commands after the first failure
    #[arg(short = 's', long)]
    pub stop_after_error: bool,

    /// Run the remaining stages after a failed one
    #[arg(long)]
    pub keep_going: bool,

    /// Show what would run without running anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Print command lines
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Only print command output and errors
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Build profile (debug, fast, release or custom)
    #[arg(long)]
    pub profile: Option<String>,

    /// Compiler binary (gcc, clang, cl, ...)
    #[arg(long)]
    pub cc: Option<String>,

    /// Feature changes, e.g. `+lto,-pch,optimize`
    #[arg(short = 'f', long)]
    pub features: Option<String>,

    /// Append CFLAGS, CXXFLAGS, CPPFLAGS and LDFLAGS to commands
    #[arg(short = 'e', long)]
    pub environment: bool,

    /// Bundler for script entry points
    #[arg(long, env = "KILN_ESBUILD", default_value = "esbuild")]
    pub esbuild: String,

    /// Compiler for UI forms
    #[arg(long, env = "KILN_UIC", default_value = "uic")]
    pub uic: String,
}

/// Parse `+name`, `-name` and bare names separated by commas or spaces
/// into (enabled, disabled) sets
pub fn parse_feature_changes(spec: &str) -> Result<(Features, Features)> {
    let mut enable = Features::empty();
    let mut disable = Features::empty();

    for part in spec.split([',', ' ']).map(str::trim).filter(|p| !p.is_empty()) {
        if let Some(name) = part.strip_prefix('-') {
            let feature = Features::parse_name(name)?;
            disable |= feature;
            enable = enable & !feature;
        } else {
            let name = part.strip_prefix('+').unwrap_or(part);
            let feature = Features::parse_name(name)?;
            enable |= feature;
            disable = disable & !feature;
        }
    }

    Ok((enable, disable))
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

pub fn run(args: BuildArgs) -> Result<BuildOutcome> {
    let project = Project::load(&args.project)?;
    let config = &project.config;

    let profile = match &args.profile {
        Some(name) => Profile::from_str(name)?,
        None => config.profile()?,
    };
    let (enable, disable) = match &args.features {
        Some(spec) => parse_feature_changes(spec).context("Invalid --features")?,
        None => (Features::empty(), Features::empty()),
    };
    let features = profile.resolve(config.features() | enable, disable)?;

    let compiler = args
        .cc
        .as_deref()
        .or_else(|| config.compiler())
        .unwrap_or_else(|| default_compiler());
    let toolchain = detect(compiler)?;
    toolchain.check_features(features)?;

    let jobs = args.jobs.or_else(|| config.jobs()).unwrap_or_else(default_jobs).max(1);

    let targets = project.targets()?;
    let selected = targets.select(&args.targets, Platform::host())?;

    info!(
        toolchain = toolchain.title(),
        profile = %profile,
        features = %features,
        jobs,
        "Building {} target(s)",
        selected.len()
    );

    let mut settings = BuildSettings::new(&project.output_dir);
    settings.features = features;
    settings.version = config.version().map(str::to_string);
    settings.rebuild = args.rebuild;
    settings.stop_after_error = args.stop_after_error;
    settings.keep_going = args.keep_going;
    settings.dry_run = args.dry_run;
    settings.use_env_flags = args.environment || config.use_env_flags();

    let mut tools = Tools::new(toolchain);
    tools.bundler = Some(Arc::new(Esbuild::new(args.esbuild.clone())));
    tools.ui_compiler = Some(Arc::new(Uic::new(args.uic.clone())));

    let output = if args.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };
    let mut builder = Builder::new(settings, tools).with_output(output);
    for target in &selected {
        builder
            .add_target(target)
            .with_context(|| format!("Cannot build target '{}'", target.name))?;
    }

    // Running children get the signal too, queued nodes are skipped
    let interrupt = builder.interrupt_handle();
    let handler = ctrlc::set_handler(move || {
        warn!("Interrupted, waiting for running commands");
        interrupt.store(true, Ordering::SeqCst);
    });
    if let Err(err) = handler {
        debug!(error = %err, "Cannot install Ctrl+C handler");
    }

    let report = builder.build(jobs, args.verbose)?;
    Ok(report.outcome)
}

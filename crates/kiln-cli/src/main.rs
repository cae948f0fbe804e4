use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{BuildArgs, ProjectArgs};
use kiln_build::BuildOutcome;

/// Incremental builds of C and C++ projects.
///
/// Targets are described in kiln.toml. Only stale outputs are rebuilt: a
/// command runs again when its command line, its inputs or the headers it
/// included last time changed.
///
/// EXAMPLES:
///     kiln build                    Build every target
///     kiln build app -j8            Build one target with 8 jobs
///     kiln build --profile release  Optimized build
///     kiln build -n -v              Show what would run
///     kiln list --outputs           Show target outputs
///     kiln clean                    Remove the output directory
///
/// ENVIRONMENT VARIABLES:
///     KILN_JOBS     Default number of parallel jobs
///     KILN_CC       Compiler binary
///     KILN_PROFILE  Default profile
///     RUST_LOG      Log filter (default: kiln=info)
#[derive(Parser)]
#[command(name = "kiln")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build targets
    ///
    /// Builds the named targets, or every target supported on this platform
    /// when none is given.
    ///
    /// EXAMPLES:
    ///     kiln build
    ///     kiln build app tool --keep-going
    ///     kiln build -f +lto,-pch
    #[command(visible_alias = "b")]
    Build(BuildArgs),

    /// List targets
    #[command(visible_alias = "ls")]
    List {
        #[command(flatten)]
        project: ProjectArgs,
        /// Show the file each linked target produces
        #[arg(long)]
        outputs: bool,
    },

    /// Remove the output directory
    Clean {
        #[command(flatten)]
        project: ProjectArgs,
    },
}

/// Exit status of an interrupted build, as if killed by SIGINT
const INTERRUPTED_STATUS: u8 = 130;

fn init_logging(verbose: bool) {
    let default = if verbose { "warn,kiln=debug" } else { "warn,kiln=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn run(cli: Cli) -> Result<BuildOutcome> {
    match cli.command {
        Commands::Build(args) => commands::build::run(args),
        Commands::List { project, outputs } => {
            commands::list::run(&project, outputs)?;
            Ok(BuildOutcome::Success)
        }
        Commands::Clean { project } => {
            commands::clean::run(&project)?;
            Ok(BuildOutcome::Success)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbose = matches!(&cli.command, Commands::Build(args) if args.verbose);
    init_logging(verbose);

    match run(cli) {
        Ok(BuildOutcome::Success) => ExitCode::SUCCESS,
        Ok(BuildOutcome::Failed) => ExitCode::FAILURE,
        Ok(BuildOutcome::Interrupted) => ExitCode::from(INTERRUPTED_STATUS),
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

//! Staged build orchestration
//!
//! A [`Builder`] collects stale nodes through its [`GraphBuilder`], then runs
//! them on a [`TaskPool`] in three strictly ordered stages: prep, object and
//! link. A stage only starts once the previous one fully drained. A failed
//! stage stops the build unless `keep_going` is set, an interrupted command
//! always does.
//!
//! Successful nodes update the cross-run cache with their command line and
//! discovered dependencies. Failed nodes lose their cache entry and their
//! outputs are deleted, so a half-written file is never taken for up to date.

use crate::cache::{BuildCache, DependencyEntry};
use crate::depfile::{read_dependencies, DependencyFormat};
use crate::error::{BuildError, BuildResult};
use crate::features::Features;
use crate::fs::{self, remove_files};
use crate::graph::{GraphBuilder, GraphSettings, Tools};
use crate::node::{Action, Node, NodeCounts, NodeLists, Stage};
use crate::oracle::RebuildOracle;
use crate::output::{format_duration, OutputMode, ProgressReporter};
use crate::process::ProcessRunner;
use crate::scheduler::{TaskGroup, TaskPool};
use crate::targets::{Platform, Source, Target};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const CLEAR_ATTEMPTS: usize = 5;
const CLEAR_DELAY: Duration = Duration::from_millis(20);

/// Build configuration
#[derive(Debug, Clone)]
pub struct BuildSettings {
    /// Final binaries go here, intermediate files in a subdirectory
    pub output_dir: PathBuf,
    pub features: Features,
    pub version: Option<String>,
    /// Consider every output stale
    pub rebuild: bool,
    /// Skip tasks not started yet once one failed
    pub stop_after_error: bool,
    /// Run the next stages even after a failed one
    pub keep_going: bool,
    /// Report nodes without running them or writing anything
    pub dry_run: bool,
    pub use_env_flags: bool,
    /// Set from a signal handler to stop starting nodes
    pub interrupt: Arc<AtomicBool>,
}

impl BuildSettings {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            features: Features::empty(),
            version: None,
            rebuild: false,
            stop_after_error: false,
            keep_going: false,
            dry_run: false,
            use_env_flags: false,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `<output>/Shared/KilnCache.json`
    pub fn cache_file(&self) -> PathBuf {
        self.output_dir.join("Shared").join("KilnCache.json")
    }

    /// `<output>/<toolchain>_<platform>@<arch>`
    pub fn cache_dir(&self, toolchain: &str) -> PathBuf {
        self.output_dir.join(format!(
            "{}_{}@{}",
            toolchain,
            Platform::host().name(),
            std::env::consts::ARCH
        ))
    }
}

/// Final verdict of a build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Success,
    Failed,
    Interrupted,
}

/// Build statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Nodes found stale
    pub scheduled: usize,
    /// Nodes that ran and succeeded
    pub succeeded: usize,
    pub failed: usize,
    pub total_time: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub outcome: BuildOutcome,
    pub stats: BuildStats,
}

impl BuildReport {
    pub fn success(&self) -> bool {
        self.outcome == BuildOutcome::Success
    }
}

/// What a finished node means for the cache
#[derive(Debug)]
enum NodeResult {
    Built {
        dest: PathBuf,
        command: String,
        dependencies: Vec<PathBuf>,
    },
    Failed {
        dest: PathBuf,
    },
}

#[derive(Debug)]
struct RunState {
    started: usize,
    succeeded: usize,
    failed: usize,
    results: Vec<NodeResult>,
    /// Files deleted once the build ends
    clear: Vec<PathBuf>,
    reporter: ProgressReporter,
}

/// Shared by every task of one build
#[derive(Debug)]
struct RunContext {
    runner: ProcessRunner,
    total: usize,
    dry_run: bool,
    /// A command reported an interrupted exit status
    interrupted: AtomicBool,
    signal: Arc<AtomicBool>,
    state: Mutex<RunState>,
}

impl RunContext {
    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst) || self.signal.load(Ordering::SeqCst)
    }

    fn run_node(&self, node: &Node) -> bool {
        if self.is_interrupted() {
            return false;
        }

        {
            let mut state = self.state.lock();
            state.started += 1;
            let started = state.started;
            state.reporter.node_started(started, self.total, node);
        }

        if self.dry_run {
            self.state.lock().succeeded += 1;
            return true;
        }

        match &node.action {
            Action::InProcess(func) => match func() {
                Ok(()) => self.succeed(node, Vec::new(), ""),
                Err(e) => self.fail(node, &format!("{}", e), None),
            },
            Action::Shell => self.run_command(node),
        }
    }

    fn run_command(&self, node: &Node) -> bool {
        let result = self.runner.run(&node.command, None);
        if !result.started {
            return self.fail(node, "Failed to start command", None);
        }

        let output = skip_lines(&result.output_lossy(), node.command.skip_lines);
        if result.interrupted() {
            self.interrupted.store(true, Ordering::SeqCst);
            return self.fail(node, "", Some(result.exit_code));
        }

        let format = node.command.deps_format;
        if !result.success() {
            let output = if format == DependencyFormat::ShowIncludes {
                crate::depfile::extract_show_includes(&output).1
            } else {
                output
            };
            return self.fail(node, &output, Some(result.exit_code));
        }

        match read_dependencies(format, node.deps_path().map(PathBuf::as_path), &output) {
            Ok(discovered) => self.succeed(node, discovered.dependencies, &discovered.output),
            Err(e) => {
                warn!(node = %node.text, "{}", e);
                let mut state = self.state.lock();
                state.succeeded += 1;
                state.reporter.command_output(&output);
                // Without dependencies the output cannot be trusted next time
                state.results.push(NodeResult::Failed {
                    dest: node.dest.clone(),
                });
                true
            }
        }
    }

    fn succeed(&self, node: &Node, dependencies: Vec<PathBuf>, output: &str) -> bool {
        let mut state = self.state.lock();
        state.succeeded += 1;
        state.reporter.command_output(output);
        state.results.push(NodeResult::Built {
            dest: node.dest.clone(),
            command: node.command.cache_key().to_string(),
            dependencies,
        });
        true
    }

    fn fail(&self, node: &Node, output: &str, exit_code: Option<i32>) -> bool {
        let interrupted = self.is_interrupted();

        let mut state = self.state.lock();
        state.failed += 1;
        state.reporter.command_output(output);
        if !interrupted {
            match exit_code {
                Some(code) => error!(node = %node.text, exit_code = code, "Command failed"),
                None => error!(node = %node.text, "Node failed"),
            }
        }

        state.results.push(NodeResult::Failed {
            dest: node.dest.clone(),
        });
        state.clear.push(node.dest.clone());
        if let Some(deps) = node.deps_path() {
            state.clear.push(deps.clone());
        }
        false
    }
}

pub struct Builder {
    settings: BuildSettings,
    graph: GraphBuilder,
    runner: ProcessRunner,
    output: Option<OutputMode>,
}

impl Builder {
    /// Builder loading the cache of `settings.output_dir`
    pub fn new(settings: BuildSettings, tools: Tools) -> Self {
        let cache_dir = settings.cache_dir(tools.toolchain.name());
        let cache = BuildCache::load(settings.cache_file());
        let oracle = RebuildOracle::new(settings.rebuild);
        let runner = ProcessRunner::new(cache_dir.join("Misc"));

        let graph = GraphBuilder::new(
            GraphSettings {
                output_dir: settings.output_dir.clone(),
                cache_dir,
                features: settings.features,
                version: settings.version.clone(),
                use_env_flags: settings.use_env_flags,
                dry_run: settings.dry_run,
            },
            tools,
            oracle,
            cache,
        );

        Self {
            settings,
            graph,
            runner,
            output: None,
        }
    }

    /// Send progress somewhere else than stderr
    pub fn with_output(mut self, mode: OutputMode) -> Self {
        self.output = Some(mode);
        self
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    /// Flag that stops the build when set, for signal handlers
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.settings.interrupt)
    }

    /// Expand a target, atomically
    pub fn add_target(&mut self, target: &Target) -> BuildResult<()> {
        debug!(target = %target.name, kind = %target.kind, "Adding target");
        self.graph.add_target(target)
    }

    pub fn add_source(&mut self, source: &Source, namespace: &str) -> BuildResult<Option<PathBuf>> {
        self.graph.add_source(source, namespace)
    }

    /// Final output of every linked target
    pub fn target_outputs(&self) -> &BTreeMap<String, PathBuf> {
        self.graph.target_outputs()
    }

    /// Stale nodes waiting to run, per stage
    pub fn node_counts(&self) -> NodeCounts {
        self.graph.nodes().counts()
    }

    pub fn nodes(&self) -> &NodeLists {
        self.graph.nodes()
    }

    pub fn cache(&self) -> &BuildCache {
        self.graph.cache()
    }

    /// Run everything added so far with up to `jobs` parallel tasks
    pub fn build(&mut self, jobs: usize, verbose: bool) -> BuildResult<BuildReport> {
        let pool = TaskPool::new(jobs);
        self.build_with(&pool, verbose)
    }

    pub fn build_with(&mut self, pool: &TaskPool, verbose: bool) -> BuildResult<BuildReport> {
        let start = Instant::now();
        let nodes = self.graph.take_nodes();
        let total = nodes.counts().total();

        if total == 0 {
            info!("Nothing to do");
            return Ok(BuildReport {
                outcome: BuildOutcome::Success,
                stats: BuildStats {
                    total_time: start.elapsed(),
                    ..BuildStats::default()
                },
            });
        }

        let mode = self.output.take().unwrap_or(OutputMode::Normal);
        let ctx = Arc::new(RunContext {
            runner: self.runner.clone(),
            total,
            dry_run: self.settings.dry_run,
            interrupted: AtomicBool::new(false),
            signal: Arc::clone(&self.settings.interrupt),
            state: Mutex::new(RunState {
                started: 0,
                succeeded: 0,
                failed: 0,
                results: Vec::new(),
                clear: Vec::new(),
                reporter: ProgressReporter::new(mode, verbose),
            }),
        });

        let mut outcome = BuildOutcome::Success;
        let mut lists = nodes;
        for stage in Stage::all() {
            let stage_nodes = std::mem::take(lists.stage_mut(stage));
            if stage_nodes.is_empty() {
                continue;
            }

            debug!(stage = stage.name(), nodes = stage_nodes.len(), "Running stage");
            let success = self.run_stage(pool, &ctx, stage_nodes);

            if ctx.is_interrupted() {
                outcome = BuildOutcome::Interrupted;
                break;
            }
            if !success {
                outcome = BuildOutcome::Failed;
                if !self.settings.keep_going {
                    break;
                }
            }
        }

        let (started, succeeded, failed, results, clear) = {
            let mut state = ctx.state.lock();
            (
                state.started,
                state.succeeded,
                state.failed,
                std::mem::take(&mut state.results),
                std::mem::take(&mut state.clear),
            )
        };

        for failure in remove_files(&clear, CLEAR_ATTEMPTS, CLEAR_DELAY) {
            warn!("Failed to delete {}", failure);
        }

        if !self.settings.dry_run {
            self.record_results(results);
            if outcome != BuildOutcome::Interrupted {
                self.save_cache()?;
            }
        }

        let stats = BuildStats {
            scheduled: total,
            succeeded,
            failed,
            total_time: start.elapsed(),
        };
        match outcome {
            BuildOutcome::Success => info!(
                nodes = started,
                "Done in {}",
                format_duration(stats.total_time)
            ),
            BuildOutcome::Failed => error!(failed = stats.failed, "Build failed"),
            BuildOutcome::Interrupted => warn!("Build was interrupted"),
        }

        Ok(BuildReport { outcome, stats })
    }

    fn run_stage(&self, pool: &TaskPool, ctx: &Arc<RunContext>, nodes: Vec<Node>) -> bool {
        let group = TaskGroup::new(pool).with_stop_after_error(self.settings.stop_after_error);

        for node in nodes {
            let sync_after = node.sync_after;
            let task_ctx = Arc::clone(ctx);
            group.run(move || task_ctx.run_node(&node));

            if sync_after {
                let success = group.sync();
                if ctx.is_interrupted() || (!success && self.settings.stop_after_error)
                {
                    break;
                }
            }
        }

        group.sync()
    }

    fn record_results(&mut self, results: Vec<NodeResult>) {
        let cache = self.graph.cache_mut();
        for result in results {
            match result {
                NodeResult::Built {
                    dest,
                    command,
                    dependencies,
                } => {
                    let deps = dependencies
                        .into_iter()
                        .map(|path| DependencyEntry {
                            mtime: fs::modification_time(&path),
                            path,
                        })
                        .collect();
                    cache.insert(dest, command, deps);
                }
                NodeResult::Failed { dest } => {
                    cache.remove(&dest);
                }
            }
        }
    }

    fn save_cache(&self) -> BuildResult<()> {
        let cache = self.graph.cache();
        cache.save()?;

        let directory = std::env::current_dir().map_err(|e| BuildError::io(".", e))?;
        let database = self.settings.output_dir.join("compile_commands.json");
        cache.write_compile_database(&database, &directory)
    }
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("settings", &self.settings)
            .field("graph", &self.graph)
            .finish()
    }
}

fn skip_lines(output: &str, count: usize) -> String {
    if count == 0 {
        return output.to_string();
    }
    output
        .split_inclusive('\n')
        .skip(count)
        .collect::<String>()
}

/// Delete the output directory
pub fn clean(output_dir: &Path) -> BuildResult<()> {
    match std::fs::remove_dir_all(output_dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BuildError::io(output_dir, e)),
    }
}

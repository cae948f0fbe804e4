//! Graph construction: expands targets into stale build nodes
//!
//! Every source, precompiled header, generated file and link output of a
//! target is turned into a candidate [`Node`]. The [`RebuildOracle`] decides
//! whether the candidate is stale, and only stale ones end up in the node
//! lists. Outputs shared by several targets are produced once: a
//! `(namespace, source)` map remembers what was already expanded.
//!
//! Adding a target is atomic. Every change made while expanding it is
//! journaled and undone when a later step fails, so a rejected target leaves
//! the graph exactly as it was.

use crate::cache::BuildCache;
use crate::embed::{write_embed_source, EmbedOptions};
use crate::error::{BuildError, BuildResult};
use crate::features::Features;
use crate::fs::{ensure_parent, write_if_changed};
use crate::node::{Node, NodeCounts, NodeFn, NodeLists, Stage};
use crate::oracle::RebuildOracle;
use crate::targets::{Source, SourceKind, Target, TargetKind};
use crate::toolchain::{
    quote, Bundler, Command, CompileRequest, LinkKind, LinkRequest, Toolchain, UiCompiler,
};
use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Inputs of graph construction that do not change during a run
#[derive(Debug, Clone)]
pub struct GraphSettings {
    /// Directory receiving final binaries
    pub output_dir: PathBuf,
    /// Directory receiving intermediate files, specific to a toolchain and host
    pub cache_dir: PathBuf,
    pub features: Features,
    /// Embedded in the version marker
    pub version: Option<String>,
    /// Append `CFLAGS`, `CXXFLAGS`, `CPPFLAGS` and `LDFLAGS` to commands
    pub use_env_flags: bool,
    /// Plan only: generated files are not written
    pub dry_run: bool,
}

/// External programs used to build sources
#[derive(Debug, Clone)]
pub struct Tools {
    pub toolchain: Arc<dyn Toolchain>,
    pub bundler: Option<Arc<dyn Bundler>>,
    pub ui_compiler: Option<Arc<dyn UiCompiler>>,
}

impl Tools {
    pub fn new(toolchain: Arc<dyn Toolchain>) -> Self {
        Self {
            toolchain,
            bundler: None,
            ui_compiler: None,
        }
    }
}

/// Result of graph construction
#[derive(Debug)]
pub struct BuildGraph {
    pub nodes: NodeLists,
    pub cache: BuildCache,
    pub target_outputs: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Default)]
struct EnvFlags {
    c: Option<String>,
    cxx: Option<String>,
    link: Option<String>,
}

impl EnvFlags {
    fn from_env() -> Self {
        let read = |names: &[&str]| {
            let flags: Vec<String> = names
                .iter()
                .filter_map(|name| std::env::var(name).ok())
                .filter(|value| !value.trim().is_empty())
                .collect();
            (!flags.is_empty()).then(|| flags.join(" "))
        };

        Self {
            c: read(&["CFLAGS", "CPPFLAGS"]),
            cxx: read(&["CXXFLAGS", "CPPFLAGS"]),
            link: read(&["LDFLAGS"]),
        }
    }

    fn for_kind(&self, kind: SourceKind) -> Option<&str> {
        match kind {
            SourceKind::Cxx => self.cxx.as_deref(),
            _ => self.c.as_deref(),
        }
    }
}

/// Changes to undo when a target fails to expand
#[derive(Debug)]
enum Undo {
    BuildKey((String, PathBuf)),
    Node(PathBuf),
    SyncAfter(Stage, usize),
    TargetOutput(String, Option<PathBuf>),
    VersionObject,
}

pub struct GraphBuilder {
    settings: GraphSettings,
    tools: Tools,
    oracle: RebuildOracle,
    cache: BuildCache,
    nodes: NodeLists,
    build_map: HashMap<(String, PathBuf), PathBuf>,
    node_stages: HashMap<PathBuf, Stage>,
    target_outputs: BTreeMap<String, PathBuf>,
    version_object: Option<PathBuf>,
    env_flags: EnvFlags,
    journal: Vec<Undo>,
}

impl GraphBuilder {
    pub fn new(settings: GraphSettings, tools: Tools, oracle: RebuildOracle, cache: BuildCache) -> Self {
        let env_flags = if settings.use_env_flags {
            EnvFlags::from_env()
        } else {
            EnvFlags::default()
        };

        Self {
            settings,
            tools,
            oracle,
            cache,
            nodes: NodeLists::default(),
            build_map: HashMap::new(),
            node_stages: HashMap::new(),
            target_outputs: BTreeMap::new(),
            version_object: None,
            env_flags,
            journal: Vec::new(),
        }
    }

    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    pub fn tools(&self) -> &Tools {
        &self.tools
    }

    pub fn nodes(&self) -> &NodeLists {
        &self.nodes
    }

    /// Hand the stale nodes over for execution, leaving the lists empty
    pub fn take_nodes(&mut self) -> NodeLists {
        self.node_stages.clear();
        std::mem::take(&mut self.nodes)
    }

    pub fn oracle(&self) -> &RebuildOracle {
        &self.oracle
    }

    pub fn cache(&self) -> &BuildCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut BuildCache {
        &mut self.cache
    }

    pub fn target_outputs(&self) -> &BTreeMap<String, PathBuf> {
        &self.target_outputs
    }

    /// Output of a source that was already expanded in `namespace`
    pub fn find_output(&self, namespace: &str, source: &Path) -> Option<&Path> {
        self.build_map
            .get(&(namespace.to_string(), source.to_path_buf()))
            .map(PathBuf::as_path)
    }

    /// Expand `target` into stale nodes.
    ///
    /// On error nothing the call added remains: node lists, output set and
    /// source map are restored to their state before the call.
    pub fn add_target(&mut self, target: &Target) -> BuildResult<()> {
        let checkpoint = self.checkpoint();
        match self.expand_target(target) {
            Ok(()) => {
                self.journal.clear();
                Ok(())
            }
            Err(e) => {
                debug!(target = %target.name, "Rolling back target: {}", e);
                self.rollback(checkpoint);
                Err(e)
            }
        }
    }

    /// Expand a single source in `namespace`, returning its output.
    ///
    /// Object files need no building and return `None`.
    pub fn add_source(&mut self, source: &Source, namespace: &str) -> BuildResult<Option<PathBuf>> {
        let checkpoint = self.checkpoint();
        let result = match source.kind {
            SourceKind::C | SourceKind::Cxx => self.add_cpp_source(source, namespace, &[]).map(Some),
            SourceKind::Bundle => self.add_bundle_source(source, namespace).map(Some),
            SourceKind::UiForm => self.add_ui_source(source, namespace).map(Some),
            SourceKind::Object => {
                warn!(source = %source.path.display(), "Object file does not need to be built");
                Ok(None)
            }
        };

        match result {
            Ok(output) => {
                self.journal.clear();
                Ok(output)
            }
            Err(e) => {
                self.rollback(checkpoint);
                Err(e)
            }
        }
    }

    /// Intermediate path for `path` under `<cache>[/<namespace>]/Objects`.
    ///
    /// Root and prefix components are dropped and `..` becomes `__`, so the
    /// result always stays inside the cache directory.
    pub fn object_path(&self, namespace: &str, path: &Path, suffix: &str) -> PathBuf {
        self.intermediate_path(namespace, "Objects", path, suffix)
    }

    pub fn finish(self) -> BuildGraph {
        BuildGraph {
            nodes: self.nodes,
            cache: self.cache,
            target_outputs: self.target_outputs,
        }
    }

    fn expand_target(&mut self, target: &Target) -> BuildResult<()> {
        let features = target.combine_features(self.settings.features);
        self.tools.toolchain.check_features(features)?;

        let ns = "";

        // UI headers first, every compile of the target depends on them
        let mut generated = Vec::new();
        for source in target.sources.iter().filter(|s| s.kind == SourceKind::UiForm) {
            generated.push(self.add_ui_source(source, ns)?);
        }

        let mut objects = Vec::new();
        let mut embedded = target.assets.clone();
        for source in &target.sources {
            match source.kind {
                SourceKind::C | SourceKind::Cxx => {
                    objects.push(self.add_cpp_source(source, ns, &generated)?);
                }
                SourceKind::Object => objects.push(source.path.clone()),
                SourceKind::Bundle => embedded.push(self.add_bundle_source(source, ns)?),
                SourceKind::UiForm => {}
            }
        }

        if !embedded.is_empty() {
            if let Some(object) = self.add_assets(target, &embedded, features)? {
                objects.push(object);
            }
        }

        if self.settings.features.contains(Features::PCH) {
            objects.extend(self.pch_objects(target, ns));
        }

        if target.kind == TargetKind::Executable {
            if let Some(icon) = &target.icon {
                objects.extend(self.add_icon(target, icon, ns)?);
            }
            objects.push(self.version_object()?);
        }

        if target.is_linked(self.settings.features) {
            let kind = match target.kind {
                TargetKind::Executable => LinkKind::Executable,
                TargetKind::Library | TargetKind::ExternalLibrary => LinkKind::SharedLibrary,
            };
            let output = self.settings.output_dir.join(format!(
                "{}{}",
                target.name,
                self.tools.toolchain.link_extension(kind)
            ));

            let cmd = self.tools.toolchain.make_link_command(&LinkRequest {
                objects: &objects,
                libraries: &target.libraries,
                kind,
                flags: self.env_flags.link.as_deref(),
                features,
                output: &output,
            });
            let text = format!("Link {}", last_directory_and_name(&output));
            self.append_node(Stage::Link, text, &output, cmd, &objects, None);

            let previous = self.target_outputs.insert(target.name.clone(), output);
            self.journal
                .push(Undo::TargetOutput(target.name.clone(), previous));
        }

        Ok(())
    }

    fn add_cpp_source(
        &mut self,
        source: &Source,
        ns: &str,
        generated: &[PathBuf],
    ) -> BuildResult<PathBuf> {
        let features = source.combine_features(self.settings.features);
        self.tools.toolchain.check_features(features)?;

        let pch = match source.owner.pch_for(source.kind) {
            Some(header) if features.contains(Features::PCH) => {
                Some(self.add_pch(source, header.to_path_buf(), ns)?)
            }
            _ => None,
        };

        let key = (ns.to_string(), source.path.clone());
        if let Some(object) = self.build_map.get(&key) {
            return Ok(object.clone());
        }

        let object = self.object_path(ns, &source.path, self.tools.toolchain.object_extension());

        let mut include_directories = source.owner.include_directories.clone();
        for header in generated {
            if let Some(dir) = header.parent() {
                if !include_directories.iter().any(|d| d == dir) {
                    include_directories.push(dir.to_path_buf());
                }
            }
        }

        let cmd = self.tools.toolchain.make_object_command(&CompileRequest {
            source: &source.path,
            kind: source.kind,
            pch: pch.as_deref(),
            definitions: &source.owner.definitions,
            include_directories: &include_directories,
            flags: self.env_flags.for_kind(source.kind),
            features,
            output: &object,
        });

        let mut inputs = vec![source.path.clone()];
        if let Some(stub) = &pch {
            inputs.push(self.tools.toolchain.pch_cache(stub));
        }
        inputs.extend(generated.iter().cloned());

        let text = format!("Compile {}", source.path.display());
        if self.append_node(Stage::Object, text, &object, cmd, &inputs, None) && !self.settings.dry_run {
            ensure_parent(&object)?;
        }

        self.insert_build_key(key, object.clone());
        Ok(object)
    }

    /// Schedule the precompiled header, returning the stub to force-include
    fn add_pch(&mut self, source: &Source, header: PathBuf, ns: &str) -> BuildResult<PathBuf> {
        let key = (ns.to_string(), header.clone());
        if let Some(stub) = self.build_map.get(&key) {
            return Ok(stub.clone());
        }

        let suffix = if source.kind == SourceKind::Cxx { ".cc" } else { ".c" };
        let stub = self.object_path(ns, &header, suffix);
        let cache = self.tools.toolchain.pch_cache(&stub);

        if !self.settings.dry_run {
            let content = format!(
                "// This file is auto-generated by kiln\n\n#include \"{}\"\n",
                forward_slashes(&absolute(&header)?)
            );
            write_if_changed(&stub, &content)?;
        }

        let features = source.owner.combine_features(self.settings.features);
        let cmd = self.tools.toolchain.make_pch_command(&CompileRequest {
            source: &stub,
            kind: source.kind,
            pch: None,
            definitions: &source.owner.definitions,
            include_directories: &source.owner.include_directories,
            flags: self.env_flags.for_kind(source.kind),
            features,
            output: &cache,
        });

        let text = format!("Precompile {}", header.display());
        self.append_node(Stage::Prep, text, &cache, cmd, &[header], None);

        self.insert_build_key(key, stub.clone());
        Ok(stub)
    }

    /// Objects produced alongside precompiled headers that must be linked
    fn pch_objects(&self, target: &Target, ns: &str) -> Vec<PathBuf> {
        let mut headers: Vec<&Path> = Vec::new();
        for source in &target.sources {
            if let Some(header) = source.owner.pch_for(source.kind) {
                if !headers.contains(&header) {
                    headers.push(header);
                }
            }
        }

        headers
            .into_iter()
            .filter_map(|header| self.find_output(ns, header))
            .filter_map(|stub| self.tools.toolchain.pch_object(stub))
            .collect()
    }

    fn add_bundle_source(&mut self, source: &Source, ns: &str) -> BuildResult<PathBuf> {
        let key = (ns.to_string(), source.path.clone());
        if let Some(bundle) = self.build_map.get(&key) {
            return Ok(bundle.clone());
        }

        let bundler = self.tools.bundler.clone().ok_or_else(|| {
            BuildError::ToolchainNotFound(format!(
                "no bundler available for '{}'",
                source.path.display()
            ))
        })?;

        let output = self.intermediate_path(ns, "Bundles", &source.path, ".js");
        let mut meta = output.clone().into_os_string();
        meta.push(".meta");
        let meta = PathBuf::from(meta);

        let cmd = bundler.make_bundle_command(&source.path, None, &output, &meta);
        let text = format!("Bundle {}", source.path.display());
        if self.append_node(Stage::Prep, text, &output, cmd, &[source.path.clone()], None)
            && !self.settings.dry_run
        {
            ensure_parent(&output)?;
        }

        self.insert_build_key(key, output.clone());
        Ok(output)
    }

    fn add_ui_source(&mut self, source: &Source, ns: &str) -> BuildResult<PathBuf> {
        let key = (ns.to_string(), source.path.clone());
        if let Some(header) = self.build_map.get(&key) {
            return Ok(header.clone());
        }

        let compiler = self.tools.ui_compiler.clone().ok_or_else(|| {
            BuildError::ToolchainNotFound(format!(
                "no UI compiler available for '{}'",
                source.path.display()
            ))
        })?;

        let stem = source
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = source.path.parent().unwrap_or_else(|| Path::new(""));
        let header = self
            .intermediate_path(ns, "Ui", dir, "")
            .join(format!("ui_{}.h", stem));

        let cmd = compiler.make_ui_command(&source.path, &header);
        let text = format!("Build UI {}", source.path.display());
        if self.append_node(Stage::Prep, text, &header, cmd, &[source.path.clone()], None)
            && !self.settings.dry_run
        {
            ensure_parent(&header)?;
        }

        self.insert_build_key(key, header.clone());
        Ok(header)
    }

    /// Embed and compile assets. Returns the object to link into the target,
    /// `None` when assets go to a separate module.
    fn add_assets(
        &mut self,
        target: &Target,
        files: &[PathBuf],
        features: Features,
    ) -> BuildResult<Option<PathBuf>> {
        let options = EmbedOptions::parse(target.asset_options.as_deref())?;
        let toolchain = Arc::clone(&self.tools.toolchain);

        let misc = self.settings.cache_dir.join("Misc");
        let source = misc.join(format!("{}_embed.c", target.name));
        let object = {
            let mut name = source.clone().into_os_string();
            name.push(toolchain.object_extension());
            PathBuf::from(name)
        };

        let mut key = format!("embed{}", options.to_key());
        for file in files {
            key.push(' ');
            key.push_str(&quote(file));
        }
        let func: NodeFn = {
            let files = files.to_vec();
            let options = options.clone();
            let source = source.clone();
            Arc::new(move || write_embed_source(&files, &options, &source))
        };
        let text = format!("Embed {} assets", target.name);
        self.append_node(Stage::Prep, text, &source, Command::new(key), files, Some(func));

        let module = features.contains(Features::HOT_ASSETS);
        let definitions = if module { vec!["EXPORT".to_string()] } else { Vec::new() };
        let cmd = toolchain.make_object_command(&CompileRequest {
            source: &source,
            kind: SourceKind::C,
            pch: None,
            definitions: &definitions,
            include_directories: &[],
            flags: self.env_flags.c.as_deref(),
            features: features & !Features::WARNINGS,
            output: &object,
        });
        let text = format!("Compile {} assets", target.name);
        self.append_node(Stage::Object, text, &object, cmd, &[source.clone()], None);

        if !self.settings.dry_run {
            ensure_parent(&source)?;
        }

        if !module {
            return Ok(Some(object));
        }

        let output = self.settings.output_dir.join(format!(
            "{}_assets{}",
            target.name,
            toolchain.link_extension(LinkKind::SharedLibrary)
        ));
        let objects = [object];
        let cmd = toolchain.make_link_command(&LinkRequest {
            objects: &objects,
            libraries: &[],
            kind: LinkKind::SharedLibrary,
            flags: self.env_flags.link.as_deref(),
            features,
            output: &output,
        });
        let text = format!("Link {}", last_directory_and_name(&output));
        self.append_node(Stage::Link, text, &output, cmd, &objects, None);

        Ok(None)
    }

    /// Compile the icon of an executable into a resource object, when the
    /// toolchain links resources
    fn add_icon(&mut self, target: &Target, icon: &Path, ns: &str) -> BuildResult<Option<PathBuf>> {
        let name = Path::new(&target.name);
        let script = self.intermediate_path(ns, "Resources", name, ".rc");
        let object = self.intermediate_path(ns, "Resources", name, ".res");
        let Some(cmd) = self.tools.toolchain.make_resource_command(&script, &object) else {
            debug!(target = %target.name, "Toolchain has no resources, icon ignored");
            return Ok(None);
        };

        if !self.settings.dry_run {
            let content = format!(
                "// This file is auto-generated by kiln\n\n1 ICON \"{}\"\n",
                forward_slashes(&absolute(icon)?)
            );
            write_if_changed(&script, &content)?;
        }

        let text = format!("Compile {} resources", target.name);
        let inputs = [script, icon.to_path_buf()];
        self.append_node(Stage::Object, text, &object, cmd, &inputs, None);
        Ok(Some(object))
    }

    /// Object of the version marker shared by every executable
    fn version_object(&mut self) -> BuildResult<PathBuf> {
        if let Some(object) = &self.version_object {
            return Ok(object.clone());
        }

        let source = self.settings.cache_dir.join("Misc").join("version.c");
        let object = {
            let mut name = source.clone().into_os_string();
            name.push(self.tools.toolchain.object_extension());
            PathBuf::from(name)
        };

        let features = self.settings.features;
        let content = format!(
            "// This file is auto-generated by kiln\n\n\
             const char *KilnVersion = \"{}\";\n\
             const char *KilnCompiler = \"{} ({})\";\n",
            escape_c(self.settings.version.as_deref().unwrap_or("unknown")),
            escape_c(self.tools.toolchain.title()),
            features
        );

        if self.settings.dry_run {
            if std::fs::read_to_string(&source).ok().as_deref() != Some(content.as_str()) {
                self.oracle.mark_scheduled(&source);
            }
        } else if write_if_changed(&source, &content)? {
            debug!(path = %source.display(), "Updated version marker");
        }

        let cmd = self.tools.toolchain.make_object_command(&CompileRequest {
            source: &source,
            kind: SourceKind::C,
            pch: None,
            definitions: &[],
            include_directories: &[],
            flags: self.env_flags.c.as_deref(),
            features: features & !Features::WARNINGS,
            output: &object,
        });
        self.append_node(
            Stage::Object,
            "Compile version file",
            &object,
            cmd,
            &[source],
            None,
        );

        self.version_object = Some(object.clone());
        self.journal.push(Undo::VersionObject);
        Ok(object)
    }

    /// Append a node for `dest` when the oracle finds it stale.
    ///
    /// A node consuming the output of an earlier node of the same stage makes
    /// the stage wait for what was queued before it.
    fn append_node(
        &mut self,
        stage: Stage,
        text: impl Into<String>,
        dest: &Path,
        command: Command,
        inputs: &[PathBuf],
        func: Option<NodeFn>,
    ) -> bool {
        if !self.oracle.needs_rebuild(dest, &command, inputs, &self.cache) {
            return false;
        }

        let consumes = inputs
            .iter()
            .any(|input| self.node_stages.get(input) == Some(&stage));
        if consumes {
            let list = self.nodes.stage_mut(stage);
            let idx = list.len().saturating_sub(1);
            if let Some(last) = list.last_mut() {
                if !last.sync_after {
                    last.sync_after = true;
                    self.journal.push(Undo::SyncAfter(stage, idx));
                }
            }
        }

        let node = match func {
            Some(func) => Node::in_process(text, dest, command, func),
            None => Node::new(text, dest, command),
        };
        self.nodes.stage_mut(stage).push(node);

        self.oracle.mark_output(dest);
        self.oracle.mark_scheduled(dest);
        self.node_stages.insert(dest.to_path_buf(), stage);
        self.journal.push(Undo::Node(dest.to_path_buf()));

        true
    }

    fn insert_build_key(&mut self, key: (String, PathBuf), output: PathBuf) {
        if self.build_map.insert(key.clone(), output).is_none() {
            self.journal.push(Undo::BuildKey(key));
        }
    }

    fn intermediate_path(&self, ns: &str, dir: &str, path: &Path, suffix: &str) -> PathBuf {
        let mut out = self.settings.cache_dir.clone();
        if !ns.is_empty() {
            out.push(ns);
        }
        out.push(dir);

        for component in path.components() {
            match component {
                Component::Normal(part) => out.push(part),
                Component::ParentDir => out.push("__"),
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }

        if suffix.is_empty() {
            return out;
        }
        let mut name = out.into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Start journaling a new atomic change
    fn checkpoint(&mut self) -> NodeCounts {
        self.journal.clear();
        self.nodes.counts()
    }

    fn rollback(&mut self, counts: NodeCounts) {
        while let Some(undo) = self.journal.pop() {
            match undo {
                Undo::BuildKey(key) => {
                    self.build_map.remove(&key);
                }
                Undo::Node(dest) => {
                    self.oracle.unmark_output(&dest);
                    self.node_stages.remove(&dest);
                }
                Undo::SyncAfter(stage, idx) => {
                    if let Some(node) = self.nodes.stage_mut(stage).get_mut(idx) {
                        node.sync_after = false;
                    }
                }
                Undo::TargetOutput(name, previous) => match previous {
                    Some(output) => {
                        self.target_outputs.insert(name, output);
                    }
                    None => {
                        self.target_outputs.remove(&name);
                    }
                },
                Undo::VersionObject => self.version_object = None,
            }
        }
        self.nodes.truncate(counts);
    }
}

impl std::fmt::Debug for GraphBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphBuilder")
            .field("settings", &self.settings)
            .field("nodes", &self.nodes.counts())
            .field("outputs", &self.target_outputs)
            .finish()
    }
}

fn absolute(path: &Path) -> BuildResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| BuildError::io(path, e))?;
    Ok(cwd.join(path))
}

fn forward_slashes(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}

/// `bin/gcc_linux@x86_64/app` -> `gcc_linux@x86_64/app`
fn last_directory_and_name(path: &Path) -> String {
    let mut parts: Vec<_> = path
        .components()
        .rev()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .take(2)
        .collect();
    parts.reverse();
    parts.join("/")
}

fn escape_c(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

//! Schedulable build steps

use crate::error::BuildResult;
use crate::toolchain::Command;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// In-process replacement for a command line
pub type NodeFn = Arc<dyn Fn() -> BuildResult<()> + Send + Sync>;

/// One of the three ordered build stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Precompiled headers, generated sources, bundles
    Prep,
    /// Compiles
    Object,
    /// Executables, libraries, asset modules
    Link,
}

impl Stage {
    pub fn all() -> [Stage; 3] {
        [Self::Prep, Self::Object, Self::Link]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Prep => "prep",
            Self::Object => "object",
            Self::Link => "link",
        }
    }
}

#[derive(Clone)]
pub enum Action {
    /// Run `Node::command` as a subprocess
    Shell,
    /// Call a function; `Node::command` is only a cache key
    InProcess(NodeFn),
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shell => write!(f, "Shell"),
            Self::InProcess(_) => write!(f, "InProcess"),
        }
    }
}

/// A build step that was found stale and must run
#[derive(Debug, Clone)]
pub struct Node {
    /// Progress description, e.g. `Compile src/app.c`
    pub text: String,
    pub dest: PathBuf,
    pub command: Command,
    pub action: Action,
    /// Wait for everything scheduled so far in the stage once this node is
    /// queued, before queuing more
    pub sync_after: bool,
}

impl Node {
    pub fn new(text: impl Into<String>, dest: impl Into<PathBuf>, command: Command) -> Self {
        Self {
            text: text.into(),
            dest: dest.into(),
            command,
            action: Action::Shell,
            sync_after: false,
        }
    }

    pub fn in_process(
        text: impl Into<String>,
        dest: impl Into<PathBuf>,
        command: Command,
        func: NodeFn,
    ) -> Self {
        Self {
            action: Action::InProcess(func),
            ..Self::new(text, dest, command)
        }
    }

    pub fn deps_path(&self) -> Option<&PathBuf> {
        self.command.deps_path.as_ref()
    }
}

/// Stale nodes of a build, partitioned by stage
#[derive(Debug, Clone, Default)]
pub struct NodeLists {
    pub prep: Vec<Node>,
    pub object: Vec<Node>,
    pub link: Vec<Node>,
}

/// Lengths of the three node lists, used to roll back a partial target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeCounts {
    pub prep: usize,
    pub object: usize,
    pub link: usize,
}

impl NodeCounts {
    pub fn total(&self) -> usize {
        self.prep + self.object + self.link
    }
}

impl NodeLists {
    pub fn stage(&self, stage: Stage) -> &[Node] {
        match stage {
            Stage::Prep => &self.prep,
            Stage::Object => &self.object,
            Stage::Link => &self.link,
        }
    }

    pub fn stage_mut(&mut self, stage: Stage) -> &mut Vec<Node> {
        match stage {
            Stage::Prep => &mut self.prep,
            Stage::Object => &mut self.object,
            Stage::Link => &mut self.link,
        }
    }

    pub fn counts(&self) -> NodeCounts {
        NodeCounts {
            prep: self.prep.len(),
            object: self.object.len(),
            link: self.link.len(),
        }
    }

    pub fn truncate(&mut self, counts: NodeCounts) {
        self.prep.truncate(counts.prep);
        self.object.truncate(counts.object);
        self.link.truncate(counts.link);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.prep.iter().chain(&self.object).chain(&self.link)
    }

    pub fn is_empty(&self) -> bool {
        self.counts().total() == 0
    }
}

//! Persisted build state shared between runs
//!
//! For every output that was produced successfully, the cache remembers the
//! command line that produced it and which files that command read, with the
//! modification time each file had when the run ended. The next run compares
//! both against the current state to decide whether the output is fresh.
//!
//! The whole cache is one JSON document per output directory, loaded once at
//! builder construction and rewritten atomically at the end of a run.

pub mod compile_db;

use crate::error::{BuildError, BuildResult};
use crate::fs::{atomic_write, Mtime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

pub use compile_db::CompileCommand;

const CACHE_FORMAT_VERSION: u32 = 1;

/// One recorded dependency, `mtime` is `None` when the file was missing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEntry {
    pub path: PathBuf,
    pub mtime: Option<Mtime>,
}

/// Cache record for a single output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Comparable part of the command line that produced the output
    pub command: String,
    /// Range of this entry's dependencies in the flat dependency table
    pub deps_offset: usize,
    pub deps_len: usize,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: Vec<StoredEntry>,
    dependencies: Vec<DependencyEntry>,
}

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    output: PathBuf,
    command: String,
    deps_offset: usize,
    deps_len: usize,
}

/// Command and dependency cache for one output directory
#[derive(Debug, Default)]
pub struct BuildCache {
    path: PathBuf,
    entries: BTreeMap<PathBuf, CacheEntry>,
    dependencies: Vec<DependencyEntry>,
}

impl BuildCache {
    /// Create an empty cache that will be saved to `path`
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
            dependencies: Vec::new(),
        }
    }

    /// Load the cache stored at `path`.
    ///
    /// A missing file gives an empty cache. A corrupt file is deleted and
    /// also gives an empty cache, so a damaged cache only costs a rebuild.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !path.exists() {
            return Self::empty(path);
        }

        match Self::read(&path) {
            Ok(cache) => {
                debug!(
                    path = %path.display(),
                    entries = cache.entries.len(),
                    "Loaded build cache"
                );
                cache
            }
            Err(e) => {
                error!("Purging cache file '{}': {}", path.display(), e);
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!("Failed to delete {}: {}", path.display(), e);
                }
                Self::empty(path)
            }
        }
    }

    fn read(path: &Path) -> BuildResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
        let file: CacheFile = serde_json::from_str(&content)?;

        if file.version != CACHE_FORMAT_VERSION {
            return Err(BuildError::CacheError(format!(
                "unsupported cache version {}",
                file.version
            )));
        }

        let mut entries = BTreeMap::new();
        for stored in file.entries {
            let end = stored.deps_offset.checked_add(stored.deps_len);
            if end.map_or(true, |end| end > file.dependencies.len()) {
                return Err(BuildError::CacheError(format!(
                    "dependency range out of bounds for '{}'",
                    stored.output.display()
                )));
            }

            entries.insert(
                stored.output,
                CacheEntry {
                    command: stored.command,
                    deps_offset: stored.deps_offset,
                    deps_len: stored.deps_len,
                },
            );
        }

        Ok(Self {
            path: path.to_path_buf(),
            entries,
            dependencies: file.dependencies,
        })
    }

    /// Write the cache to disk, compacting the dependency table
    pub fn save(&self) -> BuildResult<()> {
        let mut entries = Vec::with_capacity(self.entries.len());
        let mut dependencies = Vec::new();

        for (output, entry) in &self.entries {
            let deps = self.dependencies(entry);
            entries.push(StoredEntry {
                output: output.clone(),
                command: entry.command.clone(),
                deps_offset: dependencies.len(),
                deps_len: deps.len(),
            });
            dependencies.extend_from_slice(deps);
        }

        let file = CacheFile {
            version: CACHE_FORMAT_VERSION,
            entries,
            dependencies,
        };
        let json = serde_json::to_vec(&file)?;
        atomic_write(&self.path, &json)?;

        debug!(path = %self.path.display(), entries = file.entries.len(), "Saved build cache");
        Ok(())
    }

    /// Path of the cache file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn find(&self, output: &Path) -> Option<&CacheEntry> {
        self.entries.get(output)
    }

    /// Recorded dependencies of an entry
    pub fn dependencies(&self, entry: &CacheEntry) -> &[DependencyEntry] {
        let end = (entry.deps_offset + entry.deps_len).min(self.dependencies.len());
        let start = entry.deps_offset.min(end);
        &self.dependencies[start..end]
    }

    /// Record (or replace) the entry for `output`
    pub fn insert(
        &mut self,
        output: impl Into<PathBuf>,
        command: impl Into<String>,
        deps: Vec<DependencyEntry>,
    ) {
        let entry = CacheEntry {
            command: command.into(),
            deps_offset: self.dependencies.len(),
            deps_len: deps.len(),
        };
        self.dependencies.extend(deps);
        self.entries.insert(output.into(), entry);
    }

    pub fn remove(&mut self, output: &Path) -> Option<CacheEntry> {
        self.entries.remove(output)
    }

    /// Iterate over entries in output path order
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &CacheEntry)> {
        self.entries.iter().map(|(path, entry)| (path.as_path(), entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Staleness decisions for build outputs
//!
//! The oracle answers one question per output: does the command that
//! produces it have to run? It looks at, in order, whether the output was
//! already scheduled during this run, the cross-run cache entry (command
//! line and recorded dependencies), and a dependency file left on disk by a
//! previous run. Without any of them the output is stale.
//!
//! File modification times are read at most once per run. An output that
//! gets scheduled is remembered as missing, so everything consuming it is
//! stale too.

use crate::cache::{BuildCache, DependencyEntry};
use crate::depfile::{parse_dependency_file, DependencyFormat};
use crate::fs::{self, Mtime};
use crate::toolchain::Command;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Default)]
pub struct RebuildOracle {
    mtimes: HashMap<PathBuf, Option<Mtime>>,
    outputs: HashSet<PathBuf>,
    rebuild: bool,
}

impl RebuildOracle {
    /// With `rebuild`, every output not yet scheduled in this run is stale
    pub fn new(rebuild: bool) -> Self {
        Self {
            rebuild,
            ..Self::default()
        }
    }

    /// Decide whether `output` must be (re)built from `inputs` by `command`
    pub fn needs_rebuild(
        &mut self,
        output: &Path,
        command: &Command,
        inputs: &[PathBuf],
        cache: &BuildCache,
    ) -> bool {
        if self.outputs.contains(output) {
            return false;
        }
        if self.rebuild {
            return true;
        }

        if let Some(entry) = cache.find(output) {
            if command.cache_key() != entry.command {
                debug!(output = %output.display(), "Command line changed");
                return true;
            }
            return !self.is_up_to_date(output, inputs)
                || !self.is_up_to_date_with(output, cache.dependencies(entry));
        }

        let on_disk = match (command.deps_format, &command.deps_path) {
            (DependencyFormat::Make | DependencyFormat::BundleMeta, Some(path)) if path.exists() => {
                Some((command.deps_format, path))
            }
            _ => None,
        };
        match on_disk {
            Some((format, path)) => match parse_dependency_file(format, path) {
                Ok(deps) => !self.is_up_to_date(output, inputs) || !self.is_up_to_date(output, &deps),
                Err(e) => {
                    debug!(output = %output.display(), "Assuming stale: {}", e);
                    true
                }
            },
            None => true,
        }
    }

    /// Whether `output` exists and no input is strictly newer than it
    pub fn is_up_to_date(&mut self, output: &Path, inputs: &[PathBuf]) -> bool {
        if self.rebuild {
            return false;
        }
        let Some(output_time) = self.modification_time(output) else {
            return false;
        };

        inputs.iter().all(|input| {
            self.modification_time(input)
                .is_some_and(|time| time <= output_time)
        })
    }

    /// Like [`is_up_to_date`](Self::is_up_to_date) for recorded dependencies,
    /// which must also still carry the modification time they were recorded with
    pub fn is_up_to_date_with(&mut self, output: &Path, deps: &[DependencyEntry]) -> bool {
        if self.rebuild {
            return false;
        }
        let Some(output_time) = self.modification_time(output) else {
            return false;
        };

        deps.iter().all(|dep| match self.modification_time(&dep.path) {
            Some(time) => time <= output_time && Some(time) == dep.mtime,
            None => false,
        })
    }

    /// Memoized modification time, `None` for missing files
    pub fn modification_time(&mut self, path: &Path) -> Option<Mtime> {
        if let Some(time) = self.mtimes.get(path) {
            return *time;
        }
        let time = fs::modification_time(path);
        self.mtimes.insert(path.to_path_buf(), time);
        time
    }

    /// Record that `output` will be rewritten: anything depending on it is stale
    pub fn mark_scheduled(&mut self, output: &Path) {
        self.mtimes.insert(output.to_path_buf(), None);
    }

    /// Record that `output` is produced in this run. Returns false when it
    /// already was.
    pub fn mark_output(&mut self, output: &Path) -> bool {
        self.outputs.insert(output.to_path_buf())
    }

    pub fn is_output(&self, output: &Path) -> bool {
        self.outputs.contains(output)
    }

    /// Forget `output`, used when the node producing it is rolled back
    pub fn unmark_output(&mut self, output: &Path) {
        self.outputs.remove(output);
        self.mtimes.remove(output);
    }

    pub fn rebuild(&self) -> bool {
        self.rebuild
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs::File;
    use std::time::{Duration, SystemTime};

    fn touch(path: &Path, time: SystemTime) {
        let file = File::options()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.set_modified(time).unwrap();
    }

    fn base_time() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    #[rstest]
    #[case(-1, false)]
    #[case(0, false)]
    #[case(1, true)]
    fn test_declared_input_staleness(#[case] offset: i64, #[case] stale: bool) {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.c");
        let output = dir.path().join("a.o");
        touch(&output, base_time());
        let input_time = if offset >= 0 {
            base_time() + Duration::from_secs(offset as u64)
        } else {
            base_time() - Duration::from_secs((-offset) as u64)
        };
        touch(&input, input_time);

        let command = Command::new("cc -c a.c");
        let mut cache = BuildCache::empty(dir.path().join("cache.json"));
        cache.insert(&output, "cc -c a.c", Vec::new());

        let mut oracle = RebuildOracle::new(false);
        assert_eq!(
            oracle.needs_rebuild(&output, &command, &[input], &cache),
            stale
        );
    }

    #[test]
    fn test_missing_cache_entry_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("a.o");
        touch(&output, base_time());

        let cache = BuildCache::empty(dir.path().join("cache.json"));
        let mut oracle = RebuildOracle::new(false);
        assert!(oracle.needs_rebuild(&output, &Command::new("cc"), &[], &cache));
    }

    #[test]
    fn test_changed_command_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("a.o");
        touch(&output, base_time());

        let mut cache = BuildCache::empty(dir.path().join("cache.json"));
        cache.insert(&output, "cc -O0 -c a.c", Vec::new());

        let mut oracle = RebuildOracle::new(false);
        assert!(oracle.needs_rebuild(&output, &Command::new("cc -O2 -c a.c"), &[], &cache));
        assert!(!oracle.needs_rebuild(&output, &Command::new("cc -O0 -c a.c"), &[], &cache));
    }

    #[test]
    fn test_recorded_dependency_mtime_must_match() {
        let dir = tempfile::tempdir().unwrap();
        let header = dir.path().join("util.h");
        let output = dir.path().join("a.o");
        touch(&header, base_time() - Duration::from_secs(10));
        touch(&output, base_time());

        let recorded = fs::modification_time(&header).unwrap();
        let mut cache = BuildCache::empty(dir.path().join("cache.json"));
        cache.insert(
            &output,
            "cc",
            vec![DependencyEntry {
                path: header.clone(),
                mtime: Some(recorded),
            }],
        );
        let mut oracle = RebuildOracle::new(false);
        assert!(!oracle.needs_rebuild(&output, &Command::new("cc"), &[], &cache));

        // Older than the output but not the file that was recorded (e.g. checkout)
        touch(&header, base_time() - Duration::from_secs(20));
        let mut oracle = RebuildOracle::new(false);
        assert!(oracle.needs_rebuild(&output, &Command::new("cc"), &[], &cache));
    }

    #[test]
    fn test_dependency_file_on_disk_without_cache() {
        let dir = tempfile::tempdir().unwrap();
        let header = dir.path().join("util.h");
        let output = dir.path().join("a.o");
        let depfile = dir.path().join("a.o.d");
        touch(&output, base_time());
        touch(&header, base_time() - Duration::from_secs(5));
        std::fs::write(&depfile, format!("a.o: {}\n", header.display())).unwrap();

        let command = Command::new("cc").with_deps(DependencyFormat::Make, Some(depfile.clone()));
        let cache = BuildCache::empty(dir.path().join("cache.json"));

        let mut oracle = RebuildOracle::new(false);
        assert!(!oracle.needs_rebuild(&output, &command, &[], &cache));

        touch(&header, base_time() + Duration::from_secs(5));
        let mut oracle = RebuildOracle::new(false);
        assert!(oracle.needs_rebuild(&output, &command, &[], &cache));

        std::fs::write(&depfile, "not a rule at all").unwrap();
        touch(&header, base_time() - Duration::from_secs(5));
        let mut oracle = RebuildOracle::new(false);
        assert!(oracle.needs_rebuild(&output, &command, &[], &cache));
    }

    #[test]
    fn test_scheduled_output_makes_consumers_stale() {
        let dir = tempfile::tempdir().unwrap();
        let object = dir.path().join("a.o");
        let binary = dir.path().join("app");
        touch(&object, base_time() - Duration::from_secs(1));
        touch(&binary, base_time());

        let mut oracle = RebuildOracle::new(false);
        assert!(oracle.is_up_to_date(&binary, &[object.clone()]));

        let mut oracle = RebuildOracle::new(false);
        oracle.mark_scheduled(&object);
        assert!(!oracle.is_up_to_date(&binary, &[object]));
    }

    #[test]
    fn test_output_is_never_requested_twice() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("a.o");
        let cache = BuildCache::empty(dir.path().join("cache.json"));

        let mut oracle = RebuildOracle::new(true);
        assert!(oracle.needs_rebuild(&output, &Command::new("cc"), &[], &cache));
        assert!(oracle.mark_output(&output));
        assert!(!oracle.mark_output(&output));
        assert!(!oracle.needs_rebuild(&output, &Command::new("cc"), &[], &cache));
    }
}

//! `compile_commands.json` export for editors and language servers

use super::BuildCache;
use crate::error::BuildResult;
use crate::fs::atomic_write;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One entry of a JSON compilation database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileCommand {
    pub directory: PathBuf,
    pub command: String,
    pub file: PathBuf,
    pub output: PathBuf,
}

impl BuildCache {
    /// Entries with recorded dependencies, as compilation database records.
    /// The first dependency of an entry is taken as its main file.
    pub fn compile_commands(&self, directory: &Path) -> Vec<CompileCommand> {
        self.iter()
            .filter_map(|(output, entry)| {
                let first = self.dependencies(entry).first()?;
                Some(CompileCommand {
                    directory: directory.to_path_buf(),
                    command: entry.command.clone(),
                    file: first.path.clone(),
                    output: output.to_path_buf(),
                })
            })
            .collect()
    }

    pub fn write_compile_database(&self, path: &Path, directory: &Path) -> BuildResult<()> {
        let commands = self.compile_commands(directory);
        let json = serde_json::to_string_pretty(&commands)?;
        atomic_write(path, json.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DependencyEntry;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_entries_without_dependencies_are_skipped() {
        let mut cache = BuildCache::empty("unused.json");
        cache.insert("bin/app", "cc -o bin/app", Vec::new());
        cache.insert(
            "bin/obj/app.c.o",
            "cc -c app.c",
            vec![
                DependencyEntry {
                    path: "app.c".into(),
                    mtime: Some(1),
                },
                DependencyEntry {
                    path: "util.h".into(),
                    mtime: Some(1),
                },
            ],
        );

        let commands = cache.compile_commands(Path::new("/work"));
        assert_eq!(
            commands,
            vec![CompileCommand {
                directory: "/work".into(),
                command: "cc -c app.c".to_string(),
                file: "app.c".into(),
                output: "bin/obj/app.c.o".into(),
            }]
        );
    }

    #[test]
    fn test_write_compile_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compile_commands.json");
        let cache = BuildCache::empty("unused.json");

        cache.write_compile_database(&path, dir.path()).unwrap();
        let parsed: Vec<CompileCommand> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(parsed.is_empty());
    }
}

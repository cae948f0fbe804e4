//! File sets
//!
//! Entries of `sources` and `assets` are one of:
//! - a file path
//! - a directory, taken recursively
//! - a pattern with `*` in its last component (`src/*.c`), matched in one directory
//!
//! Paths are relative to the project root. The result keeps the order of
//! the entries, directory contents sorted by name, duplicates removed.

use crate::{ConfigError, ConfigResult};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn resolve_file_set<S: AsRef<str>>(
    root: &Path,
    target: &str,
    entries: &[S],
) -> ConfigResult<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for entry in entries {
        let entry = entry.as_ref();
        let matched = resolve_entry(root, entry)?;
        if matched.is_empty() {
            return Err(ConfigError::NoMatch {
                target: target.to_string(),
                pattern: entry.to_string(),
            });
        }
        for file in matched {
            if seen.insert(file.clone()) {
                files.push(file);
            }
        }
    }

    Ok(files)
}

fn resolve_entry(root: &Path, entry: &str) -> ConfigResult<Vec<PathBuf>> {
    let path = root.join(entry);
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    if name.contains('*') {
        let dir = path.parent().unwrap_or(root);
        return list(dir, 1, |file| matches_pattern(&name, file));
    }

    if path.is_dir() {
        return list(&path, usize::MAX, |_| true);
    }

    Ok(if path.is_file() { vec![path] } else { Vec::new() })
}

fn list(dir: &Path, depth: usize, filter: impl Fn(&str) -> bool) -> ConfigResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .max_depth(depth)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name().to_str()))
    {
        let entry = entry.map_err(|e| {
            ConfigError::IoError(e.into_io_error().unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::Other, "file system loop")
            }))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_str().is_some_and(&filter) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn is_hidden(name: Option<&str>) -> bool {
    name.is_some_and(|n| n.starts_with('.'))
}

/// Glob with `*` wildcards only
fn matches_pattern(pattern: &str, name: &str) -> bool {
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or_default();
    let Some(mut rest) = name.strip_prefix(first) else {
        return false;
    };

    let parts: Vec<&str> = parts.collect();
    let Some((last, middle)) = parts.split_last() else {
        return rest.is_empty();
    };

    for part in middle {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

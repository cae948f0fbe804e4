//! Dependency discovery for commands that already ran
//!
//! Compilers report the files a command actually read in one of three ways:
//!
//! - a Makefile-style rule written next to the output (`-MD -MF out.d`):
//!   ```make
//!   obj/app.o: src/app.c \
//!     src/util.h src/my\ header.h
//!   ```
//! - an "included file" transcript interleaved with diagnostics on stdout
//!   (`/showIncludes`), in whatever language the compiler was installed with
//! - a JSON metadata sidecar written by the bundler, whose `inputs` and
//!   `outputs` objects are keyed by path
//!
//! Each parser returns normalized paths in first-seen order with duplicates
//! removed. Paths are normalized lexically and stay relative when the tool
//! reported them relative.

use crate::error::{BuildError, BuildResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// How a command reports the files it read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyFormat {
    /// Command does not report dependencies
    #[default]
    None,
    /// Makefile rule written to the command's dependency path
    Make,
    /// Include notes printed on the command's output
    ShowIncludes,
    /// Bundler metadata file written to the command's dependency path
    BundleMeta,
}

/// Result of reading back the dependencies of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovered {
    /// Files the command read
    pub dependencies: Vec<PathBuf>,
    /// Command output with include notes stripped
    pub output: String,
}

/// Collect the dependencies of a command that exited successfully.
///
/// A missing dependency file yields no dependencies, a malformed one is an
/// error. The caller decides what an error means (the oracle treats it as
/// stale, the builder as a failed node).
pub fn read_dependencies(
    format: DependencyFormat,
    deps_path: Option<&Path>,
    output: &str,
) -> BuildResult<Discovered> {
    match format {
        DependencyFormat::None => Ok(Discovered {
            dependencies: Vec::new(),
            output: output.to_string(),
        }),
        DependencyFormat::ShowIncludes => {
            let (dependencies, output) = extract_show_includes(output);
            Ok(Discovered {
                dependencies,
                output,
            })
        }
        DependencyFormat::Make | DependencyFormat::BundleMeta => {
            let dependencies = match deps_path {
                Some(path) if path.exists() => parse_dependency_file(format, path)?,
                _ => Vec::new(),
            };
            Ok(Discovered {
                dependencies,
                output: output.to_string(),
            })
        }
    }
}

/// Parse a dependency file left on disk by an earlier run
pub fn parse_dependency_file(format: DependencyFormat, path: &Path) -> BuildResult<Vec<PathBuf>> {
    let content = std::fs::read(path).map_err(|e| BuildError::io(path, e))?;
    let content = std::str::from_utf8(&content)
        .map_err(|_| BuildError::dependency_parse(path, "invalid UTF-8"))?;

    match format {
        DependencyFormat::Make => parse_make_rule(content)
            .map_err(|reason| BuildError::dependency_parse(path, reason)),
        DependencyFormat::BundleMeta => parse_bundle_meta(content)
            .map_err(|reason| BuildError::dependency_parse(path, reason)),
        DependencyFormat::None | DependencyFormat::ShowIncludes => Err(
            BuildError::dependency_parse(path, "format is not stored in a file"),
        ),
    }
}

/// Parse the content of a Makefile-style rule file.
///
/// Targets (everything up to the first unescaped `:` followed by whitespace)
/// are skipped. Several rules may follow each other, as with `-MP`. Fails
/// when the content has tokens but never reaches a rule separator.
pub fn parse_make_rule(content: &str) -> Result<Vec<PathBuf>, String> {
    let mut deps = Vec::new();
    let mut in_deps = false;
    let mut seen_rule = false;
    let mut seen_token = false;
    let mut token = String::new();
    let mut chars = content.chars().peekable();

    fn flush(token: &mut String, in_deps: bool, deps: &mut Vec<PathBuf>) {
        if in_deps && !token.is_empty() {
            deps.push(normalize_path(token.as_str()));
        }
        token.clear();
    }

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.peek().copied() {
                Some('\n') => {
                    chars.next();
                    flush(&mut token, in_deps, &mut deps);
                }
                Some('\r') => {
                    chars.next();
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    flush(&mut token, in_deps, &mut deps);
                }
                Some(c @ (' ' | '#' | '$' | ':' | '\\')) => {
                    chars.next();
                    token.push(c);
                }
                None => {}
                _ => token.push('\\'),
            },
            '$' if chars.peek() == Some(&'$') => {
                chars.next();
                token.push('$');
            }
            ':' if !in_deps
                && chars
                    .peek()
                    .map_or(true, |c| c.is_whitespace()) =>
            {
                if !token.is_empty() {
                    seen_token = true;
                }
                token.clear();
                in_deps = true;
                seen_rule = true;
            }
            '\n' => {
                flush(&mut token, in_deps, &mut deps);
                in_deps = false;
            }
            c if c.is_whitespace() => {
                if !in_deps && !token.is_empty() {
                    seen_token = true;
                }
                flush(&mut token, in_deps, &mut deps);
            }
            c => token.push(c),
        }
    }
    if !in_deps && !token.is_empty() {
        seen_token = true;
    }
    flush(&mut token, in_deps, &mut deps);

    if seen_token && !seen_rule {
        return Err("missing ':' rule separator".to_string());
    }

    Ok(dedup(deps))
}

/// Split a compiler transcript into included files and remaining output.
///
/// Include notes are localized, so a line counts as one when it does not
/// start with whitespace and contains two `": "` pairs before any digit
/// (`Note: including file: C:\foo.h`). Everything after the second pair is
/// the path. Other lines are returned unchanged in the remaining output.
pub fn extract_show_includes(output: &str) -> (Vec<PathBuf>, String) {
    let mut deps = Vec::new();
    let mut remaining = String::with_capacity(output.len());

    for line in output.split_inclusive('\n') {
        match include_note_path(line) {
            Some(path) => deps.push(normalize_path(path)),
            None => remaining.push_str(line),
        }
    }

    (dedup(deps), remaining)
}

fn include_note_path(line: &str) -> Option<&str> {
    let bytes = line.as_bytes();
    if bytes.is_empty() || bytes[0].is_ascii_whitespace() {
        return None;
    }

    let mut counter = 0;
    for i in 0..bytes.len().saturating_sub(2) {
        if bytes[i].is_ascii_digit() {
            return None;
        }
        if bytes[i] == b':' && bytes[i + 1] == b' ' {
            counter += 1;
            if counter == 2 {
                let path = line[i + 2..].trim();
                return (!path.is_empty()).then_some(path);
            }
        }
    }

    None
}

#[derive(Debug, Deserialize)]
struct BundleMeta {
    #[serde(default)]
    inputs: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    outputs: serde_json::Map<String, serde_json::Value>,
}

/// Parse bundler metadata: every key of `inputs` and `outputs` is a dependency
pub fn parse_bundle_meta(content: &str) -> Result<Vec<PathBuf>, String> {
    let meta: BundleMeta = serde_json::from_str(content).map_err(|e| e.to_string())?;

    let deps = meta
        .inputs
        .keys()
        .chain(meta.outputs.keys())
        .map(|path| normalize_path(path))
        .collect();

    Ok(dedup(deps))
}

/// Lexically normalize a path: drop `.` components and fold `..` into the
/// preceding component when there is one.
pub fn normalize_path(path: impl AsRef<Path>) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.as_ref().components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    normalized.pop();
                } else if !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }

    normalized
}

fn dedup(mut deps: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    deps.retain(|dep| seen.insert(dep.clone()));
    deps
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn paths(list: &[&str]) -> Vec<PathBuf> {
        list.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_make_rule_with_continuations() {
        let content = "obj/app.o: src/app.c \\\n  src/util.h \\\n  src/config.h\n";
        let deps = parse_make_rule(content).unwrap();
        assert_eq!(deps, paths(&["src/app.c", "src/util.h", "src/config.h"]));
    }

    #[rstest]
    #[case(r"out.o: my\ file.h", "my file.h")]
    #[case(r"out.o: weird\#name.h", "weird#name.h")]
    #[case(r"out.o: cost\$.h", "cost$.h")]
    #[case("out.o: cost$$.h", "cost$.h")]
    #[case(r"out.o: a\:b.h", "a:b.h")]
    fn test_make_rule_escapes(#[case] content: &str, #[case] expected: &str) {
        assert_eq!(parse_make_rule(content).unwrap(), paths(&[expected]));
    }

    #[test]
    fn test_make_rule_skips_phony_header_rules() {
        let content = "app.o: app.c util.h\n\nutil.h:\n";
        let deps = parse_make_rule(content).unwrap();
        assert_eq!(deps, paths(&["app.c", "util.h"]));
    }

    #[test]
    fn test_make_rule_keeps_drive_letters() {
        let content = "C:/obj/app.o: C:/src/app.c";
        let deps = parse_make_rule(content).unwrap();
        assert_eq!(deps, paths(&["C:/src/app.c"]));
    }

    #[test]
    fn test_make_rule_normalizes_and_dedups() {
        let content = "app.o: ./src/../src/app.c src/app.c src/./util.h";
        let deps = parse_make_rule(content).unwrap();
        assert_eq!(deps, paths(&["src/app.c", "src/util.h"]));
    }

    #[test]
    fn test_make_rule_without_separator_is_malformed() {
        assert!(parse_make_rule("this is not a rule").is_err());
        assert_eq!(parse_make_rule("").unwrap(), Vec::<PathBuf>::new());
    }

    #[test]
    fn test_show_includes_strips_notes() {
        let output = "app.c\n\
                      Note: including file: src/util.h\n\
                      Remarque : inclusion du fichier :  src/config.h\n\
                      src/app.c(12): warning C4100: unused parameter\n";
        let (deps, remaining) = extract_show_includes(output);

        assert_eq!(deps, paths(&["src/util.h", "src/config.h"]));
        assert_eq!(
            remaining,
            "app.c\nsrc/app.c(12): warning C4100: unused parameter\n"
        );
    }

    #[test]
    fn test_show_includes_ignores_indented_lines() {
        let (deps, remaining) = extract_show_includes("  Note: including file: x.h\n");
        assert!(deps.is_empty());
        assert_eq!(remaining, "  Note: including file: x.h\n");
    }

    #[test]
    fn test_bundle_meta_inputs_and_outputs() {
        let content = r#"{
            "inputs": { "web/app.js": { "bytes": 10 }, "web/lib.js": {} },
            "outputs": { "bin/Bundles/app.js": { "entryPoint": "web/app.js" } }
        }"#;
        let deps = parse_bundle_meta(content).unwrap();
        assert_eq!(deps, paths(&["web/app.js", "web/lib.js", "bin/Bundles/app.js"]));
    }

    #[test]
    fn test_bundle_meta_rejects_garbage() {
        assert!(parse_bundle_meta("{ not json").is_err());
    }

    #[test]
    fn test_read_dependencies_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nothing.d");

        let discovered =
            read_dependencies(DependencyFormat::Make, Some(&missing), "warning\n").unwrap();
        assert!(discovered.dependencies.is_empty());
        assert_eq!(discovered.output, "warning\n");
    }

    #[test]
    fn test_read_dependencies_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.d");
        std::fs::write(&path, "garbage without separator").unwrap();

        let result = read_dependencies(DependencyFormat::Make, Some(&path), "");
        assert!(matches!(result, Err(BuildError::DependencyParse { .. })));
    }

    #[test]
    fn test_normalize_path_keeps_leading_parents() {
        assert_eq!(normalize_path("../lib/./x.c"), PathBuf::from("../lib/x.c"));
        assert_eq!(normalize_path("a/b/../../.."), PathBuf::from(".."));
    }
}

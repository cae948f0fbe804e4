//! Loading kiln.toml projects end to end
//!
//! Covers discovery, precedence between global, project and environment
//! values, and conversion into resolved targets.

use kiln_build::{resolve_targets, Features, Platform, Profile, TargetKind};
use kiln_config::{ConfigError, ConfigLoader, PROJECT_FILE};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PROJECT: &str = r#"
[build]
output = "out"
version = "1.2.0"
profile = "fast"
features = ["warnings"]

[[target]]
name = "util"
type = "library"
sources = ["util/*.c"]
export_definitions = ["FEATURE_X"]
export_directories = ["util"]
libraries = ["m"]
link_priority = 5

[target.source_features."util/fast.c"]
enable = ["optimize"]

[[target]]
name = "app"
type = "executable"
sources = ["app"]
imports = ["util"]
assets = ["assets/"]
asset_options = "--strip assets"
platforms = ["linux", "macos", "windows"]
disable_features = ["pch"]
"#;

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), PROJECT_FILE, PROJECT);
    for file in [
        "util/util.c",
        "util/fast.c",
        "util/util.h",
        "app/main.c",
        "app/ui/window.c",
        "assets/logo.txt",
    ] {
        write(dir.path(), file, "");
    }
    dir
}

fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

fn loader(dir: &Path) -> ConfigLoader {
    ConfigLoader::new().with_global_config(dir.join("global.toml"))
}

fn clear_env() {
    for var in ["KILN_JOBS", "KILN_CC", "KILN_PROFILE"] {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_target_specs_resolve_files() {
    clear_env();
    let dir = project();
    let root = dir.path();
    let config = loader(root).load_from_directory(root).unwrap();

    assert_eq!(config.output_dir(), root.join("out"));
    assert_eq!(config.version(), Some("1.2.0"));
    assert_eq!(config.features(), Features::WARNINGS);

    let specs = config.target_specs().unwrap();
    assert_eq!(specs.len(), 2);

    let util = &specs[0];
    assert_eq!(util.kind, TargetKind::Library);
    assert_eq!(util.sources, vec![root.join("util/fast.c"), root.join("util/util.c")]);
    assert_eq!(util.export_directories, vec![root.join("util")]);
    assert_eq!(util.link_priority, 5);
    assert_eq!(
        util.source_features[&root.join("util/fast.c")].enable,
        Features::OPTIMIZE
    );

    let app = &specs[1];
    assert_eq!(app.sources, vec![root.join("app/main.c"), root.join("app/ui/window.c")]);
    assert_eq!(app.assets, vec![root.join("assets/logo.txt")]);
    assert_eq!(app.asset_options.as_deref(), Some("--strip assets"));
    assert_eq!(app.disable_features, Features::PCH);
    assert!(app.platforms.contains(Platform::Windows));
    assert!(!app.platforms.contains(Platform::Freebsd));

    let targets = resolve_targets(specs).unwrap();
    assert_eq!(targets.len(), 2);
    let app = targets.find("app").unwrap();
    assert!(app.options.definitions.contains(&"FEATURE_X".to_string()));
}

#[test]
#[serial]
fn test_project_found_from_subdirectory() {
    clear_env();
    let dir = project();
    let sub = dir.path().join("app").join("ui");

    let config = loader(dir.path()).load_from_directory(&sub).unwrap();
    assert_eq!(config.project_root(), Some(dir.path()));
    assert_eq!(config.project.targets.len(), 2);
}

#[test]
#[serial]
fn test_load_from_file() {
    clear_env();
    let dir = project();
    let path = write(
        dir.path(),
        "alt/kiln.toml",
        "[[target]]\nname = \"tool\"\ntype = \"executable\"\nsources = [\"tool.c\"]\n",
    );
    write(dir.path(), "alt/tool.c", "");

    let config = loader(dir.path()).load_from_file(&path).unwrap();
    let specs = config.target_specs().unwrap();
    assert_eq!(specs[0].sources, vec![dir.path().join("alt/tool.c")]);
    assert_eq!(config.output_dir(), dir.path().join("alt").join("bin"));
}

#[test]
#[serial]
fn test_precedence_global_project_env() {
    clear_env();
    let dir = project();
    write(
        dir.path(),
        "global.toml",
        "[defaults]\njobs = 3\ncompiler = \"clang\"\nprofile = \"release\"\n",
    );

    // Project profile beats the global one
    let config = loader(dir.path()).load_from_directory(dir.path()).unwrap();
    assert_eq!(config.jobs(), Some(3));
    assert_eq!(config.compiler(), Some("clang"));
    assert_eq!(config.profile().unwrap(), Profile::Fast);

    env::set_var("KILN_JOBS", "12");
    env::set_var("KILN_CC", "gcc-13");
    env::set_var("KILN_PROFILE", "release");
    let config = loader(dir.path()).load_from_directory(dir.path());
    clear_env();

    let config = config.unwrap();
    assert_eq!(config.jobs(), Some(12));
    assert_eq!(config.compiler(), Some("gcc-13"));
    assert_eq!(config.profile().unwrap(), Profile::Release);
}

#[test]
#[serial]
fn test_missing_source_names_target() {
    clear_env();
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        PROJECT_FILE,
        "[[target]]\nname = \"app\"\ntype = \"executable\"\nsources = [\"src/*.cpp\"]\n",
    );

    let config = loader(dir.path()).load_from_directory(dir.path()).unwrap();
    let err = config.target_specs().unwrap_err();
    assert!(matches!(err, ConfigError::NoMatch { .. }));
    assert!(err.to_string().contains("'app'"));
}

#[test]
#[serial]
fn test_syntax_error_names_file() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), PROJECT_FILE, "[[target]\nname = ");

    let err = loader(dir.path()).load_from_directory(dir.path()).unwrap_err();
    match err {
        ConfigError::TomlParseError { file, .. } => assert_eq!(file, path),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
#[serial]
fn test_unknown_import_is_reported_by_resolution() {
    clear_env();
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        PROJECT_FILE,
        "[[target]]\nname = \"app\"\ntype = \"executable\"\nimports = [\"nope\"]\n",
    );

    let config = loader(dir.path()).load_from_directory(dir.path()).unwrap();
    let specs = config.target_specs().unwrap();
    let err = resolve_targets(specs).unwrap_err();
    assert!(err.to_string().contains("nope"));
}
